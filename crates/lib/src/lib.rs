//! modbuild-lib: Incremental multi-module build orchestration
//!
//! This crate provides the engine behind `modbuild`:
//! - `Module` / `Project`: version-controlled aggregates and their build units
//! - `checksum`: content fingerprints that decide what changed
//! - `closure`: expands changed modules to everything depending on them
//! - `BuildPipeline`: runs the lifecycle stages across the fleet
//! - `TaskFile`: hands lifecycle commands to the external task runner

pub mod checksum;
pub mod closure;
pub mod config;
pub mod consts;
pub mod error;
pub mod files;
pub mod module;
pub mod pipeline;
pub mod project;
pub mod publish;
pub mod task;
pub mod util;
pub mod vars;
pub mod vcs;
pub mod version;

pub use error::BuildError;
pub use pipeline::{BuildPipeline, Selection};

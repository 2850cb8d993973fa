//! Fixed names shared across the crate.
//!
//! Anything a user may reasonably want to change lives in
//! [`BuildConfig`](crate::config::BuildConfig) instead.

/// Top-level internal directory, relative to the base build directory.
pub const BUILD_DIR_NAME: &str = ".build";

/// Subdirectories of [`BUILD_DIR_NAME`].
pub const LOG_DIR_NAME: &str = "log";
pub const SCRATCH_DIR_NAME: &str = "scratch";
pub const SUM_DIR_NAME: &str = "sums";
pub const OUTPUT_DIR_NAME: &str = "output";

/// Configuration file stored inside [`BUILD_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "build.conf.json";

/// Directory marking a version-controlled module root.
pub const VCS_DIR_NAME: &str = ".git";

/// Key/value project descriptor picked up by the package explorer.
pub const PACKAGE_FILE_NAME: &str = "package.json";

/// A top-level file with this extension names its module.
pub const MODULE_MARKER_EXTENSION: &str = "sln";

/// Suffix stripped from a marker file stem when deriving the module name.
pub const MODULE_MARKER_SUFFIX: &str = ".build";

/// Published module files.
pub const CATALOG_FILE_NAME: &str = "index.json";
pub const GIT_HISTORY_FILE_NAME: &str = "git.json";
pub const VERSION_HISTORY_FILE_NAME: &str = "versions.json";

/// Detached signature extension written next to signed files.
pub const SIGNATURE_EXTENSION: &str = "sig";

/// Annotated tag messages longer than this are truncated in `git.json`.
pub const TAG_MESSAGE_MAX_LEN: usize = 120;

/// Pre-release label prefix for CI versions (`1.2.3-ci0004`).
pub const CI_PRERELEASE_PREFIX: &str = "ci";

//! Top-level error type for pipeline stages.
//!
//! Each concern owns a narrower error enum next to its code; they all fold
//! into [`BuildError`], which is what stage methods return.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::checksum::ChecksumError;
use crate::config::ConfigError;
use crate::project::ProjectError;
use crate::publish::PublishError;
use crate::task::{TaskCommand, TaskError};
use crate::util::hash::HashError;
use crate::vcs::VcsError;
use crate::version::VersionError;

/// Errors raised while discovering, loading, or driving modules.
#[derive(Debug, Error)]
pub enum BuildError {
  /// A module cannot take part in the run at all (e.g. no commit history).
  #[error("module '{module}' cannot be loaded: {message}")]
  Discovery { module: String, message: String },

  /// The task runner reported a failure for a mandatory step.
  #[error("in: {artifact} msg -> task command '{command}' failed with exit code {code}")]
  StepFailed {
    artifact: String,
    command: TaskCommand,
    code: i32,
  },

  /// A stage needed a loaded module but the module was never loaded.
  #[error("module '{0}' has not been loaded")]
  NotLoaded(String),

  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Checksum(#[from] ChecksumError),

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Vcs(#[from] VcsError),

  #[error(transparent)]
  Version(#[from] VersionError),

  #[error(transparent)]
  Project(#[from] ProjectError),

  #[error(transparent)]
  Task(TaskError),

  #[error(transparent)]
  Publish(#[from] PublishError),

  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// A blocking worker panicked or was aborted.
  #[error("background task failed: {0}")]
  Join(#[from] tokio::task::JoinError),

  /// The fleet-wide cancellation token fired.
  #[error("operation cancelled")]
  Cancelled,
}

impl BuildError {
  /// True when the error stems from cancellation rather than a real failure.
  pub fn is_cancelled(&self) -> bool {
    matches!(self, BuildError::Cancelled | BuildError::Publish(PublishError::Cancelled))
  }

  pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
    BuildError::Io {
      path: path.into(),
      source,
    }
  }
}

impl From<TaskError> for BuildError {
  fn from(err: TaskError) -> Self {
    match err {
      TaskError::Cancelled => BuildError::Cancelled,
      other => BuildError::Task(other),
    }
  }
}

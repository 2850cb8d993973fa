//! Publishing of module build output.
//!
//! After a build, each module's artifacts are gathered into its output
//! directory together with checksum sidecars, optional signatures, a catalog,
//! and its git and version history. Signing and uploading are collaborators
//! behind the [`signer::Signer`] and [`upload::UploadManager`] traits.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::util::hash::HashError;

pub mod catalog;
pub mod publisher;
pub mod signer;
pub mod upload;

pub use publisher::BuildPublisher;

#[derive(Debug, Error)]
pub enum PublishError {
  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error("failed to serialize {what}: {source}")]
  Serialize {
    what: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to start signer '{program}': {source}")]
  SignSpawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to sign {file}: signer exited with code {code}")]
  SignFailed { file: PathBuf, code: i32 },

  #[error("unsupported hash algorithm '{0}', only sha256 is available")]
  UnsupportedHash(String),

  #[error("failed to search {path}: {message}")]
  Walk { path: PathBuf, message: String },

  #[error("operation cancelled")]
  Cancelled,
}

impl PublishError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
    PublishError::Io {
      path: path.into(),
      source,
    }
  }
}

/// `{file}.{extension}`, keeping the file's own extension.
pub fn sidecar_path(file: &Path, extension: &str) -> PathBuf {
  let mut name: OsString = file.as_os_str().to_owned();
  name.push(".");
  name.push(extension);
  PathBuf::from(name)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sidecar_appends_extension() {
    assert_eq!(
      sidecar_path(Path::new("/out/web/site.tgz"), "sha256"),
      PathBuf::from("/out/web/site.tgz.sha256")
    );
  }
}

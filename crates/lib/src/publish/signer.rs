//! Detached signatures for published artifacts.
//!
//! Signing goes through a single shared agent, so callers sign one file at a
//! time.

use std::io;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{PublishError, sidecar_path};
use crate::consts::SIGNATURE_EXTENSION;

#[async_trait]
pub trait Signer: Send + Sync {
  /// Whether artifacts are signed at all.
  fn is_enabled(&self) -> bool;

  /// Write a detached `{file}.sig` signature for `file`.
  async fn sign(&self, file: &Path) -> Result<(), PublishError>;
}

/// Signer used when signing is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSigner;

#[async_trait]
impl Signer for DisabledSigner {
  fn is_enabled(&self) -> bool {
    false
  }

  async fn sign(&self, _file: &Path) -> Result<(), PublishError> {
    Ok(())
  }
}

/// Signs files with `gpg --detach-sign`.
#[derive(Debug, Clone)]
pub struct GpgSigner {
  program: String,
  default_key: Option<String>,
  cancel: CancellationToken,
}

impl GpgSigner {
  pub fn new(default_key: Option<String>, cancel: CancellationToken) -> Self {
    Self {
      program: "gpg".to_string(),
      default_key: default_key.filter(|k| !k.trim().is_empty()),
      cancel,
    }
  }

  /// Use a different gpg-compatible executable.
  pub fn with_program(mut self, program: impl Into<String>) -> Self {
    self.program = program.into();
    self
  }

  pub fn args(&self, file: &Path) -> Vec<String> {
    let mut args = vec!["--detach-sign".to_string()];
    if let Some(key) = &self.default_key {
      args.push("--default-key".to_string());
      args.push(key.clone());
    }
    args.push(file.display().to_string());
    args
  }
}

#[async_trait]
impl Signer for GpgSigner {
  fn is_enabled(&self) -> bool {
    true
  }

  async fn sign(&self, file: &Path) -> Result<(), PublishError> {
    let signature = sidecar_path(file, SIGNATURE_EXTENSION);
    match tokio::fs::remove_file(&signature).await {
      Ok(()) => debug!(file = %signature.display(), "removed stale signature"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(e) => return Err(PublishError::io(&signature, e)),
    }

    info!(file = %file.display(), "signing artifact");

    let mut child = Command::new(&self.program)
      .args(self.args(file))
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .spawn()
      .map_err(|e| PublishError::SignSpawn {
        program: self.program.clone(),
        source: e,
      })?;

    let status = tokio::select! {
      status = child.wait() => status.map_err(|e| PublishError::io(file, e))?,
      _ = self.cancel.cancelled() => {
        if let Err(e) = child.kill().await {
          debug!(error = %e, "failed to kill signer");
        }
        return Err(PublishError::Cancelled);
      }
    };

    // gpg exits with 2 on non-fatal warnings while still producing a signature.
    match status.code() {
      Some(0) | Some(2) => Ok(()),
      code => Err(PublishError::SignFailed {
        file: file.to_path_buf(),
        code: code.unwrap_or(-1),
      }),
    }
  }
}

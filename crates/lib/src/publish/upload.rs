//! Upload of prepared module output.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::PublishError;

/// Pushes a prepared output directory to its destination.
#[async_trait]
pub trait UploadManager: Send + Sync {
  async fn upload_directory(&self, path: &Path) -> Result<(), PublishError>;
}

/// Mirrors output directories into a local or mounted destination.
///
/// `{path}` is copied to `{destination}/{path file name}`, overwriting
/// existing files and keeping files that only exist at the destination.
#[derive(Debug, Clone)]
pub struct DirectoryUploader {
  destination: PathBuf,
}

impl DirectoryUploader {
  pub fn new(destination: PathBuf) -> Self {
    Self { destination }
  }

  pub fn destination(&self) -> &Path {
    &self.destination
  }
}

fn mirror(source: &Path, target: &Path) -> Result<usize, PublishError> {
  let mut copied = 0;

  for entry in WalkDir::new(source) {
    let entry = entry.map_err(|e| PublishError::Walk {
      path: source.to_path_buf(),
      message: e.to_string(),
    })?;
    let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
    let dest = target.join(relative);

    if entry.file_type().is_dir() {
      fs::create_dir_all(&dest).map_err(|e| PublishError::io(&dest, e))?;
    } else if entry.file_type().is_file() {
      fs::copy(entry.path(), &dest).map_err(|e| PublishError::io(&dest, e))?;
      copied += 1;
    }
  }

  Ok(copied)
}

#[async_trait]
impl UploadManager for DirectoryUploader {
  async fn upload_directory(&self, path: &Path) -> Result<(), PublishError> {
    let name = path.file_name().map(PathBuf::from).unwrap_or_default();
    let target = self.destination.join(name);
    let source = path.to_path_buf();

    info!(from = %source.display(), to = %target.display(), "uploading directory");

    let copied = tokio::task::spawn_blocking({
      let target = target.clone();
      move || mirror(&source, &target)
    })
    .await
    .map_err(|e| PublishError::Walk {
      path: path.to_path_buf(),
      message: e.to_string(),
    })??;

    debug!(to = %target.display(), files = copied, "upload complete");
    Ok(())
  }
}

//! Output locations of a module.
//!
//! # Output Layout
//!
//! ```text
//! {output}/{module}/
//! ├── @latest              # HEAD commit id
//! ├── git.json             # commit and tag history
//! ├── versions.json        # tag -> commit history
//! └── {head sha}/
//!     ├── index.json       # catalog
//!     ├── archive.tgz      # source archive, when produced
//!     └── {safe project name}/
//!         ├── {artifact}
//!         └── {artifact}.sha256
//! ```

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::config::{BuildConfig, DirectoryIndex};
use crate::consts::{CATALOG_FILE_NAME, GIT_HISTORY_FILE_NAME, VERSION_HISTORY_FILE_NAME};
use crate::error::BuildError;

/// Kinds of module-level files written during output preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleFile {
  Catalog,
  GitHistory,
  LatestHash,
  VersionHistory,
  Archive,
}

/// Resolves and manages the output files of one module.
#[derive(Debug, Clone)]
pub struct ModuleFiles {
  output_dir: PathBuf,
  head_file_name: String,
  archive_name: String,
}

impl ModuleFiles {
  pub fn new(index: &DirectoryIndex, config: &BuildConfig, module_name: &str) -> Self {
    Self {
      output_dir: index.output_dir.join(module_name),
      head_file_name: config.head_file_name.clone(),
      archive_name: config.source_archive_name.clone(),
    }
  }

  /// `{output}/{module}`.
  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  /// Directory holding every artifact built from `head`.
  pub fn version_dir(&self, head: &str) -> PathBuf {
    self.output_dir.join(head)
  }

  /// Directory a project's artifacts are copied to.
  pub fn artifact_dir(&self, head: &str, safe_project_name: &str) -> PathBuf {
    self.version_dir(head).join(safe_project_name)
  }

  pub fn path(&self, file: ModuleFile, head: &str) -> PathBuf {
    match file {
      ModuleFile::Catalog => self.version_dir(head).join(CATALOG_FILE_NAME),
      ModuleFile::GitHistory => self.output_dir.join(GIT_HISTORY_FILE_NAME),
      ModuleFile::LatestHash => self.output_dir.join(&self.head_file_name),
      ModuleFile::VersionHistory => self.output_dir.join(VERSION_HISTORY_FILE_NAME),
      ModuleFile::Archive => self.version_dir(head).join(&self.archive_name),
    }
  }

  /// Write a module-level file, creating its directory as needed.
  pub async fn write(&self, file: ModuleFile, head: &str, data: &[u8]) -> Result<PathBuf, BuildError> {
    let path = self.path(file, head);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).await.map_err(|e| BuildError::io(parent, e))?;
    }
    fs::write(&path, data).await.map_err(|e| BuildError::io(&path, e))?;
    debug!(path = %path.display(), "wrote module file");
    Ok(path)
  }

  /// Remove the module output directory if it exists.
  pub async fn clean(&self) -> Result<(), BuildError> {
    match fs::remove_dir_all(&self.output_dir).await {
      Ok(()) => Ok(()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(BuildError::io(&self.output_dir, e)),
    }
  }

  /// Empty the module output directory, leaving it in place.
  pub async fn reset(&self) -> Result<(), BuildError> {
    self.clean().await?;
    fs::create_dir_all(&self.output_dir)
      .await
      .map_err(|e| BuildError::io(&self.output_dir, e))
  }
}

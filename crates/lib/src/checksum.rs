//! Project fingerprints and the persisted checksum records.
//!
//! A fingerprint is the SHA-256 of the raw bytes of every tracked source
//! file in a project directory, concatenated in path order. The last
//! fingerprint of a successful build is stored per (module, project).
//!
//! # Storage Layout
//!
//! ```text
//! {build}/.build/sums/
//! └── {module}-{safe project name}.json   # ChecksumRecord
//! ```
//!
//! Records are written atomically. A record that cannot be read or parsed is
//! treated as missing, so an interrupted run only costs a rebuild.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::util::hash::{ContentHash, HashError, hash_files};

#[derive(Debug, Error)]
pub enum ChecksumError {
  #[error("failed to read checksum {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse checksum {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize checksum: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("failed to write checksum {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// Fingerprint of a project at the time of its last successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumRecord {
  /// Hex SHA-256 fingerprint.
  pub sum: String,
  /// HEAD commit when the fingerprint was taken.
  pub commit: String,
  pub modified: DateTime<Utc>,
}

impl ChecksumRecord {
  pub fn new(sum: &ContentHash, commit: impl Into<String>) -> Self {
    Self {
      sum: sum.0.clone(),
      commit: commit.into(),
      modified: Utc::now(),
    }
  }
}

/// True when `fresh` equals the stored fingerprint, ignoring hex case.
pub fn is_up_to_date(fresh: &ContentHash, stored: Option<&ChecksumRecord>) -> bool {
  stored.is_some_and(|record| fresh.matches(&record.sum))
}

/// List the tracked source files below `dir`, sorted by path.
///
/// A file is tracked when its extension is in `extensions` (case-insensitive)
/// and no directory between `dir` and the file is named in `excluded_dirs`.
pub fn source_files(dir: &Path, extensions: &[String], excluded_dirs: &[String]) -> Result<Vec<PathBuf>, HashError> {
  let walker = WalkDir::new(dir).into_iter().filter_entry(|e| {
    if e.depth() == 0 || !e.file_type().is_dir() {
      return true;
    }
    let name = e.file_name().to_string_lossy();
    !excluded_dirs.iter().any(|excluded| excluded.eq_ignore_ascii_case(&name))
  });

  let mut files = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|e| HashError::WalkDir {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;

    if !entry.file_type().is_file() {
      continue;
    }

    let tracked = entry
      .path()
      .extension()
      .and_then(|ext| ext.to_str())
      .is_some_and(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)));

    if tracked {
      files.push(entry.into_path());
    }
  }

  files.sort();
  Ok(files)
}

/// Compute the fingerprint of the project rooted at `dir`.
///
/// Blocking; async callers run it on the blocking pool.
pub fn compute_fingerprint(
  dir: &Path,
  extensions: &[String],
  excluded_dirs: &[String],
) -> Result<ContentHash, HashError> {
  let files = source_files(dir, extensions, excluded_dirs)?;
  debug!(dir = %dir.display(), files = files.len(), "computing fingerprint");
  hash_files(&files)
}

/// Reads and writes checksum records in the sums directory.
#[derive(Debug, Clone)]
pub struct ChecksumStore {
  base_path: PathBuf,
}

impl ChecksumStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self { base_path }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  /// Path of the record for a project of a module.
  pub fn record_path(&self, module: &str, safe_name: &str) -> PathBuf {
    self.base_path.join(format!("{module}-{safe_name}.json"))
  }

  /// Load a record, returning `None` when none was written yet.
  pub async fn read(&self, module: &str, safe_name: &str) -> Result<Option<ChecksumRecord>, ChecksumError> {
    let path = self.record_path(module, safe_name);

    let content = match fs::read_to_string(&path).await {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
      Err(e) => return Err(ChecksumError::Read { path, source: e }),
    };

    let record = serde_json::from_str(&content).map_err(|e| ChecksumError::Parse { path, source: e })?;
    Ok(Some(record))
  }

  /// Load a record, treating any read or parse failure as a missing record.
  pub async fn read_trusted(&self, module: &str, safe_name: &str) -> Option<ChecksumRecord> {
    match self.read(module, safe_name).await {
      Ok(record) => record,
      Err(e) => {
        warn!(module = %module, project = %safe_name, error = %e, "ignoring unreadable checksum");
        None
      }
    }
  }

  /// Store a record.
  ///
  /// Uses atomic write (write to temp, then rename) so a cancelled run
  /// never leaves a truncated record behind.
  pub async fn write(&self, module: &str, safe_name: &str, record: &ChecksumRecord) -> Result<(), ChecksumError> {
    let path = self.record_path(module, safe_name);
    let write_err = |e| ChecksumError::Write {
      path: path.clone(),
      source: e,
    };

    fs::create_dir_all(&self.base_path).await.map_err(write_err)?;

    let content = serde_json::to_string_pretty(record).map_err(ChecksumError::Serialize)?;
    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, content).await.map_err(write_err)?;
    fs::rename(&temp_path, &path).await.map_err(write_err)?;

    debug!(path = %path.display(), "wrote checksum");
    Ok(())
  }
}

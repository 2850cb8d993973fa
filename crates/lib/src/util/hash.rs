//! Hashing utilities for change detection and published artifacts.
//!
//! This module provides:
//! - `ContentHash`: a full 64-character lowercase hex SHA-256
//! - `hash_files()`: one digest over the concatenated bytes of several files
//! - `hash_file()`: single file hashing
//! - `hash_bytes()`: arbitrary byte hashing

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A full 64-character SHA256 hash.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string (64 characters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
  /// Compare against a stored digest, ignoring hex case.
  pub fn matches(&self, other: &str) -> bool {
    self.0.eq_ignore_ascii_case(other)
  }
}

impl std::fmt::Display for ContentHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error while reading content to hash.
#[derive(Debug, Error)]
pub enum HashError {
  #[error("failed to walk directory {path}: {message}")]
  WalkDir { path: PathBuf, message: String },

  #[error("failed to read file {path}: {source}")]
  ReadFile {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

fn feed(hasher: &mut Sha256, path: &Path) -> Result<(), HashError> {
  let read_err = |e| HashError::ReadFile {
    path: path.to_path_buf(),
    source: e,
  };

  let mut file = fs::File::open(path).map_err(read_err)?;
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(read_err)?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }
  Ok(())
}

/// Hash the concatenated contents of `paths`, in the order given.
///
/// Only raw bytes are hashed; names and metadata do not contribute. Callers
/// sort the list when they need an order-stable digest.
pub fn hash_files<P: AsRef<Path>>(paths: &[P]) -> Result<ContentHash, HashError> {
  let mut hasher = Sha256::new();
  for path in paths {
    feed(&mut hasher, path.as_ref())?;
  }
  Ok(ContentHash(hex::encode(hasher.finalize())))
}

/// Hash a file's contents.
///
/// Returns the full 64-character SHA256 hash of the file.
pub fn hash_file(path: &Path) -> Result<ContentHash, HashError> {
  hash_files(&[path])
}

/// Hash arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> ContentHash {
  ContentHash(hex::encode(Sha256::digest(data)))
}

//! Build configuration and the on-disk directory layout.
//!
//! The configuration is persisted as JSON at `.build/build.conf.json` inside
//! the base build directory. It is created with defaults on first use and
//! loaded on every later run; missing fields fall back to their defaults.
//!
//! # Directory Layout
//!
//! ```text
//! {base}/.build/
//! ├── build.conf.json
//! ├── log/        # one log file per run
//! ├── scratch/    # temporary files
//! ├── sums/       # {module}-{project}.json checksum records
//! └── output/     # {module}/ published output
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{BUILD_DIR_NAME, CONFIG_FILE_NAME, LOG_DIR_NAME, OUTPUT_DIR_NAME, SCRATCH_DIR_NAME, SUM_DIR_NAME};

/// Errors raised while preparing directories or reading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to write config {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// How tag names and the default version are parsed as semantic versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStyle {
  /// Exactly `MAJOR.MINOR.PATCH[-PRE][+BUILD]`.
  Strict,
  /// Also accepts a leading `v`/`V` and missing minor/patch components.
  #[default]
  Lenient,
}

/// User-overridable build settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
  /// File extensions (without the dot) that contribute to a project fingerprint.
  pub source_file_extensions: Vec<String>,
  /// Directory names skipped anywhere below a project directory.
  pub excluded_dirs: Vec<String>,
  /// Name of the digest written into catalogs and sidecar files.
  pub hash_algorithm: String,
  /// Name of the file holding the latest HEAD commit id.
  pub head_file_name: String,
  /// Task-definition file expected in each module root.
  pub module_taskfile_name: String,
  /// Task-definition file expected in the base build directory.
  pub main_taskfile_name: String,
  /// Extension (without the dot) of project build artifacts.
  pub output_file_extension: String,
  /// Task runner executable.
  pub task_exe: String,
  pub source_archive_name: String,
  pub source_archive_format: String,
  /// Fallback project binary directory when a project does not declare one.
  pub project_bin_dir: String,
  /// Base version used when a module has no version tags.
  pub default_ci_version: String,
  pub semver_style: VersionStyle,
}

impl Default for BuildConfig {
  fn default() -> Self {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

    Self {
      source_file_extensions: strings(&[
        "c", "cpp", "cxx", "h", "hpp", "cs", "proj", "sln", "ts", "js", "java", "json", "yaml", "yml", "rs", "toml",
      ]),
      excluded_dirs: strings(&[
        ".git",
        "bin",
        "obj",
        "packages",
        "node_modules",
        "dist",
        "build",
        "out",
        "target",
      ]),
      hash_algorithm: "sha256".to_string(),
      head_file_name: "@latest".to_string(),
      module_taskfile_name: "Module.Taskfile.yaml".to_string(),
      main_taskfile_name: "build.taskfile.yaml".to_string(),
      output_file_extension: "tgz".to_string(),
      task_exe: "task".to_string(),
      source_archive_name: "archive.tgz".to_string(),
      source_archive_format: "tgz".to_string(),
      project_bin_dir: "bin".to_string(),
      default_ci_version: "0.1.0".to_string(),
      semver_style: VersionStyle::default(),
    }
  }
}

impl BuildConfig {
  /// Load the config from the build directory, creating it with defaults when
  /// it does not exist or when `overwrite` is set.
  pub fn load_or_create(index: &DirectoryIndex, overwrite: bool) -> Result<Self, ConfigError> {
    let path = index.config_path();

    if overwrite || !path.exists() {
      let config = Self::default();
      let content = serde_json::to_string_pretty(&config).map_err(|e| ConfigError::Parse {
        path: path.clone(),
        source: e,
      })?;
      fs::write(&path, content).map_err(|e| ConfigError::Write {
        path: path.clone(),
        source: e,
      })?;
      debug!(path = %path.display(), "wrote default build config");
      return Ok(config);
    }

    let content = fs::read_to_string(&path).map_err(|e| ConfigError::Read {
      path: path.clone(),
      source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::Parse { path, source: e })
  }
}

/// Resolved directories used by a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryIndex {
  /// Directory searched for modules.
  pub base_dir: PathBuf,
  /// `{base}/.build`.
  pub build_dir: PathBuf,
  pub log_dir: PathBuf,
  pub scratch_dir: PathBuf,
  /// Checksum records.
  pub sum_dir: PathBuf,
  /// Published module output.
  pub output_dir: PathBuf,
}

impl DirectoryIndex {
  /// Compute the layout under `base_dir` without touching the filesystem.
  ///
  /// A relative `output_override` is resolved against `base_dir`.
  pub fn new(base_dir: &Path, output_override: Option<&Path>) -> Self {
    let build_dir = base_dir.join(BUILD_DIR_NAME);
    let output_dir = match output_override {
      Some(dir) if dir.is_absolute() => dir.to_path_buf(),
      Some(dir) => base_dir.join(dir),
      None => build_dir.join(OUTPUT_DIR_NAME),
    };

    Self {
      base_dir: base_dir.to_path_buf(),
      log_dir: build_dir.join(LOG_DIR_NAME),
      scratch_dir: build_dir.join(SCRATCH_DIR_NAME),
      sum_dir: build_dir.join(SUM_DIR_NAME),
      output_dir,
      build_dir,
    }
  }

  /// Compute the layout and create every directory in it.
  pub fn create(base_dir: &Path, output_override: Option<&Path>) -> Result<Self, ConfigError> {
    let index = Self::new(base_dir, output_override);
    index.ensure_dirs()?;
    Ok(index)
  }

  /// Create any missing directory of the layout.
  pub fn ensure_dirs(&self) -> Result<(), ConfigError> {
    for dir in [
      &self.build_dir,
      &self.log_dir,
      &self.scratch_dir,
      &self.sum_dir,
      &self.output_dir,
    ] {
      fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir {
        path: dir.clone(),
        source: e,
      })?;
    }
    Ok(())
  }

  pub fn config_path(&self) -> PathBuf {
    self.build_dir.join(CONFIG_FILE_NAME)
  }
}

//! Projects, the leaf build units of a module.
//!
//! The pipeline only needs two things from a project file: a string metadata
//! lookup and the list of project files it references. Both come from a
//! [`ProjectExplorer`], which also decides what counts as a project and how a
//! module is named.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::checksum::ChecksumRecord;
use crate::config::BuildConfig;
use crate::consts::{MODULE_MARKER_EXTENSION, MODULE_MARKER_SUFFIX, PACKAGE_FILE_NAME};
use crate::task::TaskScope;
use crate::vars::TaskVars;

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("failed to read project file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse project file {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("project file {path} must contain an object")]
  NotAnObject { path: PathBuf },

  #[error("failed to search {path} for projects: {message}")]
  Search { path: PathBuf, message: String },
}

/// Case-insensitive string metadata read from a project file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(BTreeMap<String, String>);

impl Properties {
  pub fn insert(&mut self, key: &str, value: impl Into<String>) {
    self.0.insert(key.to_lowercase(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.0.get(&key.to_lowercase()).map(String::as_str)
  }

  /// First present, non-blank value among `keys`.
  pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
    keys.iter().filter_map(|key| self.get(key)).find(|v| !v.trim().is_empty())
  }

  pub fn description(&self) -> Option<&str> {
    self.get("description")
  }

  pub fn author(&self) -> Option<&str> {
    self.get("author")
  }

  pub fn copyright(&self) -> Option<&str> {
    self.get("copyright")
  }

  pub fn version(&self) -> Option<&str> {
    self.get("version")
  }

  pub fn company(&self) -> Option<&str> {
    self.get("company")
  }

  pub fn product(&self) -> Option<&str> {
    self.get("name")
  }

  pub fn repo_url(&self) -> Option<&str> {
    self.get("repository")
  }

  /// Directory holding the build output, relative to the project.
  pub fn output_dir(&self) -> Option<&str> {
    self.first_of(&["output_dir", "output"])
  }

  pub fn target_framework(&self) -> Option<&str> {
    self.get("target_framework")
  }
}

/// What an explorer extracts from a project file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectData {
  pub properties: Properties,
  /// Paths or file names of referenced project files.
  pub references: Vec<String>,
}

/// Result of change detection for a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Freshness {
  /// Detection has not run in this pipeline.
  #[default]
  Unknown,
  UpToDate,
  Changed,
}

#[derive(Debug, Clone)]
pub struct Project {
  /// The project file.
  pub file: PathBuf,
  pub name: String,
  /// `name` made safe for use in file names.
  pub safe_name: String,
  pub dir: PathBuf,
  /// File names of referenced projects, never including this project.
  pub references: Vec<String>,
  pub properties: Properties,
  pub freshness: Freshness,
  /// Fingerprint to store once the next build of this project succeeds.
  pub pending_checksum: Option<ChecksumRecord>,
  pub vars: TaskVars,
}

/// Replace path separators so a project name can be used in a file name.
pub fn safe_name(name: &str) -> String {
  name.replace(['/', '\\'], "-")
}

impl Project {
  /// Create a project for `file`, named after its directory until its data
  /// is loaded.
  pub fn new(file: PathBuf) -> Self {
    let dir = file.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = dir
      .file_name()
      .map(|n| n.to_string_lossy().to_string())
      .unwrap_or_default();

    Self {
      safe_name: safe_name(&name),
      file,
      name,
      dir,
      references: Vec::new(),
      properties: Properties::default(),
      freshness: Freshness::Unknown,
      pending_checksum: None,
      vars: TaskVars::new(),
    }
  }

  /// File name of the project file, the key other projects reference it by.
  pub fn file_name(&self) -> &str {
    self.file.file_name().and_then(|n| n.to_str()).unwrap_or_default()
  }

  /// Apply loaded data: metadata, name, and normalized references.
  pub fn apply_data(&mut self, data: ProjectData) {
    if let Some(product) = data.properties.product().filter(|p| !p.trim().is_empty()) {
      self.name = product.to_string();
      self.safe_name = safe_name(&self.name);
    }

    let own = self.file_name().to_string();
    let mut references: Vec<String> = data
      .references
      .iter()
      .filter_map(|r| {
        let trimmed = r.trim_end_matches(['/', '\\']);
        trimmed.rsplit(['/', '\\']).next().map(str::to_string)
      })
      .filter(|r| !r.is_empty() && *r != own)
      .collect();
    references.dedup();

    self.references = references;
    self.properties = data.properties;
  }

  /// Directory the project's build output lands in, relative to the project.
  pub fn binary_dir<'a>(&'a self, config: &'a BuildConfig) -> &'a str {
    self.properties.output_dir().unwrap_or(&config.project_bin_dir)
  }

  /// Derive this project's variables from its module's.
  pub fn prepare_vars(&mut self, module_vars: &TaskVars, config: &BuildConfig) {
    let mut vars = module_vars.clone();
    let props = &self.properties;

    vars.set("PROJECT_NAME", self.name.as_str());
    vars.set("PROJECT_DIR", self.dir.display().to_string());
    vars.set("IS_PROJECT", "True");
    vars.set("PROJ_VERSION", props.version().unwrap_or_default());
    vars.set("PROJ_DESCRIPTION", props.description().unwrap_or_default());
    vars.set("PROJ_AUTHOR", props.author().unwrap_or_default());
    vars.set("PROJ_COPYRIGHT", props.copyright().unwrap_or_default());
    vars.set("PROJ_COMPANY", props.company().unwrap_or_default());
    vars.set("PROJ_URL", props.repo_url().unwrap_or_default());
    vars.set("SAFE_PROJ_NAME", self.safe_name.as_str());
    vars.set("BINARY_DIR", self.binary_dir(config));

    self.vars = vars;
  }

  pub fn is_up_to_date(&self) -> bool {
    self.freshness == Freshness::UpToDate
  }
}

impl TaskScope for Project {
  fn artifact_name(&self) -> &str {
    &self.name
  }

  fn working_dir(&self) -> &Path {
    &self.dir
  }

  fn taskfile_name(&self) -> Option<&str> {
    None
  }

  fn vars(&self) -> &TaskVars {
    &self.vars
  }
}

/// Module name derived from a marker file, and the marker's file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMarker {
  pub name: String,
  pub file_name: String,
}

/// Finds and reads the projects of a module.
pub trait ProjectExplorer: Send + Sync {
  /// Name the module rooted at `dir` from a marker file, if there is one.
  fn module_marker(&self, dir: &Path) -> Option<ModuleMarker>;

  /// Find every project in the module, in a stable order.
  fn discover(&self, module_dir: &Path, config: &BuildConfig) -> Result<Vec<Project>, ProjectError>;

  /// Read a project's metadata and references.
  fn read_data(&self, project: &Project) -> Result<ProjectData, ProjectError>;
}

/// Explorer for key/value `package.json` projects.
///
/// Every `package.json` outside excluded directories is a project. Its
/// string-valued top-level keys become metadata; it references nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageExplorer;

impl ProjectExplorer for PackageExplorer {
  fn module_marker(&self, dir: &Path) -> Option<ModuleMarker> {
    let mut markers: Vec<PathBuf> = fs::read_dir(dir)
      .ok()?
      .filter_map(|entry| entry.ok().map(|e| e.path()))
      .filter(|path| {
        path.is_file()
          && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(MODULE_MARKER_EXTENSION))
      })
      .collect();
    markers.sort();

    let marker = markers.into_iter().next()?;
    let file_name = marker.file_name()?.to_string_lossy().to_string();
    let stem = marker.file_stem()?.to_string_lossy().replace(MODULE_MARKER_SUFFIX, "");

    Some(ModuleMarker { name: stem, file_name })
  }

  fn discover(&self, module_dir: &Path, config: &BuildConfig) -> Result<Vec<Project>, ProjectError> {
    let walker = WalkDir::new(module_dir).into_iter().filter_entry(|e| {
      if e.depth() == 0 || !e.file_type().is_dir() {
        return true;
      }
      let name = e.file_name().to_string_lossy();
      !config.excluded_dirs.iter().any(|x| x.eq_ignore_ascii_case(&name))
    });

    let mut files = Vec::new();
    for entry in walker {
      let entry = entry.map_err(|e| ProjectError::Search {
        path: module_dir.to_path_buf(),
        message: e.to_string(),
      })?;
      if entry.file_type().is_file() && entry.file_name() == PACKAGE_FILE_NAME {
        files.push(entry.into_path());
      }
    }
    files.sort();

    debug!(module = %module_dir.display(), count = files.len(), "discovered projects");
    Ok(files.into_iter().map(Project::new).collect())
  }

  fn read_data(&self, project: &Project) -> Result<ProjectData, ProjectError> {
    let path = &project.file;
    let content = fs::read_to_string(path).map_err(|e| ProjectError::Read {
      path: path.clone(),
      source: e,
    })?;
    let root: Value = serde_json::from_str(&content).map_err(|e| ProjectError::Parse {
      path: path.clone(),
      source: e,
    })?;
    let Value::Object(map) = root else {
      return Err(ProjectError::NotAnObject { path: path.clone() });
    };

    let mut properties = Properties::default();
    for (key, value) in map {
      if let Value::String(s) = value {
        properties.insert(&key, s);
      }
    }

    Ok(ProjectData {
      properties,
      references: Vec::new(),
    })
  }
}

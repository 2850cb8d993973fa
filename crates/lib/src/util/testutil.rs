//! Test doubles for modbuild-lib.
//!
//! These stand in for the task runner, the repository reader, and the
//! project explorer so pipeline logic can be tested without spawning
//! processes or creating real repositories.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::config::BuildConfig;
use crate::project::{ModuleMarker, PackageExplorer, Project, ProjectData, ProjectError, ProjectExplorer};
use crate::task::{StepRunner, TaskCommand, TaskError, TaskInvocation, TaskScope};
use crate::vars::TaskVars;
use crate::vcs::{CommitInfo, RepoState, SourceControl, TagInfo, VcsError};

/// Step runner that records invocations and answers with canned exit codes.
#[derive(Default)]
pub struct RecordingRunner {
  codes: HashMap<(Option<String>, String), i32>,
  calls: Mutex<Vec<TaskInvocation>>,
}

impl RecordingRunner {
  pub fn new() -> Self {
    Self::default()
  }

  /// Exit with `code` whenever `command` runs.
  pub fn with_code(mut self, command: TaskCommand, code: i32) -> Self {
    self.codes.insert((None, command.as_str().to_string()), code);
    self
  }

  /// Exit with `code` when `command` runs for `artifact`.
  pub fn with_artifact_code(mut self, artifact: &str, command: TaskCommand, code: i32) -> Self {
    self
      .codes
      .insert((Some(artifact.to_string()), command.as_str().to_string()), code);
    self
  }

  pub fn invocations(&self) -> Vec<TaskInvocation> {
    self.calls.lock().unwrap().clone()
  }
}

#[async_trait]
impl StepRunner for RecordingRunner {
  async fn run(&self, invocation: &TaskInvocation, cancel: &CancellationToken) -> Result<i32, TaskError> {
    if cancel.is_cancelled() {
      return Err(TaskError::Cancelled);
    }
    self.calls.lock().unwrap().push(invocation.clone());

    let command = invocation.args.last().cloned().unwrap_or_default();
    let code = self
      .codes
      .get(&(Some(invocation.artifact.clone()), command.clone()))
      .or_else(|| self.codes.get(&(None, command)))
      .copied()
      .unwrap_or(0);
    Ok(code)
  }
}

/// Minimal task scope.
pub struct TestScope {
  pub name: String,
  pub dir: PathBuf,
  pub taskfile: Option<String>,
  pub vars: TaskVars,
}

impl TestScope {
  pub fn new(name: &str, dir: &Path) -> Self {
    Self {
      name: name.to_string(),
      dir: dir.to_path_buf(),
      taskfile: None,
      vars: TaskVars::new(),
    }
  }

  pub fn with_taskfile(mut self, name: &str) -> Self {
    self.taskfile = Some(name.to_string());
    self
  }
}

impl TaskScope for TestScope {
  fn artifact_name(&self) -> &str {
    &self.name
  }

  fn working_dir(&self) -> &Path {
    &self.dir
  }

  fn taskfile_name(&self) -> Option<&str> {
    self.taskfile.as_deref()
  }

  fn vars(&self) -> &TaskVars {
    &self.vars
  }
}

/// Source control answering with preset states per repository root.
#[derive(Default)]
pub struct FakeSourceControl {
  states: Mutex<HashMap<PathBuf, RepoState>>,
}

impl FakeSourceControl {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&self, root: &Path, state: RepoState) {
    self.states.lock().unwrap().insert(root.to_path_buf(), state);
  }
}

impl SourceControl for FakeSourceControl {
  fn read_state(&self, root: &Path) -> Result<RepoState, VcsError> {
    self
      .states
      .lock()
      .unwrap()
      .get(root)
      .cloned()
      .ok_or_else(|| VcsError::Read {
        path: root.to_path_buf(),
        message: "no fake state".to_string(),
      })
  }
}

/// Package explorer with injected project references, keyed by project name.
#[derive(Default)]
pub struct StaticExplorer {
  references: HashMap<String, Vec<String>>,
}

impl StaticExplorer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_references(mut self, project: &str, references: &[&str]) -> Self {
    self
      .references
      .insert(project.to_string(), references.iter().map(|r| r.to_string()).collect());
    self
  }
}

impl ProjectExplorer for StaticExplorer {
  fn module_marker(&self, dir: &Path) -> Option<ModuleMarker> {
    PackageExplorer.module_marker(dir)
  }

  fn discover(&self, module_dir: &Path, config: &BuildConfig) -> Result<Vec<Project>, ProjectError> {
    PackageExplorer.discover(module_dir, config)
  }

  fn read_data(&self, project: &Project) -> Result<ProjectData, ProjectError> {
    let mut data = PackageExplorer.read_data(project)?;
    let name = data.properties.product().unwrap_or(&project.name).to_string();
    data.references = self.references.get(&name).cloned().unwrap_or_default();
    Ok(data)
  }
}

/// Repository state whose commits have the given ids, HEAD first.
pub fn commit_chain(shas: &[&str]) -> RepoState {
  let commits = shas
    .iter()
    .enumerate()
    .map(|(i, sha)| CommitInfo {
      sha: sha.to_string(),
      message: format!("commit {sha}\n\nbody"),
      short_message: format!("commit {sha}"),
      author: "Dev".to_string(),
      committer: "Dev".to_string(),
      date: DateTime::<Utc>::from_timestamp(1_700_000_000 - i as i64 * 60, 0).unwrap(),
    })
    .collect();

  RepoState {
    head: shas.first().map(|s| s.to_string()),
    branch: Some("main".to_string()),
    commits,
    tags: Vec::new(),
  }
}

/// Lightweight tag pointing at `target`.
pub fn tag(name: &str, target: &str) -> TagInfo {
  TagInfo {
    name: name.to_string(),
    target: target.to_string(),
    message: None,
    author: None,
  }
}

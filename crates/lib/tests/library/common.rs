//! Shared doubles and workspace setup for library integration tests.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use modbuild_lib::config::{BuildConfig, DirectoryIndex};
use modbuild_lib::module::ModuleContext;
use modbuild_lib::project::{ModuleMarker, PackageExplorer, Project, ProjectData, ProjectError, ProjectExplorer};
use modbuild_lib::task::{ProcessRunner, StepRunner, TaskCommand, TaskError, TaskFile, TaskInvocation};
use modbuild_lib::vcs::{CommitInfo, RepoState, SourceControl, VcsError};
use modbuild_lib::{BuildPipeline, Selection};

/// Answers every invocation with a canned exit code and records
/// `(artifact, command)` pairs.
#[derive(Default)]
pub struct ScriptedRunner {
  codes: HashMap<(String, String), i32>,
  calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedRunner {
  pub fn exit_with(mut self, artifact: &str, command: TaskCommand, code: i32) -> Self {
    self
      .codes
      .insert((artifact.to_string(), command.as_str().to_string()), code);
    self
  }

  pub fn calls(&self) -> Vec<(String, String)> {
    self.calls.lock().unwrap().clone()
  }

  /// Artifacts `command` ran for, in order.
  pub fn ran(&self, command: TaskCommand) -> Vec<String> {
    self
      .calls()
      .into_iter()
      .filter(|(_, c)| c == command.as_str())
      .map(|(a, _)| a)
      .collect()
  }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
  async fn run(&self, invocation: &TaskInvocation, _cancel: &CancellationToken) -> Result<i32, TaskError> {
    let command = invocation.args.last().cloned().unwrap_or_default();
    let key = (invocation.artifact.clone(), command);
    self.calls.lock().unwrap().push(key.clone());
    Ok(self.codes.get(&key).copied().unwrap_or(0))
  }
}

/// Repository states held in memory, keyed by module root.
#[derive(Default)]
pub struct MemoryRepos {
  states: Mutex<HashMap<PathBuf, RepoState>>,
}

impl MemoryRepos {
  pub fn set(&self, root: &Path, state: RepoState) {
    self.states.lock().unwrap().insert(root.to_path_buf(), state);
  }
}

impl SourceControl for MemoryRepos {
  fn read_state(&self, root: &Path) -> Result<RepoState, VcsError> {
    Ok(self.states.lock().unwrap().get(root).cloned().unwrap_or_default())
  }
}

/// Linear history with the given ids, HEAD first.
pub fn history(shas: &[&str]) -> RepoState {
  RepoState {
    head: shas.first().map(|s| s.to_string()),
    branch: Some("main".to_string()),
    commits: shas
      .iter()
      .enumerate()
      .map(|(i, sha)| CommitInfo {
        sha: sha.to_string(),
        message: format!("change {i}"),
        short_message: format!("change {i}"),
        author: "ci".to_string(),
        committer: "ci".to_string(),
        date: DateTime::<Utc>::from_timestamp(1_700_000_000 - i as i64 * 3600, 0).unwrap(),
      })
      .collect(),
    tags: Vec::new(),
  }
}

/// Package projects whose comma separated `deps` property lists the
/// projects they reference.
pub struct DepsExplorer;

impl ProjectExplorer for DepsExplorer {
  fn module_marker(&self, dir: &Path) -> Option<ModuleMarker> {
    PackageExplorer.module_marker(dir)
  }

  fn discover(&self, module_dir: &Path, config: &BuildConfig) -> Result<Vec<Project>, ProjectError> {
    PackageExplorer.discover(module_dir, config)
  }

  fn read_data(&self, project: &Project) -> Result<ProjectData, ProjectError> {
    let mut data = PackageExplorer.read_data(project)?;
    data.references = data
      .properties
      .get("deps")
      .map(|deps| {
        deps
          .split(',')
          .map(str::trim)
          .filter(|d| !d.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default();
    Ok(data)
  }
}

/// A base directory of fake modules sharing one checksum store.
pub struct Workspace {
  pub temp: TempDir,
  pub runner: Arc<ScriptedRunner>,
  pub repos: Arc<MemoryRepos>,
  pub ctx: Arc<ModuleContext>,
}

impl Workspace {
  pub fn new(runner: ScriptedRunner) -> Self {
    let runner = Arc::new(runner);
    Self::with_tasks(runner.clone(), TaskFile::new("task", runner, CancellationToken::new()))
  }

  /// Run tasks as real processes of `program`.
  pub fn with_process_runner(program: &Path) -> Self {
    let tasks = TaskFile::new(
      program.to_string_lossy(),
      Arc::new(ProcessRunner),
      CancellationToken::new(),
    );
    Self::with_tasks(Arc::new(ScriptedRunner::default()), tasks)
  }

  fn with_tasks(runner: Arc<ScriptedRunner>, tasks: TaskFile) -> Self {
    let temp = TempDir::new().unwrap();
    let index = Arc::new(DirectoryIndex::create(temp.path(), None).unwrap());
    let config = Arc::new(BuildConfig::load_or_create(&index, false).unwrap());
    let repos = Arc::new(MemoryRepos::default());
    let ctx = Arc::new(ModuleContext::new(config, index, tasks, repos.clone(), Arc::new(DepsExplorer)));
    Self {
      temp,
      runner,
      repos,
      ctx,
    }
  }

  pub fn path(&self, relative: &str) -> PathBuf {
    self.temp.path().join(relative)
  }

  pub fn write(&self, relative: &str, content: &str) {
    let path = self.path(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
  }

  /// Add a module whose projects are `(name, deps)` pairs.
  pub fn add_module(&self, name: &str, projects: &[(&str, &[&str])]) {
    fs::create_dir_all(self.path(&format!("{name}/.git"))).unwrap();
    for (project, deps) in projects {
      self.write(
        &format!("{name}/{project}/package.json"),
        &format!(r#"{{"name": "{project}", "deps": "{}"}}"#, deps.join(",")),
      );
      self.write(&format!("{name}/{project}/src/lib.rs"), "pub fn run() {}");
    }
    self.repos.set(&self.path(name), history(&["c2", "c1"]));
  }

  /// Discover and load every module, like a fresh process would.
  pub async fn pipeline(&self) -> BuildPipeline {
    let mut pipeline = BuildPipeline::discover(self.ctx.clone()).unwrap();
    pipeline.load(&Selection::default()).await.unwrap();
    pipeline
  }

  /// Detect changes and build, as `modbuild build` does.
  pub async fn build_run(&self) -> BuildPipeline {
    let mut pipeline = self.pipeline().await;
    pipeline.check_for_changes().await.unwrap();
    pipeline.build(false).await.unwrap();
    pipeline
  }
}

//! Modules: version-controlled aggregates of projects, rebuilt as a unit.
//!
//! A [`Module`] owns its projects and drives every lifecycle step through the
//! command protocol: the module scope first, then each project in discovery
//! order. What counts as a project and how the module is named comes from
//! the [`ProjectExplorer`] in its [`ModuleContext`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use tracing::{debug, info};

use crate::checksum::{ChecksumRecord, ChecksumStore, compute_fingerprint, is_up_to_date};
use crate::closure::{ModuleDependencies, ProjectRefs};
use crate::config::{BuildConfig, DirectoryIndex};
use crate::error::BuildError;
use crate::files::ModuleFiles;
use crate::project::{Freshness, ModuleMarker, Project, ProjectExplorer};
use crate::task::{TaskCommand, TaskFile, TaskScope};
use crate::util::run_all;
use crate::vars::TaskVars;
use crate::vcs::{RepoState, SourceControl};
use crate::version::derive_ci_version;

/// Collaborators shared by every module of a pipeline.
pub struct ModuleContext {
  pub config: Arc<BuildConfig>,
  pub index: Arc<DirectoryIndex>,
  pub tasks: TaskFile,
  pub vcs: Arc<dyn SourceControl>,
  pub explorer: Arc<dyn ProjectExplorer>,
  pub sums: ChecksumStore,
}

impl ModuleContext {
  pub fn new(
    config: Arc<BuildConfig>,
    index: Arc<DirectoryIndex>,
    tasks: TaskFile,
    vcs: Arc<dyn SourceControl>,
    explorer: Arc<dyn ProjectExplorer>,
  ) -> Self {
    let sums = ChecksumStore::new(index.sum_dir.clone());
    Self {
      config,
      index,
      tasks,
      vcs,
      explorer,
      sums,
    }
  }
}

pub struct Module {
  name: String,
  dir: PathBuf,
  marker: Option<ModuleMarker>,
  files: ModuleFiles,
  ctx: Arc<ModuleContext>,
  repo: Option<RepoState>,
  version: Option<Version>,
  projects: Vec<Project>,
  vars: TaskVars,
}

impl Module {
  /// Create an unloaded module for the repository at `dir`.
  ///
  /// The module is named after its marker file when the explorer finds one,
  /// else after its directory.
  pub fn new(dir: PathBuf, ctx: Arc<ModuleContext>) -> Self {
    let marker = ctx.explorer.module_marker(&dir);
    let name = match &marker {
      Some(marker) => marker.name.clone(),
      None => dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default(),
    };
    let files = ModuleFiles::new(&ctx.index, &ctx.config, &name);

    Self {
      name,
      dir,
      marker,
      files,
      ctx,
      repo: None,
      version: None,
      projects: Vec::new(),
      vars: TaskVars::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  pub fn files(&self) -> &ModuleFiles {
    &self.files
  }

  pub fn projects(&self) -> &[Project] {
    &self.projects
  }

  pub fn repo(&self) -> Option<&RepoState> {
    self.repo.as_ref()
  }

  /// CI build version, once loaded.
  pub fn version(&self) -> Option<&Version> {
    self.version.as_ref()
  }

  pub fn is_loaded(&self) -> bool {
    self.repo.is_some()
  }

  pub fn vars(&self) -> &TaskVars {
    &self.vars
  }

  /// HEAD commit id of the loaded repository.
  pub fn head(&self) -> Result<&str, BuildError> {
    self
      .repo
      .as_ref()
      .and_then(|r| r.head.as_deref())
      .ok_or_else(|| BuildError::NotLoaded(self.name.clone()))
  }

  pub fn repo_state(&self) -> Result<&RepoState, BuildError> {
    self.repo.as_ref().ok_or_else(|| BuildError::NotLoaded(self.name.clone()))
  }

  fn tasks(&self) -> TaskFile {
    self.ctx.tasks.clone()
  }

  async fn read_repo(&self) -> Result<RepoState, BuildError> {
    let vcs = self.ctx.vcs.clone();
    let dir = self.dir.clone();
    Ok(tokio::task::spawn_blocking(move || vcs.read_state(&dir)).await??)
  }

  fn derive_version(&self, state: &RepoState) -> Result<Version, BuildError> {
    let config = &self.ctx.config;
    Ok(derive_ci_version(state, &config.default_ci_version, config.semver_style)?)
  }

  /// Read the repository, derive the build version, and discover and load
  /// every project.
  ///
  /// `vars` is this module's own copy of the root scope.
  pub async fn load(&mut self, vars: TaskVars) -> Result<(), BuildError> {
    let state = self.read_repo().await?;
    let Some(head) = state.head.clone().filter(|_| state.has_commits()) else {
      return Err(BuildError::Discovery {
        module: self.name.clone(),
        message: "repository has no commit history, no change baseline is possible".to_string(),
      });
    };
    let version = self.derive_version(&state)?;
    let config = self.ctx.config.clone();

    let mut vars = vars;
    if let Some(marker) = &self.marker {
      vars.set("SOLUTION_FILE_NAME", marker.file_name.as_str());
    }
    vars.set("MODULE_NAME", self.name.as_str());
    vars.set("OUTPUT_DIR", self.files.output_dir().display().to_string());
    vars.set("MODULE_DIR", self.dir.display().to_string());
    vars.set("HEAD_SHA", head.as_str());
    vars.set("BRANCH_NAME", state.branch.clone().unwrap_or_default());
    vars.set("BUILD_VERSION", version.to_string());
    vars.set(
      "FULL_ARCHIVE_FILE_NAME",
      self.dir.join(&config.source_archive_name).display().to_string(),
    );
    vars.set("ARCHIVE_FILE_NAME", config.source_archive_name.as_str());
    vars.set("ARCHIVE_FILE_FORMAT", config.source_archive_format.as_str());

    info!(module = %self.name, "discovering projects");

    let explorer = self.ctx.explorer.clone();
    let dir = self.dir.clone();
    let discover_config = config.clone();
    let mut projects = tokio::task::spawn_blocking(move || {
      let mut projects = explorer.discover(&dir, &discover_config)?;
      for project in &mut projects {
        let data = explorer.read_data(project)?;
        project.apply_data(data);
      }
      Ok::<_, crate::project::ProjectError>(projects)
    })
    .await??;

    for project in &mut projects {
      project.prepare_vars(&vars, &config);
    }

    info!(module = %self.name, count = projects.len(), "loaded projects");
    info!(module = %self.name, version = %version, "CI build version");

    self.projects = projects;
    self.vars = vars;
    self.version = Some(version);
    self.repo = Some(state);
    Ok(())
  }

  /// Pull remote changes through the task runner's `update` verb, then
  /// refresh the HEAD commit and build version.
  pub async fn sync(&mut self) -> Result<(), BuildError> {
    info!(module = %self.name, "checking for source code updates");

    self.tasks().exec(&*self, TaskCommand::Update, true).await?;

    let state = self.read_repo().await?;
    let head = state.head.clone().unwrap_or_default();
    let version = self.derive_version(&state)?;

    for vars in std::iter::once(&mut self.vars).chain(self.projects.iter_mut().map(|p| &mut p.vars)) {
      vars.set("HEAD_SHA", head.as_str());
      vars.set("BUILD_VERSION", version.to_string());
    }

    info!(module = %self.name, version = %version, "CI build version is now");
    self.version = Some(version);
    self.repo = Some(state);
    Ok(())
  }

  /// Fingerprint every project and compare against its stored checksum.
  ///
  /// Returns true when any project changed. Changed projects keep the fresh
  /// fingerprint as their pending checksum.
  pub async fn check_for_changes(&mut self) -> Result<bool, BuildError> {
    let head = self.head()?.to_string();
    let ctx = self.ctx.clone();
    let module = self.name.as_str();

    let checks = self.projects.iter_mut().map(|project| {
      let ctx = ctx.clone();
      let head = head.clone();
      async move {
        project.freshness = Freshness::Unknown;
        project.pending_checksum = None;

        let dir = project.dir.clone();
        let config = ctx.config.clone();
        let fresh = tokio::task::spawn_blocking(move || {
          compute_fingerprint(&dir, &config.source_file_extensions, &config.excluded_dirs)
        })
        .await??;

        let stored = ctx.sums.read_trusted(module, &project.safe_name).await;
        if is_up_to_date(&fresh, stored.as_ref()) {
          project.freshness = Freshness::UpToDate;
          debug!(module = %module, project = %project.name, "project source is up-to-date");
        } else {
          project.freshness = Freshness::Changed;
          project.pending_checksum = Some(ChecksumRecord::new(&fresh, head));
          debug!(module = %module, project = %project.name, "project source changed");
        }
        Ok::<_, BuildError>(())
      }
    });
    run_all(checks).await?;

    Ok(self.projects.iter().any(|p| !p.is_up_to_date()))
  }

  /// Reset the output directory and run the build step for the module, then
  /// for each project.
  pub async fn build(&mut self) -> Result<(), BuildError> {
    self.files.reset().await?;

    let tasks = self.tasks();
    tasks.exec(&*self, TaskCommand::Build, true).await?;
    for project in &self.projects {
      tasks.exec(project, TaskCommand::Build, true).await?;
    }
    Ok(())
  }

  /// Run the post-build step, and store pending checksums after a success.
  ///
  /// Post-build task failures are logged, never raised.
  pub async fn post_build(&mut self, success: bool) -> Result<(), BuildError> {
    let command = if success {
      TaskCommand::PostbuildSuccess
    } else {
      TaskCommand::PostbuildFailure
    };

    let tasks = self.tasks();
    tasks.exec(&*self, command, false).await?;
    for project in &self.projects {
      tasks.exec(project, command, false).await?;
    }

    if !success {
      return Ok(());
    }

    let sums = &self.ctx.sums;
    let module = self.name.as_str();
    let commits = self.projects.iter_mut().map(|project| async move {
      if let Some(record) = project.pending_checksum.take() {
        debug!(module = %module, project = %project.name, "committing checksum");
        sums.write(module, &project.safe_name, &record).await?;
        project.freshness = Freshness::UpToDate;
      }
      Ok::<_, BuildError>(())
    });
    run_all(commits).await?;
    Ok(())
  }

  pub async fn publish(&self) -> Result<(), BuildError> {
    self.run_step(TaskCommand::Publish, true).await
  }

  pub async fn test(&self, fail_on_error: bool) -> Result<(), BuildError> {
    self.run_step(TaskCommand::Test, fail_on_error).await
  }

  /// Run the clean step, then remove the module output directory.
  pub async fn clean(&self) -> Result<(), BuildError> {
    self.run_step(TaskCommand::Clean, true).await?;
    self.files.clean().await
  }

  async fn run_step(&self, command: TaskCommand, throw_on_failure: bool) -> Result<(), BuildError> {
    let tasks = self.tasks();
    tasks.exec(self, command, throw_on_failure).await?;
    for project in &self.projects {
      tasks.exec(project, command, throw_on_failure).await?;
    }
    Ok(())
  }

  /// The module as seen by dependency resolution.
  pub fn dependencies(&self) -> ModuleDependencies {
    ModuleDependencies {
      module: self.name.clone(),
      projects: self
        .projects
        .iter()
        .map(|p| ProjectRefs {
          name: p.name.clone(),
          aliases: vec![p.file_name().to_string(), p.name.clone()],
          references: p.references.clone(),
          changed: !p.is_up_to_date(),
        })
        .collect(),
    }
  }

  /// Release the repository snapshot and projects.
  pub fn dispose(&mut self) {
    self.repo = None;
    self.version = None;
    self.projects.clear();
  }
}

impl TaskScope for Module {
  fn artifact_name(&self) -> &str {
    &self.name
  }

  fn working_dir(&self) -> &Path {
    &self.dir
  }

  fn taskfile_name(&self) -> Option<&str> {
    Some(&self.ctx.config.module_taskfile_name)
  }

  fn vars(&self) -> &TaskVars {
    &self.vars
  }
}

impl std::fmt::Debug for Module {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Module")
      .field("name", &self.name)
      .field("dir", &self.dir)
      .field("projects", &self.projects.len())
      .field("loaded", &self.is_loaded())
      .finish()
  }
}

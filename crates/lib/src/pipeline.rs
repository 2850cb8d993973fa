//! The stage orchestrator.
//!
//! A [`BuildPipeline`] owns every discovered module and drives them through
//! the lifecycle stages. Loading, change detection and unsigned output
//! preparation fan out across modules; every other stage runs serially in
//! selection order and stops at the first failure.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::closure::{OutdatedReason, OutdatedSet};
use crate::error::BuildError;
use crate::module::{Module, ModuleContext};
use crate::publish::BuildPublisher;
use crate::publish::upload::UploadManager;
use crate::util::run_all;
use crate::vars::TaskVars;
use crate::vcs::find_repositories;

/// Module name filters applied when loading.
#[derive(Debug, Clone, Default)]
pub struct Selection {
  /// Only these modules, when not empty.
  pub only: Vec<String>,
  pub exclude: Vec<String>,
}

impl Selection {
  pub fn new(only: Vec<String>, exclude: Vec<String>) -> Self {
    Self { only, exclude }
  }

  pub fn includes(&self, module: &str) -> bool {
    let listed = |names: &[String]| names.iter().any(|n| n.eq_ignore_ascii_case(module));
    (self.only.is_empty() || listed(&self.only)) && !listed(&self.exclude)
  }
}

pub struct BuildPipeline {
  ctx: Arc<ModuleContext>,
  modules: Vec<Module>,
  outdated: OutdatedSet,
  vars: TaskVars,
}

impl BuildPipeline {
  /// Find every module below the base directory.
  pub fn discover(ctx: Arc<ModuleContext>) -> Result<Self, BuildError> {
    let roots = find_repositories(&ctx.index.base_dir)?;
    let modules: Vec<Module> = roots.into_iter().map(|dir| Module::new(dir, ctx.clone())).collect();
    info!(count = modules.len(), "discovered modules");

    let now = Utc::now();
    let mut vars = TaskVars::new();
    vars.set("BUILD_DIR", ctx.index.build_dir.to_string_lossy());
    vars.set("SCRATCH_DIR", ctx.index.scratch_dir.to_string_lossy());
    vars.set("UNIX_MS", now.timestamp_millis().to_string());
    vars.set("DATE", now.format("%Y-%m-%d").to_string());

    Ok(Self {
      ctx,
      modules,
      outdated: OutdatedSet::default(),
      vars,
    })
  }

  pub fn modules(&self) -> &[Module] {
    &self.modules
  }

  pub fn module(&self, name: &str) -> Option<&Module> {
    self.modules.iter().find(|m| m.name().eq_ignore_ascii_case(name))
  }

  pub fn outdated(&self) -> &OutdatedSet {
    &self.outdated
  }

  pub fn vars(&self) -> &TaskVars {
    &self.vars
  }

  pub fn context(&self) -> &Arc<ModuleContext> {
    &self.ctx
  }

  fn ensure_running(&self) -> Result<(), BuildError> {
    if self.ctx.tasks.cancel_token().is_cancelled() {
      return Err(BuildError::Cancelled);
    }
    Ok(())
  }

  /// Drop unselected modules, then load the rest concurrently. Each module
  /// gets its own copy of the root variables.
  pub async fn load(&mut self, selection: &Selection) -> Result<(), BuildError> {
    self.modules.retain(|m| {
      let keep = selection.includes(m.name());
      if !keep {
        debug!(module = %m.name(), "module not selected");
      }
      keep
    });
    self.outdated.clear();

    let vars = &self.vars;
    run_all(self.modules.iter_mut().map(|m| m.load(vars.clone()))).await?;
    info!(count = self.modules.len(), "loaded modules");
    Ok(())
  }

  /// Bring every module's sources up to date, one module at a time.
  pub async fn sync_sources(&mut self) -> Result<(), BuildError> {
    self.outdated.clear();
    let cancel = self.ctx.tasks.cancel_token().clone();
    for module in &mut self.modules {
      if cancel.is_cancelled() {
        return Err(BuildError::Cancelled);
      }
      info!(module = %module.name(), "syncing sources");
      module.sync().await?;
    }
    Ok(())
  }

  /// Fingerprint every project and resolve the outdated set.
  ///
  /// Returns true when at least one module must be rebuilt.
  pub async fn check_for_changes(&mut self) -> Result<bool, BuildError> {
    self.outdated.clear();
    run_all(self.modules.iter_mut().map(|m| m.check_for_changes())).await?;

    let dependencies: Vec<_> = self.modules.iter().map(Module::dependencies).collect();
    self.outdated = OutdatedSet::resolve(&dependencies);

    for entry in self.outdated.entries() {
      if let OutdatedReason::SourceChanged { projects } = &entry.reason {
        info!(module = %entry.module, projects = ?projects, "module OUTDATED because its sources changed");
      }
    }
    Ok(!self.outdated.is_empty())
  }

  /// Build the outdated modules, or every module when `force` is set.
  ///
  /// Outdated modules build in the order they became outdated, so a changed
  /// module always builds before the modules depending on it. Forced builds
  /// follow selection order. Modules build one at a time. A failed build
  /// still runs the module's failure post-build step, then stops the pass.
  pub async fn build(&mut self, force: bool) -> Result<(), BuildError> {
    let selected: Vec<usize> = if force {
      (0..self.modules.len()).collect()
    } else {
      self
        .outdated
        .modules()
        .filter_map(|name| self.modules.iter().position(|m| m.name() == name))
        .collect()
    };

    if selected.is_empty() {
      info!("No modules detected changes");
      return Ok(());
    }

    for i in selected {
      self.ensure_running()?;
      build_single(&mut self.modules[i]).await?;
    }
    Ok(())
  }

  pub async fn publish(&self) -> Result<(), BuildError> {
    for module in &self.modules {
      self.ensure_running()?;
      info!(module = %module.name(), "publishing");
      module.publish().await?;
    }
    Ok(())
  }

  /// Gather each module's output. Signing serializes the work since the
  /// signing agent is shared.
  pub async fn prepare_output(&self, publisher: &BuildPublisher) -> Result<(), BuildError> {
    if publisher.sign_enabled() {
      for module in &self.modules {
        self.ensure_running()?;
        publisher.prepare_module_output(module).await?;
      }
      return Ok(());
    }

    run_all(self.modules.iter().map(|m| publisher.prepare_module_output(m))).await?;
    Ok(())
  }

  pub async fn upload(&self, publisher: &BuildPublisher, uploader: &dyn UploadManager) -> Result<(), BuildError> {
    for module in &self.modules {
      self.ensure_running()?;
      publisher.upload_module_output(uploader, module).await?;
    }
    Ok(())
  }

  pub async fn clean(&self) -> Result<(), BuildError> {
    for module in &self.modules {
      self.ensure_running()?;
      info!(module = %module.name(), "cleaning");
      module.clean().await?;
    }
    Ok(())
  }

  pub async fn run_tests(&self, fail_on_error: bool) -> Result<(), BuildError> {
    for module in &self.modules {
      self.ensure_running()?;
      info!(module = %module.name(), "testing");
      module.test(fail_on_error).await?;
    }
    Ok(())
  }
}

async fn build_single(module: &mut Module) -> Result<(), BuildError> {
  info!(module = %module.name(), "building");
  match module.build().await {
    Ok(()) => module.post_build(true).await,
    Err(err) => {
      if let Err(post) = module.post_build(false).await {
        warn!(module = %module.name(), error = %post, "post-build step failed after build failure");
      }
      Err(err)
    }
  }
}

impl Drop for BuildPipeline {
  fn drop(&mut self) {
    for module in &mut self.modules {
      module.dispose();
    }
  }
}

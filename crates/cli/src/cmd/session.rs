//! Shared setup for every pipeline command.
//!
//! Creates the build directories, installs logging, trims old logs, loads
//! the config, then discovers and loads the selected modules.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use modbuild_lib::config::{BuildConfig, DirectoryIndex};
use modbuild_lib::module::ModuleContext;
use modbuild_lib::project::PackageExplorer;
use modbuild_lib::task::{ProcessRunner, TaskFile};
use modbuild_lib::vcs::GitSourceControl;
use modbuild_lib::{BuildPipeline, Selection};

use crate::logging::{self, LogLevel};
use crate::output::{print_module, print_stage, print_summary};
use crate::prompts::wait_for_enter;

/// Options common to every pipeline command.
#[derive(Debug, Clone)]
pub struct SessionOptions {
  pub base_dir: PathBuf,
  pub output_dir: Option<PathBuf>,
  pub include: Vec<String>,
  pub exclude: Vec<String>,
  pub confirm: bool,
  pub max_logs: usize,
  pub log_level: LogLevel,
  pub silent: bool,
}

pub struct Session {
  pub index: Arc<DirectoryIndex>,
  pub config: Arc<BuildConfig>,
  pub pipeline: BuildPipeline,
  pub cancel: CancellationToken,
  pub confirm: bool,
  started: Instant,
}

impl Session {
  pub async fn open(options: SessionOptions, cancel: CancellationToken) -> Result<Self> {
    let started = Instant::now();

    let index = DirectoryIndex::create(&options.base_dir, options.output_dir.as_deref())
      .context("Failed to create build directories")?;
    let log_file = logging::init(&index.log_dir, options.log_level, options.silent)?;
    let removed = logging::trim_logs(&index.log_dir, options.max_logs);
    debug!(log = %log_file.display(), removed, "logging initialized");

    let config = Arc::new(BuildConfig::load_or_create(&index, false).context("Failed to load build config")?);
    let index = Arc::new(index);

    let tasks = TaskFile::new(config.task_exe.clone(), Arc::new(ProcessRunner), cancel.clone());
    let ctx = Arc::new(ModuleContext::new(
      config.clone(),
      index.clone(),
      tasks,
      Arc::new(GitSourceControl),
      Arc::new(PackageExplorer),
    ));

    let mut pipeline = BuildPipeline::discover(ctx).context("Failed to discover modules")?;
    pipeline
      .load(&Selection::new(options.include, options.exclude))
      .await
      .context("Failed to load modules")?;

    print_stage(&format!("Loaded {} module(s)", pipeline.modules().len()));
    for module in pipeline.modules() {
      print_module(module);
    }

    if options.confirm {
      wait_for_enter("---- Pipeline loaded. Press enter to continue ----", &cancel).await?;
    }

    Ok(Self {
      index,
      config,
      pipeline,
      cancel,
      confirm: options.confirm,
      started,
    })
  }

  /// Print the closing message and run duration.
  pub fn finish(&self, message: &str) {
    print_summary(message, self.started.elapsed());
  }
}

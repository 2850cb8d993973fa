mod cmd;
mod logging;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;

use modbuild_lib::BuildError;

use crate::cmd::SessionOptions;
use crate::logging::LogLevel;
use crate::output::print_fatal;

/// modbuild - Incremental multi-module build orchestrator
#[derive(Parser)]
#[command(name = "modbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable trace output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Enable debug output
  #[arg(short, long, global = true)]
  debug: bool,

  /// Disable console log output
  #[arg(short, long, global = true)]
  silent: bool,

  /// Force the operation even if no steps are required
  #[arg(short, long, global = true)]
  force: bool,

  /// Only use the specified modules, comma separated
  #[arg(short, long, global = true, value_delimiter = ',')]
  include: Vec<String>,

  /// Ignore the specified modules, comma separated
  #[arg(short = 'x', long, global = true, value_delimiter = ',')]
  exclude: Vec<String>,

  /// Wait for user input before continuing
  #[arg(short, long, global = true)]
  confirm: bool,

  /// Base build directory (default: current directory)
  #[arg(short = 'B', long, global = true)]
  build_dir: Option<PathBuf>,

  /// Maximum number of log files to keep
  #[arg(short = 'L', long, global = true, default_value_t = 50)]
  max_logs: usize,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every module whose sources changed, and their dependants
  Build {
    /// Skip the countdown before building
    #[arg(short = 'S', long)]
    no_delay: bool,

    /// Countdown before building (e.g. "10s", "1m")
    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    delay: Duration,
  },

  /// Run the clean step and remove cached checksums
  Clean,

  /// Publish modules and prepare their output
  Publish {
    /// Directory to upload module output to
    #[arg(long)]
    upload_path: Option<PathBuf>,

    /// Sign artifacts with gpg
    #[arg(long)]
    sign: bool,

    /// Key to sign with, otherwise the gpg default key
    #[arg(long)]
    gpg_key: Option<String>,

    /// Output directory for published modules
    #[arg(long)]
    output: Option<PathBuf>,
  },

  /// Run module tests
  Test {
    /// Keep testing after a test step fails
    #[arg(long)]
    no_fail: bool,
  },

  /// Update module sources
  Update,
}

impl Cli {
  fn log_level(&self) -> LogLevel {
    if self.verbose {
      LogLevel::Trace
    } else if self.debug {
      LogLevel::Debug
    } else {
      LogLevel::Info
    }
  }

  fn session_options(&self, output: Option<PathBuf>) -> anyhow::Result<SessionOptions> {
    let base = match &self.build_dir {
      Some(dir) => dir.clone(),
      None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let base = dunce::canonicalize(&base).with_context(|| format!("Build directory not found: {}", base.display()))?;

    Ok(SessionOptions {
      base_dir: base,
      output_dir: output,
      include: self.include.clone(),
      exclude: self.exclude.clone(),
      confirm: self.confirm,
      max_logs: self.max_logs,
      log_level: self.log_level(),
      silent: self.silent,
    })
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let runtime = match tokio::runtime::Runtime::new() {
    Ok(rt) => rt,
    Err(e) => {
      print_fatal(&format!("Failed to create async runtime: {e}"));
      return ExitCode::FAILURE;
    }
  };

  let cancel = CancellationToken::new();
  let result = runtime.block_on(async {
    let watcher = cancel.clone();
    tokio::spawn(async move {
      if signal::ctrl_c().await.is_ok() {
        watcher.cancel();
      }
    });
    run(cli, cancel.clone()).await
  });

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) if cancel.is_cancelled() || is_cancelled(&err) => {
      print_fatal("Operation cancelled");
      ExitCode::FAILURE
    }
    Err(err) => {
      print_fatal(&format!("FATAL: {err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
  err
    .chain()
    .any(|cause| cause.downcast_ref::<BuildError>().is_some_and(BuildError::is_cancelled))
}

async fn run(cli: Cli, cancel: CancellationToken) -> anyhow::Result<()> {
  match &cli.command {
    Commands::Build { no_delay, delay } => {
      let options = cli.session_options(None)?;
      let delay = if *no_delay { Duration::ZERO } else { *delay };
      cmd::cmd_build(options, cli.force, delay, cancel).await
    }
    Commands::Clean => cmd::cmd_clean(cli.session_options(None)?, cancel).await,
    Commands::Publish {
      upload_path,
      sign,
      gpg_key,
      output,
    } => {
      let options = cli.session_options(output.clone())?;
      let publish = cmd::PublishOptions {
        upload_path: upload_path.clone(),
        sign: *sign,
        gpg_key: gpg_key.clone(),
      };
      cmd::cmd_publish(options, publish, cancel).await
    }
    Commands::Test { no_fail } => cmd::cmd_test(cli.session_options(None)?, !no_fail, cancel).await,
    Commands::Update => cmd::cmd_update(cli.session_options(None)?, cancel).await,
  }
}

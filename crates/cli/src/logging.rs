//! Log setup for the CLI.
//!
//! Every run writes a plain-text log file to the build log directory. The
//! console layer mirrors it to stderr unless `--silent` is given.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
  Info,
  Debug,
  Trace,
}

impl LogLevel {
  fn as_directive(self) -> &'static str {
    match self {
      LogLevel::Info => "info",
      LogLevel::Debug => "debug",
      LogLevel::Trace => "trace",
    }
  }
}

/// Path of the log file for a run started at `started`.
pub fn log_file_path(log_dir: &Path, started: SystemTime) -> PathBuf {
  let secs = started.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default();
  log_dir.join(format!("{secs}-log.txt"))
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
pub fn init(log_dir: &Path, level: LogLevel, silent: bool) -> Result<PathBuf> {
  let path = log_file_path(log_dir, SystemTime::now());
  let file = File::create(&path).with_context(|| format!("Failed to create log file {}", path.display()))?;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
  let console = (!silent).then(|| fmt::layer().with_writer(std::io::stderr).without_time().with_target(false));
  let file_layer = fmt::layer().with_writer(Mutex::new(file)).with_ansi(false);

  tracing_subscriber::registry()
    .with(filter)
    .with(console)
    .with(file_layer)
    .try_init()
    .context("Failed to initialize logging")?;

  Ok(path)
}

/// Keep only the newest `max_logs` log files in `log_dir`.
///
/// Returns the number of files removed. Failures are logged and skipped.
pub fn trim_logs(log_dir: &Path, max_logs: usize) -> usize {
  let entries = match fs::read_dir(log_dir) {
    Ok(entries) => entries,
    Err(e) => {
      warn!(dir = %log_dir.display(), error = %e, "failed to read log directory");
      return 0;
    }
  };

  let mut logs: Vec<(SystemTime, PathBuf)> = entries
    .filter_map(|e| e.ok())
    .map(|e| e.path())
    .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "txt"))
    .map(|p| {
      let created = fs::metadata(&p)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .unwrap_or(UNIX_EPOCH);
      (created, p)
    })
    .collect();

  if logs.len() <= max_logs {
    return 0;
  }

  // Newest first, ties broken by name so the timestamped names order runs.
  logs.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

  let mut removed = 0;
  for (_, path) in logs.into_iter().skip(max_logs) {
    match fs::remove_file(&path) {
      Ok(()) => removed += 1,
      Err(e) => warn!(path = %path.display(), error = %e, "failed to remove old log file"),
    }
  }
  removed
}

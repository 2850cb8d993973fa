//! Terminal reporting for pipeline runs.
//!
//! Stage banners, the module table printed after load, the rebuild plan with
//! each module's outdated reason, and the closing summary.

use std::time::Duration;

use owo_colors::{OwoColorize, Stream};

use modbuild_lib::closure::{OutdatedModule, OutdatedReason};
use modbuild_lib::module::Module;

pub mod symbols {
  pub const DONE: &str = "✓";
  pub const FAILED: &str = "✗";
  pub const NOTICE: &str = "⚠";
  pub const STAGE: &str = "»";
  pub const MODULE: &str = "→";
  pub const REBUILD: &str = "↻";
}

/// Commit ids are shown with this many characters.
const SHORT_SHA_LEN: usize = 8;

pub fn short_sha(sha: &str) -> &str {
  sha.get(..SHORT_SHA_LEN).unwrap_or(sha)
}

/// Elapsed time rounded to whole milliseconds, in humantime notation.
pub fn format_elapsed(elapsed: Duration) -> String {
  let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

/// Why a module is part of this run's rebuild.
pub fn describe_outdated(reason: &OutdatedReason) -> String {
  match reason {
    OutdatedReason::SourceChanged { projects } if projects.is_empty() => "sources changed".to_string(),
    OutdatedReason::SourceChanged { projects } => format!("changed: {}", projects.join(", ")),
    OutdatedReason::DependsOnOutdated { references } => format!("depends on {}", references.join(", ")),
  }
}

pub fn print_stage(message: &str) {
  println!(
    "{} {}",
    symbols::STAGE.if_supports_color(Stream::Stdout, |s| s.blue()),
    message.if_supports_color(Stream::Stdout, |s| s.bold())
  );
}

pub fn print_notice(message: &str) {
  println!(
    "{} {}",
    symbols::NOTICE.if_supports_color(Stream::Stdout, |s| s.yellow()),
    message.if_supports_color(Stream::Stdout, |s| s.yellow())
  );
}

pub fn print_skipped(message: &str) {
  println!(
    "{} {}",
    symbols::DONE.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_fatal(message: &str) {
  eprintln!(
    "{} {}",
    symbols::FAILED.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

/// One line per module: name, short HEAD and CI version.
pub fn print_module(module: &Module) {
  let version = module.version().map(ToString::to_string).unwrap_or_default();
  println!(
    "  {} {} {} {}",
    symbols::MODULE.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    module.name().if_supports_color(Stream::Stdout, |s| s.cyan()),
    short_sha(module.head().unwrap_or_default()).if_supports_color(Stream::Stdout, |s| s.dimmed()),
    version
  );
}

/// The rebuild plan, in build order.
pub fn print_rebuild_plan(entries: &[OutdatedModule]) {
  for entry in entries {
    println!(
      "  {} {} {}",
      symbols::REBUILD.if_supports_color(Stream::Stdout, |s| s.yellow()),
      entry.module.if_supports_color(Stream::Stdout, |s| s.cyan()),
      describe_outdated(&entry.reason).if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
}

pub fn print_summary(message: &str, elapsed: Duration) {
  println!();
  println!(
    "{} {} {}",
    symbols::DONE.if_supports_color(Stream::Stdout, |s| s.green()),
    message.if_supports_color(Stream::Stdout, |s| s.green()),
    format!("in {}", format_elapsed(elapsed)).if_supports_color(Stream::Stdout, |s| s.dimmed())
  );
}

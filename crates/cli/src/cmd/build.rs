//! Implementation of the `modbuild build` command.
//!
//! Detects source changes, then builds every outdated module and the
//! modules depending on them.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use modbuild_lib::BuildError;

use super::session::{Session, SessionOptions};
use crate::output::{print_notice, print_rebuild_plan, print_skipped, print_stage};
use crate::prompts::wait_for_enter;

/// Execute the build command.
///
/// Without `force`, a run with no source changes stops before the build step.
/// Otherwise the build starts after `delay`, or after the user confirms when
/// `--confirm` is set.
pub async fn cmd_build(options: SessionOptions, force: bool, delay: Duration, cancel: CancellationToken) -> Result<()> {
  let mut session = Session::open(options, cancel).await?;

  print_stage("Starting build pipeline. Checking for source code changes");
  if force {
    print_notice("Forcing build step");
  }

  let changed = session
    .pipeline
    .check_for_changes()
    .await
    .context("Failed to check for source changes")?;

  if !force && !changed {
    print_skipped("No source code changes detected. Skipping build step");
    return Ok(());
  }

  print_rebuild_plan(session.pipeline.outdated().entries());

  if session.confirm {
    wait_for_enter("Press enter to continue...", &session.cancel).await?;
  } else {
    countdown(delay, &session.cancel).await?;
  }

  session.pipeline.build(force).await.context("Build step failed")?;

  session.finish("Build completed successfully");
  Ok(())
}

async fn countdown(delay: Duration, cancel: &CancellationToken) -> Result<()> {
  if delay.is_zero() {
    return Ok(());
  }

  let secs = delay.as_secs().max(1);
  for i in (1..=secs).rev() {
    let unit = if i > 1 { "seconds" } else { "second" };
    println!("Starting build step in {i} {unit}");
    tokio::select! {
      _ = tokio::time::sleep(Duration::from_secs(1)) => {}
      _ = cancel.cancelled() => return Err(BuildError::Cancelled.into()),
    }
  }
  Ok(())
}

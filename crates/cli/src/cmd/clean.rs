//! Implementation of the `modbuild clean` command.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::session::{Session, SessionOptions};
use crate::output::print_stage;

/// Run the clean step for every module, then drop cached checksums and
/// scratch files so the next build starts from scratch.
pub async fn cmd_clean(options: SessionOptions, cancel: CancellationToken) -> Result<()> {
  let session = Session::open(options, cancel).await?;

  print_stage("Beginning clean step");
  session.pipeline.clean().await.context("Clean step failed")?;

  remove_dir(&session.index.sum_dir).await?;
  remove_dir(&session.index.scratch_dir).await?;

  session.finish("Pipeline cleaned");
  Ok(())
}

async fn remove_dir(dir: &Path) -> Result<()> {
  match tokio::fs::remove_dir_all(dir).await {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(e).with_context(|| format!("Failed to remove {}", dir.display())),
  }
}

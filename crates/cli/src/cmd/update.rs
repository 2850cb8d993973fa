//! Implementation of the `modbuild update` command.
//!
//! Runs each module's `update` task, then rereads its repository so the
//! new HEAD and version are reported.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::session::{Session, SessionOptions};
use crate::output::{print_module, print_stage};

pub async fn cmd_update(options: SessionOptions, cancel: CancellationToken) -> Result<()> {
  let mut session = Session::open(options, cancel).await?;

  print_stage("Updating module sources");
  session
    .pipeline
    .sync_sources()
    .await
    .context("Source update failed")?;

  for module in session.pipeline.modules() {
    print_module(module);
  }

  session.finish("Source update complete");
  Ok(())
}

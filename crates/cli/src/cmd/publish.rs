//! Implementation of the `modbuild publish` command.
//!
//! Runs the publish step, gathers each module's output with checksums and
//! optional signatures, then uploads it when an upload path is given.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use modbuild_lib::publish::BuildPublisher;
use modbuild_lib::publish::signer::{DisabledSigner, GpgSigner, Signer};
use modbuild_lib::publish::upload::DirectoryUploader;

use super::session::{Session, SessionOptions};
use crate::output::{print_notice, print_stage};

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
  pub upload_path: Option<PathBuf>,
  pub sign: bool,
  pub gpg_key: Option<String>,
}

pub async fn cmd_publish(options: SessionOptions, publish: PublishOptions, cancel: CancellationToken) -> Result<()> {
  let session = Session::open(options, cancel).await?;

  let signer: Arc<dyn Signer> = if publish.sign {
    Arc::new(GpgSigner::new(publish.gpg_key, session.cancel.clone()))
  } else {
    Arc::new(DisabledSigner)
  };
  let explorer = session.pipeline.context().explorer.clone();
  let publisher = BuildPublisher::new(session.config.clone(), explorer, signer).context("Invalid publish config")?;

  print_stage("Publishing modules");
  session.pipeline.publish().await.context("Publish step failed")?;

  print_stage("Preparing module output for upload");
  session
    .pipeline
    .prepare_output(&publisher)
    .await
    .context("Failed to prepare module output")?;

  match publish.upload_path {
    Some(path) => {
      print_stage(&format!("Uploading module output to {}", path.display()));
      let uploader = DirectoryUploader::new(path);
      session
        .pipeline
        .upload(&publisher, &uploader)
        .await
        .context("Upload failed")?;
    }
    None => print_notice("No upload path specified. Skipping upload"),
  }

  session.finish("Upload build complete");
  Ok(())
}

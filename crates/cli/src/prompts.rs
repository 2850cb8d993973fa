use anyhow::{Result, bail};
use std::io::{self, IsTerminal, Write};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use modbuild_lib::BuildError;

/// Print `message` and wait for the user to press enter.
pub async fn wait_for_enter(message: &str, cancel: &CancellationToken) -> Result<()> {
  if !io::stdin().is_terminal() {
    bail!("Cannot wait for input in non-interactive mode. Remove --confirm to proceed.");
  }

  writeln!(io::stderr(), "{}", message)?;
  io::stderr().flush()?;

  let mut input = String::new();
  let mut stdin = BufReader::new(tokio::io::stdin());
  tokio::select! {
    read = stdin.read_line(&mut input) => {
      read?;
      Ok(())
    }
    _ = cancel.cancelled() => Err(BuildError::Cancelled.into()),
  }
}

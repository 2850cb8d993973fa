//! Command protocol for the external task runner.
//!
//! Every lifecycle step of a module or project is a logical [`TaskCommand`]
//! handed to the task runner executable together with the scope's variables.
//! The runner's exit code is interpreted as follows:
//!
//! | exit code | meaning                                  | outcome                       |
//! |-----------|------------------------------------------|-------------------------------|
//! | 0         | step ran                                 | [`StepOutcome::Ok`]           |
//! | 200       | the verb is not defined for this scope   | [`StepOutcome::NotApplicable`] |
//! | other     | the step failed                          | [`StepOutcome::Failed`]        |
//!
//! A failed step raises [`BuildError::StepFailed`] when the caller asked for it,
//! and is only logged otherwise.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::BuildError;
use crate::vars::TaskVars;

/// Exit code the runner uses when the requested verb does not exist.
pub const EXIT_NOT_APPLICABLE: i32 = 200;
/// Exit code a task uses to signal a logical step failure.
pub const EXIT_STEP_FAILED: i32 = 201;

/// Logical lifecycle commands understood by module task files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskCommand {
  Clean,
  Build,
  /// Reserved verb. Uploads go through an [`UploadManager`](crate::publish::upload::UploadManager).
  Upload,
  Update,
  PostbuildSuccess,
  PostbuildFailure,
  Publish,
  Test,
}

impl TaskCommand {
  /// The task name passed on the runner's command line.
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskCommand::Clean => "clean",
      TaskCommand::Build => "build",
      TaskCommand::Upload => "upload",
      TaskCommand::Update => "update",
      TaskCommand::PostbuildSuccess => "postbuild_success",
      TaskCommand::PostbuildFailure => "postbuild_failed",
      TaskCommand::Publish => "publish",
      TaskCommand::Test => "test",
    }
  }
}

impl fmt::Display for TaskCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Interpreted result of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
  Ok,
  NotApplicable,
  Failed(i32),
}

impl StepOutcome {
  pub fn from_exit_code(code: i32) -> Self {
    match code {
      0 => StepOutcome::Ok,
      EXIT_NOT_APPLICABLE => StepOutcome::NotApplicable,
      other => StepOutcome::Failed(other),
    }
  }
}

/// Errors from launching or supervising the runner process.
#[derive(Debug, Error)]
pub enum TaskError {
  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("failed waiting for '{program}': {source}")]
  Wait {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("task cancelled")]
  Cancelled,
}

/// Something a task command can run against: a module or one of its projects.
pub trait TaskScope {
  /// Name reported when a step for this scope fails.
  fn artifact_name(&self) -> &str;

  fn working_dir(&self) -> &Path;

  /// Task definition file that must exist in the working directory, if any.
  fn taskfile_name(&self) -> Option<&str>;

  fn vars(&self) -> &TaskVars;
}

/// A fully resolved runner process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInvocation {
  pub program: String,
  pub args: Vec<String>,
  pub working_dir: PathBuf,
  pub env: BTreeMap<String, String>,
  pub artifact: String,
}

/// Runs a task invocation and reports its exit code.
///
/// Implementations must stop promptly when `cancel` fires and report
/// [`TaskError::Cancelled`].
#[async_trait]
pub trait StepRunner: Send + Sync {
  async fn run(&self, invocation: &TaskInvocation, cancel: &CancellationToken) -> Result<i32, TaskError>;
}

/// Runs invocations as child processes.
///
/// The child inherits the parent environment plus the scope variables; its
/// output lines are forwarded to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, artifact: &str, is_stderr: bool) {
  let mut lines = BufReader::new(reader).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    if is_stderr {
      warn!(artifact = %artifact, "{}", line);
    } else {
      info!(artifact = %artifact, "{}", line);
    }
  }
}

#[async_trait]
impl StepRunner for ProcessRunner {
  async fn run(&self, invocation: &TaskInvocation, cancel: &CancellationToken) -> Result<i32, TaskError> {
    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .current_dir(&invocation.working_dir)
      .envs(&invocation.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let mut child = command.spawn().map_err(|e| TaskError::Spawn {
      program: invocation.program.clone(),
      source: e,
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let artifact = invocation.artifact.as_str();

    let output = async {
      tokio::join!(
        async {
          if let Some(out) = stdout {
            forward_lines(out, artifact, false).await;
          }
        },
        async {
          if let Some(err) = stderr {
            forward_lines(err, artifact, true).await;
          }
        },
      )
    };

    // On cancel the output readers are dropped too; a grandchild still
    // holding the pipes must not delay the return.
    let status = tokio::select! {
      (status, _) = async { tokio::join!(child.wait(), output) } => status.map_err(|e| TaskError::Wait {
        program: invocation.program.clone(),
        source: e,
      })?,
      _ = cancel.cancelled() => {
        if let Err(e) = child.kill().await {
          debug!(error = %e, "failed to kill cancelled task");
        }
        return Err(TaskError::Cancelled);
      }
    };

    // A child killed by a signal has no code; treat it as a plain failure.
    Ok(status.code().unwrap_or(-1))
  }
}

/// Binds the command protocol to a runner executable.
#[derive(Clone)]
pub struct TaskFile {
  program: String,
  runner: Arc<dyn StepRunner>,
  cancel: CancellationToken,
}

impl TaskFile {
  pub fn new(program: impl Into<String>, runner: Arc<dyn StepRunner>, cancel: CancellationToken) -> Self {
    Self {
      program: program.into(),
      runner,
      cancel,
    }
  }

  pub fn cancel_token(&self) -> &CancellationToken {
    &self.cancel
  }

  /// Build the invocation for `command` in `scope`, or `None` when the
  /// scope names a task file that is not present.
  pub fn invocation(&self, scope: &dyn TaskScope, command: TaskCommand) -> Option<TaskInvocation> {
    let mut args = Vec::new();

    if let Some(taskfile) = scope.taskfile_name().filter(|name| !name.trim().is_empty()) {
      if !scope.working_dir().join(taskfile).is_file() {
        return None;
      }
      args.push("-t".to_string());
      args.push(taskfile.to_string());
    }

    args.push(command.as_str().to_string());

    Some(TaskInvocation {
      program: self.program.clone(),
      args,
      working_dir: scope.working_dir().to_path_buf(),
      env: scope
        .vars()
        .iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect(),
      artifact: scope.artifact_name().to_string(),
    })
  }

  /// Execute `command` for `scope`.
  ///
  /// With `throw_on_failure` a failed step becomes [`BuildError::StepFailed`];
  /// otherwise the failure is logged and returned as an outcome.
  pub async fn exec(
    &self,
    scope: &dyn TaskScope,
    command: TaskCommand,
    throw_on_failure: bool,
  ) -> Result<StepOutcome, BuildError> {
    if self.cancel.is_cancelled() {
      return Err(BuildError::Cancelled);
    }

    let Some(invocation) = self.invocation(scope, command) else {
      debug!(
        artifact = %scope.artifact_name(),
        command = %command,
        "task file not present, skipping"
      );
      return Ok(StepOutcome::NotApplicable);
    };

    debug!(
      artifact = %invocation.artifact,
      command = %command,
      dir = %invocation.working_dir.display(),
      "running task"
    );

    let code = self.runner.run(&invocation, &self.cancel).await?;
    let outcome = StepOutcome::from_exit_code(code);

    match outcome {
      StepOutcome::Failed(code) if throw_on_failure => Err(BuildError::StepFailed {
        artifact: invocation.artifact,
        command,
        code,
      }),
      StepOutcome::Failed(code) => {
        warn!(artifact = %invocation.artifact, command = %command, code, "task command failed");
        Ok(outcome)
      }
      StepOutcome::NotApplicable => {
        debug!(artifact = %invocation.artifact, command = %command, "task command not defined");
        Ok(outcome)
      }
      StepOutcome::Ok => Ok(outcome),
    }
  }
}

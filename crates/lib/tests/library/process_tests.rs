//! The command protocol against real child processes.
//!
//! Scripts are written and executed serially: a concurrent fork could inherit
//! the script's write handle and make exec fail with "text file busy".

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serial_test::serial;
use tempfile::TempDir;

use modbuild_lib::BuildError;

use super::common::Workspace;

/// Write an executable shell script that appends its last argument, the
/// module and the project to `calls.log` next to it.
fn runner_script(dir: &Path, body: &str) -> PathBuf {
  let path = dir.join("runner.sh");
  let log = dir.join("calls.log");
  let script = format!(
    "#!/bin/sh\nfor a in \"$@\"; do last=\"$a\"; done\necho \"$last $MODULE_NAME ${{PROJECT_NAME:-module}}\" >> '{}'\n{}\n",
    log.display(),
    body
  );
  fs::write(&path, script).unwrap();
  fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  path
}

fn calls(dir: &Path) -> Vec<String> {
  fs::read_to_string(dir.join("calls.log"))
    .unwrap_or_default()
    .lines()
    .map(str::to_string)
    .collect()
}

#[tokio::test]
#[serial]
async fn absent_module_taskfile_starts_no_process() {
  let ws = Workspace::with_process_runner(Path::new("/nonexistent/task-runner"));
  ws.add_module("a", &[]);

  let mut pipeline = ws.pipeline().await;
  pipeline.build(true).await.unwrap();
  pipeline.clean().await.unwrap();
}

#[tokio::test]
#[serial]
async fn spawn_failure_is_reported() {
  let ws = Workspace::with_process_runner(Path::new("/nonexistent/task-runner"));
  ws.add_module("a", &[("a1", &[])]);

  let mut pipeline = ws.pipeline().await;
  let err = pipeline.build(true).await.unwrap_err();

  assert!(matches!(err, BuildError::Task(_)), "unexpected error: {err}");
}

#[tokio::test]
#[serial]
async fn step_failure_runs_failed_post_build_with_scope_vars() {
  let scripts = TempDir::new().unwrap();
  let program = runner_script(
    scripts.path(),
    "if [ \"$last\" = build ] && [ -n \"$PROJECT_NAME\" ]; then exit 201; fi\nexit 0",
  );
  let ws = Workspace::with_process_runner(&program);
  ws.add_module("a", &[("a1", &[])]);
  ws.write("a/Module.Taskfile.yaml", "version: '3'");

  let mut pipeline = ws.pipeline().await;
  let err = pipeline.build(true).await.unwrap_err();

  assert!(matches!(
    err,
    BuildError::StepFailed { ref artifact, code: 201, .. } if artifact == "a1"
  ));
  assert_eq!(
    calls(scripts.path()),
    vec![
      "build a module",
      "build a a1",
      "postbuild_failed a module",
      "postbuild_failed a a1",
    ]
  );
}

#[tokio::test]
#[serial]
async fn not_applicable_exit_code_is_success() {
  let scripts = TempDir::new().unwrap();
  let program = runner_script(scripts.path(), "exit 200");
  let ws = Workspace::with_process_runner(&program);
  ws.add_module("a", &[("a1", &[])]);

  let mut pipeline = ws.pipeline().await;
  pipeline.check_for_changes().await.unwrap();
  pipeline.build(false).await.unwrap();

  assert_eq!(calls(scripts.path()), vec!["build a a1", "postbuild_success a a1"]);
  assert!(ws.path(".build/sums/a-a1.json").is_file());
}

#[tokio::test]
#[serial]
async fn cancellation_stops_running_task() {
  let scripts = TempDir::new().unwrap();
  let program = runner_script(scripts.path(), "exec sleep 30");
  let ws = Workspace::with_process_runner(&program);
  ws.add_module("a", &[("a1", &[])]);
  let mut pipeline = ws.pipeline().await;

  let cancel = ws.ctx.tasks.cancel_token().clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();
  });

  let started = Instant::now();
  let err = pipeline.build(true).await.unwrap_err();

  assert!(err.is_cancelled(), "unexpected error: {err}");
  assert!(started.elapsed() < Duration::from_secs(10));
}

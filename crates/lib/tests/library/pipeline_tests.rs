//! End-to-end pipeline runs against fake modules.

use modbuild_lib::BuildError;
use modbuild_lib::closure::OutdatedReason;
use modbuild_lib::task::TaskCommand;

use super::common::{ScriptedRunner, Workspace};

#[tokio::test]
async fn unchanged_module_is_not_rebuilt() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("a", &[("a1", &[])]);

  ws.build_run().await;
  assert_eq!(ws.runner.ran(TaskCommand::Build), vec!["a1"]);
  assert!(ws.path(".build/sums/a-a1.json").is_file());

  let mut second = ws.pipeline().await;
  assert!(!second.check_for_changes().await.unwrap());
  second.build(false).await.unwrap();

  assert_eq!(ws.runner.ran(TaskCommand::Build), vec!["a1"]);
}

#[tokio::test]
async fn ignored_files_do_not_trigger_rebuilds() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("a", &[("a1", &[])]);
  ws.build_run().await;

  ws.write("a/a1/README.md", "docs");
  ws.write("a/a1/bin/output.rs", "fn generated() {}");

  let mut pipeline = ws.pipeline().await;
  assert!(!pipeline.check_for_changes().await.unwrap());

  ws.write("a/a1/src/extra.rs", "pub fn extra() {}");
  assert!(pipeline.check_for_changes().await.unwrap());
}

#[tokio::test]
async fn change_propagates_to_dependent_modules() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("b", &[("b1", &["c1"])]);
  ws.add_module("c", &[("c1", &[])]);
  ws.add_module("d", &[("d1", &["b1"])]);
  ws.add_module("e", &[("e1", &[])]);
  ws.build_run().await;

  ws.write("c/c1/src/lib.rs", "pub fn run() { changed() }");
  let mut pipeline = ws.pipeline().await;
  assert!(pipeline.check_for_changes().await.unwrap());

  let mut outdated: Vec<&str> = pipeline.outdated().modules().collect();
  outdated.sort();
  assert_eq!(outdated, vec!["b", "c", "d"]);
  assert_eq!(
    pipeline.outdated().get("c").unwrap().reason,
    OutdatedReason::SourceChanged {
      projects: vec!["c1".to_string()]
    }
  );
  assert_eq!(
    pipeline.outdated().get("d").unwrap().reason,
    OutdatedReason::DependsOnOutdated {
      references: vec!["b1".to_string()]
    }
  );

  pipeline.build(false).await.unwrap();
  assert_eq!(
    ws.runner.ran(TaskCommand::Build)[4..],
    ["c1".to_string(), "b1".to_string(), "d1".to_string()]
  );

  // Dependants committed nothing new, so the next run is clean.
  let mut next = ws.pipeline().await;
  assert!(!next.check_for_changes().await.unwrap());
}

#[tokio::test]
async fn cyclic_references_converge() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("a", &[("a1", &["b1"])]);
  ws.add_module("b", &[("b1", &["a1"])]);
  ws.build_run().await;

  ws.write("a/a1/src/lib.rs", "pub fn touched() {}");
  let mut pipeline = ws.pipeline().await;
  pipeline.check_for_changes().await.unwrap();

  assert_eq!(pipeline.outdated().len(), 2);
}

#[tokio::test]
async fn failed_build_stops_fleet_and_keeps_module_outdated() {
  let runner = ScriptedRunner::default().exit_with("b1", TaskCommand::Build, 201);
  let ws = Workspace::new(runner);
  ws.add_module("a", &[("a1", &[])]);
  ws.add_module("b", &[("b1", &[])]);
  ws.add_module("c", &[("c1", &[])]);

  let mut pipeline = ws.pipeline().await;
  pipeline.check_for_changes().await.unwrap();
  let err = pipeline.build(false).await.unwrap_err();

  match err {
    BuildError::StepFailed { artifact, command, code } => {
      assert_eq!(artifact, "b1");
      assert_eq!(command, TaskCommand::Build);
      assert_eq!(code, 201);
    }
    other => panic!("expected step failure, got {other}"),
  }
  assert_eq!(ws.runner.ran(TaskCommand::Build), vec!["a1", "b1"]);
  assert_eq!(ws.runner.ran(TaskCommand::PostbuildSuccess), vec!["a1"]);
  assert_eq!(ws.runner.ran(TaskCommand::PostbuildFailure), vec!["b1"]);

  assert!(ws.path(".build/sums/a-a1.json").is_file());
  assert!(!ws.path(".build/sums/b-b1.json").exists());
}

#[tokio::test]
async fn not_applicable_steps_count_as_success() {
  let runner = ScriptedRunner::default()
    .exit_with("a1", TaskCommand::Build, 200)
    .exit_with("a1", TaskCommand::PostbuildSuccess, 200);
  let ws = Workspace::new(runner);
  ws.add_module("a", &[("a1", &[])]);

  ws.build_run().await;

  assert!(ws.path(".build/sums/a-a1.json").is_file());
}

#[tokio::test]
async fn unknown_exit_codes_fail_the_build() {
  let runner = ScriptedRunner::default().exit_with("a1", TaskCommand::Build, 3);
  let ws = Workspace::new(runner);
  ws.add_module("a", &[("a1", &[])]);

  let mut pipeline = ws.pipeline().await;
  pipeline.check_for_changes().await.unwrap();

  assert!(matches!(
    pipeline.build(false).await,
    Err(BuildError::StepFailed { code: 3, .. })
  ));
}

#[tokio::test]
async fn exit_100_fails_the_build() {
  let runner = ScriptedRunner::default().exit_with("a1", TaskCommand::Build, 100);
  let ws = Workspace::new(runner);
  ws.add_module("a", &[("a1", &[])]);

  let mut pipeline = ws.pipeline().await;
  pipeline.check_for_changes().await.unwrap();

  assert!(matches!(
    pipeline.build(false).await,
    Err(BuildError::StepFailed { code: 100, .. })
  ));
  assert_eq!(ws.runner.ran(TaskCommand::PostbuildFailure), vec!["a1"]);
  assert!(!ws.path(".build/sums/a-a1.json").exists());
}

#[tokio::test]
async fn module_without_history_fails_load() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("a", &[("a1", &[])]);
  ws.repos.set(&ws.path("a"), Default::default());

  let mut pipeline = modbuild_lib::BuildPipeline::discover(ws.ctx.clone()).unwrap();
  let err = pipeline.load(&Default::default()).await.unwrap_err();

  assert!(matches!(err, BuildError::Discovery { ref module, .. } if module == "a"));
}

#[tokio::test]
async fn project_scopes_get_isolated_variables() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("a", &[("a1", &[]), ("a2", &[])]);

  let pipeline = ws.pipeline().await;
  let module = pipeline.module("a").unwrap();
  let projects = module.projects();

  assert_eq!(projects[0].vars.get("project_name"), Some("a1"));
  assert_eq!(projects[1].vars.get("PROJECT_NAME"), Some("a2"));
  assert_eq!(projects[0].vars.get("MODULE_NAME"), Some("a"));
  assert_eq!(module.vars().get("PROJECT_NAME"), None);
  assert_eq!(module.vars().get("BUILD_VERSION"), Some("0.1.0-ci0001"));
  assert!(pipeline.vars().get("MODULE_NAME").is_none());
}

//! Output preparation and upload of built modules.

use std::fs;
use std::sync::Arc;

use serde_json::Value;
use tempfile::TempDir;

use modbuild_lib::publish::BuildPublisher;
use modbuild_lib::publish::signer::DisabledSigner;
use modbuild_lib::publish::upload::DirectoryUploader;
use modbuild_lib::vcs::TagInfo;

use super::common::{ScriptedRunner, Workspace, history};

fn read_json(path: &std::path::Path) -> Value {
  serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn publisher(ws: &Workspace) -> BuildPublisher {
  BuildPublisher::new(
    ws.ctx.config.clone(),
    ws.ctx.explorer.clone(),
    Arc::new(DisabledSigner),
  )
  .unwrap()
}

#[tokio::test]
async fn built_module_is_prepared_and_uploaded() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("core", &[("api", &[])]);
  ws.write(
    "core/api/package.json",
    r#"{"name": "api", "version": "2.0.0", "author": "ci", "output_dir": "dist"}"#,
  );

  let mut state = history(&["c3", "c2", "c1"]);
  state.tags.push(TagInfo {
    name: "v1.4.0".to_string(),
    target: "c2".to_string(),
    message: Some("release".to_string()),
    author: Some("ci".to_string()),
  });
  ws.repos.set(&ws.path("core"), state);

  let mut pipeline = ws.pipeline().await;
  pipeline.check_for_changes().await.unwrap();
  pipeline.build(false).await.unwrap();

  // What the external build tool would have produced.
  ws.write("core/api/dist/api.tgz", "package");
  ws.write("core/archive.tgz", "sources");

  let publisher = publisher(&ws);
  pipeline.publish().await.unwrap();
  pipeline.prepare_output(&publisher).await.unwrap();

  let out = ws.ctx.index.output_dir.join("core");
  assert_eq!(fs::read_to_string(out.join("@latest")).unwrap(), "c3");
  assert!(out.join("c3/api/api.tgz.sha256").is_file());
  assert!(out.join("c3/archive.tgz.sha256").is_file());

  let catalog = read_json(&out.join("c3/index.json"));
  assert_eq!(catalog["module_name"], "core");
  assert!(catalog["modifed_date"].is_string());
  assert_eq!(catalog["archive"]["path"], "archive.tgz");
  assert!(catalog["archive"].get("signature").is_none());
  let project = &catalog["projects"][0];
  assert_eq!(project["version"], "1.4.0-ci0001");
  assert_eq!(project["author"], "ci");
  assert_eq!(project["files"].as_array().unwrap().len(), 1);
  assert_eq!(project["files"][0]["name"], "api.tgz");

  let git = read_json(&out.join("git.json"));
  assert_eq!(git["head"]["branch"], "main");
  assert_eq!(git["commits"].as_array().unwrap().len(), 3);
  assert_eq!(git["tags"][0]["name"], "v1.4.0");

  let versions = read_json(&out.join("versions.json"));
  assert_eq!(versions["releases"][0]["hash"], "c2");

  let remote = TempDir::new().unwrap();
  let uploader = DirectoryUploader::new(remote.path().to_path_buf());
  pipeline.upload(&publisher, &uploader).await.unwrap();

  assert!(remote.path().join("core/c3/index.json").is_file());
  assert!(remote.path().join("core/c3/api/api.tgz").is_file());
  assert!(remote.path().join("core/@latest").is_file());
}

#[tokio::test]
async fn clean_removes_module_output() {
  let ws = Workspace::new(ScriptedRunner::default());
  ws.add_module("core", &[("api", &[])]);

  let mut pipeline = ws.pipeline().await;
  pipeline.build(true).await.unwrap();
  pipeline.prepare_output(&publisher(&ws)).await.unwrap();
  let out = ws.ctx.index.output_dir.join("core");
  assert!(out.join("@latest").is_file());

  pipeline.clean().await.unwrap();
  assert!(!out.exists());
}

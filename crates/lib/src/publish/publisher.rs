//! Gathers a built module into its publishable output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::catalog::{ArchiveEntry, Catalog, FileEntry, GitHistory, ProjectEntry, VersionHistory, digest};
use super::signer::Signer;
use super::upload::UploadManager;
use super::{PublishError, sidecar_path};
use crate::config::BuildConfig;
use crate::consts::SIGNATURE_EXTENSION;
use crate::error::BuildError;
use crate::files::ModuleFile;
use crate::module::Module;
use crate::project::{Project, ProjectExplorer};
use crate::util::hash::{ContentHash, hash_file};
use crate::util::run_all;

/// The only digest this build can produce.
const SUPPORTED_HASH: &str = "sha256";

pub struct BuildPublisher {
  config: Arc<BuildConfig>,
  explorer: Arc<dyn ProjectExplorer>,
  signer: Arc<dyn Signer>,
}

fn has_extension(path: &Path, extension: &str) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn to_json<T: serde::Serialize>(what: &'static str, value: &T) -> Result<Vec<u8>, PublishError> {
  serde_json::to_vec_pretty(value).map_err(|e| PublishError::Serialize { what, source: e })
}

async fn hash_blocking(path: &Path) -> Result<ContentHash, BuildError> {
  let path = path.to_path_buf();
  Ok(tokio::task::spawn_blocking(move || hash_file(&path)).await??)
}

impl BuildPublisher {
  pub fn new(
    config: Arc<BuildConfig>,
    explorer: Arc<dyn ProjectExplorer>,
    signer: Arc<dyn Signer>,
  ) -> Result<Self, PublishError> {
    if !config.hash_algorithm.eq_ignore_ascii_case(SUPPORTED_HASH) {
      return Err(PublishError::UnsupportedHash(config.hash_algorithm.clone()));
    }
    Ok(Self {
      config,
      explorer,
      signer,
    })
  }

  pub fn sign_enabled(&self) -> bool {
    self.signer.is_enabled()
  }

  fn hash_name(&self) -> &str {
    &self.config.hash_algorithm
  }

  /// Build files a project produced: files with the output extension in its
  /// declared output directory, or anywhere in the project without one.
  pub fn project_build_files(&self, project: &Project) -> Result<Vec<PathBuf>, PublishError> {
    let ext = &self.config.output_file_extension;

    if let Some(out) = project.properties.output_dir() {
      let out_dir = project.dir.join(out);
      if out_dir.is_dir() {
        let entries = std::fs::read_dir(&out_dir).map_err(|e| PublishError::io(&out_dir, e))?;
        let mut files: Vec<PathBuf> = entries
          .filter_map(|e| e.ok().map(|e| e.path()))
          .filter(|p| p.is_file() && has_extension(p, ext))
          .collect();
        files.sort();
        return Ok(files);
      }
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(&project.dir) {
      let entry = entry.map_err(|e| PublishError::Walk {
        path: project.dir.clone(),
        message: e.to_string(),
      })?;
      if entry.file_type().is_file() && has_extension(entry.path(), ext) {
        files.push(entry.into_path());
      }
    }
    files.sort();
    Ok(files)
  }

  /// Copy `file` into `dir` and write its checksum sidecar.
  async fn copy_with_sidecar(&self, file: &Path, dir: &Path) -> Result<PathBuf, BuildError> {
    let name = file.file_name().unwrap_or_default();
    let dest = dir.join(name);

    fs::copy(file, &dest).await.map_err(|e| PublishError::io(&dest, e))?;
    self.write_sidecar(&dest).await?;
    Ok(dest)
  }

  async fn write_sidecar(&self, file: &Path) -> Result<ContentHash, BuildError> {
    let hash = hash_blocking(file).await?;
    let sidecar = sidecar_path(file, self.hash_name());
    fs::write(&sidecar, hash.0.as_bytes())
      .await
      .map_err(|e| PublishError::io(&sidecar, e))?;
    Ok(hash)
  }

  async fn copy_project_output(&self, module: &Module, head: &str) -> Result<(), BuildError> {
    let copies = module.projects().iter().map(|project| async move {
      let dir = module.files().artifact_dir(head, &project.safe_name);
      fs::create_dir_all(&dir).await.map_err(|e| PublishError::io(&dir, e))?;

      for file in self.project_build_files(project)? {
        debug!(project = %project.name, file = %file.display(), "copying artifact");
        self.copy_with_sidecar(&file, &dir).await?;
      }
      Ok::<_, BuildError>(())
    });
    run_all(copies).await?;

    if self.sign_enabled() {
      info!(module = %module.name(), "signing artifacts");
      for project in module.projects() {
        let dir = module.files().artifact_dir(head, &project.safe_name);
        for file in self.artifact_files(&dir)? {
          if has_extension(&file, &self.config.output_file_extension) {
            self.signer.sign(&file).await?;
          }
        }
      }
    }
    Ok(())
  }

  /// Files in an artifact directory, without sidecars or signatures.
  fn artifact_files(&self, dir: &Path) -> Result<Vec<PathBuf>, PublishError> {
    let entries = std::fs::read_dir(dir).map_err(|e| PublishError::io(dir, e))?;
    let mut files: Vec<PathBuf> = entries
      .filter_map(|e| e.ok().map(|e| e.path()))
      .filter(|p| p.is_file() && !has_extension(p, self.hash_name()) && !has_extension(p, SIGNATURE_EXTENSION))
      .collect();
    files.sort();
    Ok(files)
  }

  /// Copy the module's source archive into the version directory, if the
  /// build produced one.
  async fn copy_source_archive(&self, module: &Module, head: &str) -> Result<Option<ArchiveEntry>, BuildError> {
    let archive_name = &self.config.source_archive_name;
    let source = module.dir().join(archive_name);

    if !source.is_file() {
      info!(module = %module.name(), "no source archive found");
      return Ok(None);
    }

    info!(module = %module.name(), "copying source archive to output");
    let data = fs::read(&source).await.map_err(|e| PublishError::io(&source, e))?;
    let output = module.files().write(ModuleFile::Archive, head, &data).await?;
    let hash = self.write_sidecar(&output).await?;

    let signature = if self.sign_enabled() {
      self.signer.sign(&output).await?;
      Some(format!("{archive_name}.{SIGNATURE_EXTENSION}"))
    } else {
      None
    };

    Ok(Some(ArchiveEntry {
      path: archive_name.clone(),
      digest: digest(self.hash_name(), &hash.0),
      sha_file: format!("{archive_name}.{}", self.hash_name()),
      signature,
    }))
  }

  async fn project_entry(&self, module: &Module, project: &Project, head: &str) -> Result<ProjectEntry, BuildError> {
    // Metadata may have been rewritten by the build, e.g. a bumped version.
    let explorer = self.explorer.clone();
    let reload = project.clone();
    let data = tokio::task::spawn_blocking(move || explorer.read_data(&reload)).await??;
    let props = &data.properties;

    let dir = module.files().artifact_dir(head, &project.safe_name);
    let mut files = Vec::new();
    if dir.is_dir() {
      for file in self.artifact_files(&dir)? {
        let meta = fs::metadata(&file).await.map_err(|e| PublishError::io(&file, e))?;
        let name = file
          .file_name()
          .map(|n| n.to_string_lossy().to_string())
          .unwrap_or_default();
        let hash = hash_blocking(&file).await?;
        let date: DateTime<Utc> = meta.modified().map(DateTime::from).unwrap_or_else(|_| Utc::now());

        files.push(FileEntry {
          path: format!("{}/{}", project.safe_name, name),
          sha_file: format!("{}/{}.{}", project.safe_name, name, self.hash_name()),
          name,
          date,
          size: meta.len(),
          digest: digest(self.hash_name(), &hash.0),
        });
      }
    }

    let owned = |v: Option<&str>| v.map(str::to_string);
    Ok(ProjectEntry {
      name: project.name.clone(),
      repo_url: owned(props.repo_url()),
      description: owned(props.description()),
      version: module.version().map(ToString::to_string).unwrap_or_default(),
      copyright: owned(props.copyright()),
      author: owned(props.author()),
      product: owned(props.product()),
      company: owned(props.company()),
      commit: head.to_string(),
      target_framework: owned(props.target_framework()),
      files,
    })
  }

  /// Prepare the publishable output of a built module.
  pub async fn prepare_module_output(&self, module: &Module) -> Result<(), BuildError> {
    let head = module.head()?.to_string();
    let repo = module.repo_state()?;

    self.copy_project_output(module, &head).await?;
    let archive = self.copy_source_archive(module, &head).await?;

    info!(module = %module.name(), "building module catalog");
    let mut projects = Vec::with_capacity(module.projects().len());
    for project in module.projects() {
      projects.push(self.project_entry(module, project, &head).await?);
    }
    let catalog = Catalog {
      module_name: module.name().to_string(),
      modifed_date: Utc::now(),
      archive,
      projects,
    };
    module
      .files()
      .write(ModuleFile::Catalog, &head, &to_json("catalog", &catalog)?)
      .await?;

    info!(module = %module.name(), "building module git history");
    let history = GitHistory::from_repo(module.name(), repo);
    module
      .files()
      .write(ModuleFile::GitHistory, &head, &to_json("git history", &history)?)
      .await?;
    module.files().write(ModuleFile::LatestHash, &head, head.as_bytes()).await?;

    info!(module = %module.name(), "building module version history");
    let versions = VersionHistory::from_repo(module.name(), repo);
    module
      .files()
      .write(ModuleFile::VersionHistory, &head, &to_json("version history", &versions)?)
      .await?;

    Ok(())
  }

  /// Upload the module's whole output directory.
  pub async fn upload_module_output(&self, uploader: &dyn UploadManager, module: &Module) -> Result<(), BuildError> {
    info!(module = %module.name(), "uploading module");
    uploader.upload_directory(module.files().output_dir()).await?;
    Ok(())
  }
}

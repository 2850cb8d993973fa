//! Read-only access to module repositories.
//!
//! The pipeline never talks to a VCS directly; it asks a [`SourceControl`]
//! for a [`RepoState`] snapshot. Remote synchronization is left to the task
//! runner's `update` verb.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::consts::{BUILD_DIR_NAME, VCS_DIR_NAME};

#[derive(Debug, Error)]
pub enum VcsError {
  #[error("failed to open repository at {path}: {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: Box<gix::open::Error>,
  },

  #[error("failed to read repository at {path}: {message}")]
  Read { path: PathBuf, message: String },

  #[error("failed to search {path} for repositories: {message}")]
  Search { path: PathBuf, message: String },
}

/// One commit, as exported to the git history file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
  pub sha: String,
  pub message: String,
  /// First line of the message.
  pub short_message: String,
  pub author: String,
  pub committer: String,
  pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
  /// Short tag name, e.g. `v1.2.0`.
  pub name: String,
  /// Commit the tag ultimately points at.
  pub target: String,
  /// Annotation message, for annotated tags.
  pub message: Option<String>,
  /// Tagger name, for annotated tags.
  pub author: Option<String>,
}

/// Snapshot of a repository at load time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoState {
  /// HEAD commit id, `None` for a repository without commits.
  pub head: Option<String>,
  /// Checked out branch, `None` for a detached HEAD.
  pub branch: Option<String>,
  /// Commits reachable from HEAD, HEAD first.
  pub commits: Vec<CommitInfo>,
  pub tags: Vec<TagInfo>,
}

impl RepoState {
  pub fn has_commits(&self) -> bool {
    !self.commits.is_empty()
  }

  /// Position of `sha` in the HEAD-first commit list, i.e. the number of
  /// commits between it and HEAD.
  pub fn distance_from_head(&self, sha: &str) -> Option<usize> {
    self.commits.iter().position(|c| c.sha.eq_ignore_ascii_case(sha))
  }

  pub fn commit(&self, sha: &str) -> Option<&CommitInfo> {
    self.commits.iter().find(|c| c.sha.eq_ignore_ascii_case(sha))
  }
}

/// Source control capability used by modules.
pub trait SourceControl: Send + Sync {
  /// Read the current state of the repository rooted at `root`.
  ///
  /// This is blocking; async callers run it on the blocking pool.
  fn read_state(&self, root: &Path) -> Result<RepoState, VcsError>;
}

/// Find every repository root below `base_dir`, sorted by path.
///
/// A repository root is a directory containing a `.git` entry. The build
/// directory and repository internals are never searched.
pub fn find_repositories(base_dir: &Path) -> Result<Vec<PathBuf>, VcsError> {
  let mut roots = Vec::new();

  let mut walker = WalkDir::new(base_dir).min_depth(1).into_iter().filter_entry(|e| {
    let name = e.file_name().to_str().unwrap_or_default();
    !(e.depth() == 1 && name == BUILD_DIR_NAME)
  });

  while let Some(entry) = walker.next() {
    let entry = entry.map_err(|e| VcsError::Search {
      path: base_dir.to_path_buf(),
      message: e.to_string(),
    })?;

    if entry.file_name() == VCS_DIR_NAME {
      if let Some(parent) = entry.path().parent() {
        roots.push(parent.to_path_buf());
      }
      if entry.file_type().is_dir() {
        walker.skip_current_dir();
      }
    }
  }

  roots.sort();
  roots.dedup();
  debug!(count = roots.len(), base = %base_dir.display(), "found repositories");
  Ok(roots)
}

/// [`SourceControl`] backed by gix.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitSourceControl;

fn read_err(path: &Path, e: impl std::fmt::Display) -> VcsError {
  VcsError::Read {
    path: path.to_path_buf(),
    message: e.to_string(),
  }
}

fn read_commit(path: &Path, commit: &gix::Commit<'_>) -> Result<CommitInfo, VcsError> {
  let message = commit.message_raw_sloppy().to_string();
  let short_message = message.lines().next().unwrap_or_default().trim().to_string();
  let author = commit.author().map_err(|e| read_err(path, e))?.name.to_string();
  let committer = commit.committer().map_err(|e| read_err(path, e))?.name.to_string();
  let seconds = commit.time().map_err(|e| read_err(path, e))?.seconds;

  Ok(CommitInfo {
    sha: commit.id.to_string(),
    message,
    short_message,
    author,
    committer,
    date: DateTime::from_timestamp(seconds, 0).unwrap_or_default(),
  })
}

fn read_tags(path: &Path, repo: &gix::Repository) -> Result<Vec<TagInfo>, VcsError> {
  let platform = repo.references().map_err(|e| read_err(path, e))?;
  let mut tags = Vec::new();

  for reference in platform.tags().map_err(|e| read_err(path, e))? {
    let reference = reference.map_err(|e| read_err(path, e))?;
    let name = reference.name().shorten().to_string();

    // Tags pointing at trees or blobs carry no version information.
    let spec = format!("{}^{{commit}}", reference.name().as_bstr());
    let Ok(target) = repo.rev_parse_single(spec.as_str()) else {
      debug!(tag = %name, "skipping tag without commit target");
      continue;
    };

    let annotation = reference
      .target()
      .try_id()
      .and_then(|id| repo.find_object(id.to_owned()).ok())
      .and_then(|object| object.try_into_tag().ok());
    let (message, author) = match annotation {
      Some(tag) => (
        tag.decode().ok().map(|d| d.message.to_string().trim_end().to_string()),
        tag.tagger().ok().flatten().map(|t| t.name.to_string()),
      ),
      None => (None, None),
    };

    tags.push(TagInfo {
      name,
      target: target.to_string(),
      message,
      author,
    });
  }

  Ok(tags)
}

impl SourceControl for GitSourceControl {
  fn read_state(&self, root: &Path) -> Result<RepoState, VcsError> {
    let repo = gix::open(root).map_err(|e| VcsError::Open {
      path: root.to_path_buf(),
      source: Box::new(e),
    })?;

    let mut head = repo.head().map_err(|e| read_err(root, e))?;
    let branch = head.referent_name().map(|name| name.shorten().to_string());

    if head.is_unborn() {
      return Ok(RepoState {
        head: None,
        branch,
        commits: Vec::new(),
        tags: Vec::new(),
      });
    }

    let head_commit = head.peel_to_commit().map_err(|e| read_err(root, e))?;

    let mut commits = Vec::new();
    for info in head_commit.ancestors().all().map_err(|e| read_err(root, e))? {
      let info = info.map_err(|e| read_err(root, e))?;
      let commit = info.object().map_err(|e| read_err(root, e))?;
      commits.push(read_commit(root, &commit)?);
    }

    let tags = read_tags(root, &repo)?;

    debug!(
      repo = %root.display(),
      head = %head_commit.id,
      commits = commits.len(),
      tags = tags.len(),
      "read repository state"
    );

    Ok(RepoState {
      head: Some(head_commit.id.to_string()),
      branch,
      commits,
      tags,
    })
  }
}

//! Published JSON documents: module catalog, git history, version history.
//!
//! Field names are part of the published format read by feed consumers,
//! including the historical `modifed_date` spelling.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::consts::TAG_MESSAGE_MAX_LEN;
use crate::vcs::{CommitInfo, RepoState, TagInfo};

/// `index.json`: what a module build produced.
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
  pub module_name: String,
  pub modifed_date: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub archive: Option<ArchiveEntry>,
  pub projects: Vec<ProjectEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
  pub path: String,
  /// `{hash algorithm: hex digest}`.
  #[serde(flatten)]
  pub digest: BTreeMap<String, String>,
  pub sha_file: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectEntry {
  pub name: String,
  pub repo_url: Option<String>,
  pub description: Option<String>,
  pub version: String,
  pub copyright: Option<String>,
  pub author: Option<String>,
  pub product: Option<String>,
  pub company: Option<String>,
  pub commit: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub target_framework: Option<String>,
  pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
  pub name: String,
  /// Path relative to the version directory.
  pub path: String,
  pub date: DateTime<Utc>,
  pub size: u64,
  #[serde(flatten)]
  pub digest: BTreeMap<String, String>,
  pub sha_file: String,
}

/// Single-entry digest map keyed by algorithm name.
pub fn digest(algorithm: &str, hex: &str) -> BTreeMap<String, String> {
  BTreeMap::from([(algorithm.to_string(), hex.to_string())])
}

#[derive(Debug, Clone, Serialize)]
pub struct CommitEntry {
  pub sha: String,
  pub message: String,
  pub author: String,
  pub committer: String,
  pub date: DateTime<Utc>,
  pub message_short: String,
}

impl From<&CommitInfo> for CommitEntry {
  fn from(commit: &CommitInfo) -> Self {
    Self {
      sha: commit.sha.clone(),
      message: commit.message.clone(),
      author: commit.author.clone(),
      committer: commit.committer.clone(),
      date: commit.date,
      message_short: commit.short_message.clone(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct HeadEntry {
  pub branch: Option<String>,
  #[serde(flatten)]
  pub commit: CommitEntry,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagEntry {
  pub name: String,
  pub sha: String,
  pub message: Option<String>,
  pub author: Option<String>,
  /// Date of the tagged commit.
  pub date: Option<DateTime<Utc>>,
}

/// `git.json`: HEAD, the full commit list, and every tag.
#[derive(Debug, Clone, Serialize)]
pub struct GitHistory {
  pub module_name: String,
  pub modifed_date: DateTime<Utc>,
  pub head: Option<HeadEntry>,
  pub commits: Vec<CommitEntry>,
  pub tags: Vec<TagEntry>,
}

/// Clamp a tag message, marking the cut with `...`.
pub fn truncate_message(message: &str) -> String {
  match message.char_indices().nth(TAG_MESSAGE_MAX_LEN) {
    Some((cut, _)) => format!("{}...", &message[..cut]),
    None => message.to_string(),
  }
}

impl GitHistory {
  pub fn from_repo(module_name: &str, repo: &RepoState) -> Self {
    let head = repo
      .head
      .as_deref()
      .and_then(|sha| repo.commit(sha))
      .map(|commit| HeadEntry {
        branch: repo.branch.clone(),
        commit: commit.into(),
      });

    let tags = repo
      .tags
      .iter()
      .map(|tag: &TagInfo| TagEntry {
        name: tag.name.clone(),
        sha: tag.target.clone(),
        message: tag.message.as_deref().map(truncate_message),
        author: tag.author.clone(),
        date: repo.commit(&tag.target).map(|c| c.date),
      })
      .collect();

    Self {
      module_name: module_name.to_string(),
      modifed_date: Utc::now(),
      head,
      commits: repo.commits.iter().map(CommitEntry::from).collect(),
      tags,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Release {
  pub tag: String,
  pub hash: String,
}

/// `versions.json`: reachable commits and tag releases.
#[derive(Debug, Clone, Serialize)]
pub struct VersionHistory {
  pub module_name: String,
  pub modifed_date: DateTime<Utc>,
  pub head: String,
  pub versions: Vec<String>,
  /// Ordered by descending tag name.
  pub releases: Vec<Release>,
}

impl VersionHistory {
  pub fn from_repo(module_name: &str, repo: &RepoState) -> Self {
    let mut releases: Vec<Release> = repo
      .tags
      .iter()
      .map(|tag| Release {
        tag: tag.name.clone(),
        hash: tag.target.clone(),
      })
      .collect();
    releases.sort_by(|a, b| b.tag.cmp(&a.tag));

    Self {
      module_name: module_name.to_string(),
      modifed_date: Utc::now(),
      head: repo.head.clone().unwrap_or_default(),
      versions: repo.commits.iter().map(|c| c.sha.clone()).collect(),
      releases,
    }
  }
}

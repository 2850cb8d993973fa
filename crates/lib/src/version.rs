//! CI version derivation from repository tags.
//!
//! The build version of a module is the highest semver tag in its repository
//! plus a `ci<NNNN>` pre-release counting the commits made since that tag. A
//! repository without version tags counts from the configured default version
//! and its first commit.

use semver::{Prerelease, Version};
use thiserror::Error;
use tracing::trace;

use crate::config::VersionStyle;
use crate::consts::CI_PRERELEASE_PREFIX;
use crate::vcs::{RepoState, TagInfo};

#[derive(Debug, Error)]
pub enum VersionError {
  #[error("repository has no commits")]
  NoCommits,

  #[error("default version '{0}' is not a valid semantic version")]
  InvalidDefault(String),

  #[error("invalid pre-release label '{label}': {source}")]
  Prerelease {
    label: String,
    #[source]
    source: semver::Error,
  },
}

/// Parse `text` as a semantic version using `style`.
///
/// Lenient parsing accepts a leading `v`/`V`, leading zeros, and missing
/// minor or patch components (`v2` is `2.0.0`).
pub fn parse_version(text: &str, style: VersionStyle) -> Option<Version> {
  let text = text.trim();

  match style {
    VersionStyle::Strict => Version::parse(text).ok(),
    VersionStyle::Lenient => {
      let text = text.strip_prefix(['v', 'V']).unwrap_or(text);
      if let Ok(version) = Version::parse(text) {
        return Some(version);
      }

      let split = text.find(['-', '+']).unwrap_or(text.len());
      let (core, suffix) = text.split_at(split);

      let mut numbers = [0u64; 3];
      let parts: Vec<&str> = core.split('.').collect();
      if parts.len() > numbers.len() {
        return None;
      }
      for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
          return None;
        }
        *slot = part.parse().ok()?;
      }

      Version::parse(&format!("{}.{}.{}{}", numbers[0], numbers[1], numbers[2], suffix)).ok()
    }
  }
}

/// The tag with the highest version, with its parsed version.
pub fn latest_version_tag(tags: &[TagInfo], style: VersionStyle) -> Option<(&TagInfo, Version)> {
  tags
    .iter()
    .filter_map(|tag| parse_version(&tag.name, style).map(|version| (tag, version)))
    .max_by(|a, b| a.1.cmp(&b.1))
}

/// Derive the CI build version for a repository.
///
/// With a version tag, the pre-release counts commits from the tag's commit
/// to HEAD; a tag whose commit is not reachable counts every commit. Without
/// one, `default_version` is used and the count excludes the first commit.
/// No pre-release is added when the count is zero.
pub fn derive_ci_version(
  state: &RepoState,
  default_version: &str,
  style: VersionStyle,
) -> Result<Version, VersionError> {
  if !state.has_commits() {
    return Err(VersionError::NoCommits);
  }

  let (mut version, count) = match latest_version_tag(&state.tags, style) {
    Some((tag, version)) => {
      let count = state
        .distance_from_head(&tag.target)
        .unwrap_or(state.commits.len());
      trace!(tag = %tag.name, count, "using version tag");
      (version, count)
    }
    None => {
      let version =
        parse_version(default_version, style).ok_or_else(|| VersionError::InvalidDefault(default_version.to_string()))?;
      (version, state.commits.len() - 1)
    }
  };

  if count > 0 {
    let label = format!("{CI_PRERELEASE_PREFIX}{count:04}");
    version.pre = Prerelease::new(&label).map_err(|e| VersionError::Prerelease { label, source: e })?;
  }

  Ok(version)
}

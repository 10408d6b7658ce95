//! Change detection - "does this source have new content since last index?"
//!
//! Git sources are diffed by commit hash via a shallow clone; crawled
//! sources (llms.txt, websites) are always treated as actionable when due,
//! with cost control left entirely to the scheduling interval.
//!
//! Detection is deliberately fail-closed: a transient git or network error
//! must produce "no reindex needed this cycle", never a spurious reindex
//! storm. The failure is carried in the decision's `reason` for logging.

mod git;

use async_trait::async_trait;
pub use git::GitChangeDetector;

use crate::domain::{DocumentationRepository, Project, SourceType};

/// Descriptor of a source to check for new content.
#[derive(Debug, Clone)]
pub struct SourceRef {
  pub url: String,
  pub branch: String,
  pub source_type: SourceType,
  pub last_indexed_commit: Option<String>,
}

impl SourceRef {
  pub fn from_project(project: &Project) -> Self {
    Self {
      url: project.git_repo.clone(),
      branch: project.default_branch().to_string(),
      source_type: SourceType::Git,
      last_indexed_commit: project.last_indexed_commit.clone(),
    }
  }

  pub fn from_doc_repository(repo: &DocumentationRepository) -> Self {
    Self {
      url: repo.url.clone(),
      branch: repo.branch.clone().unwrap_or_else(|| "main".to_string()),
      source_type: repo.source_type,
      last_indexed_commit: repo.last_indexed_commit.clone(),
    }
  }
}

/// Outcome of a change-detection check.
#[derive(Debug, Clone)]
pub struct ChangeDecision {
  pub needs_reindexing: bool,
  /// Resolved HEAD commit (git sources only)
  pub latest_ref: Option<String>,
  pub reason: String,
}

impl ChangeDecision {
  pub fn reindex(latest_ref: Option<String>, reason: impl Into<String>) -> Self {
    Self {
      needs_reindexing: true,
      latest_ref,
      reason: reason.into(),
    }
  }

  pub fn skip(reason: impl Into<String>) -> Self {
    Self {
      needs_reindexing: false,
      latest_ref: None,
      reason: reason.into(),
    }
  }
}

/// First 7 characters of a commit hash, for human-readable reasons.
pub(crate) fn short_hash(hash: &str) -> &str {
  &hash[..hash.len().min(7)]
}

/// Decision table for a git source once HEAD is resolved.
pub fn decide_git(last_indexed: Option<&str>, latest: &str) -> ChangeDecision {
  match last_indexed {
    None => ChangeDecision::reindex(Some(latest.to_string()), "never indexed"),
    Some(last) if last != latest => {
      let reason = format!("new commits available: {} -> {}", short_hash(last), short_hash(latest));
      ChangeDecision::reindex(Some(latest.to_string()), reason)
    }
    Some(_) => ChangeDecision::skip("up to date"),
  }
}

/// Policy component answering "does this source need reindexing?"
#[async_trait]
pub trait ChangeDetector: Send + Sync {
  async fn needs_reindexing(&self, source: &SourceRef) -> ChangeDecision;
}

//! Documentation source records.
//!
//! Mirrors `Project` for documentation sources fed by crawlers instead of
//! git repositories. Crawled sources (llms.txt, websites) have no cheap way
//! to diff remote state, so their reindex cadence is purely interval-based.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::project::IndexStatus;

/// Stable identifier for a documentation repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocRepoId(String);

impl DocRepoId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for DocRepoId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for DocRepoId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
  Git,
  LlmsTxt,
  Website,
}

impl SourceType {
  /// Crawled sources are always treated as actionable when due; only git
  /// sources support commit-diff change detection.
  pub fn supports_diff(&self) -> bool {
    matches!(self, SourceType::Git)
  }
}

/// A documentation source registered for periodic reindexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentationRepository {
  pub id: DocRepoId,
  pub url: String,
  pub branch: Option<String>,
  pub source_type: SourceType,

  /// Git sources only
  pub last_indexed_commit: Option<String>,
  pub last_indexed_at: Option<DateTime<Utc>>,

  pub auto_reindex_enabled: bool,
  pub reindex_interval_days: u32,
  pub next_reindex_at: Option<DateTime<Utc>>,

  pub total_documents: usize,
  pub last_indexing_status: Option<IndexStatus>,
  pub last_indexing_error: Option<String>,
  /// Duration of the last run in seconds
  pub last_indexing_duration_secs: Option<u64>,
}

impl DocumentationRepository {
  pub fn new(id: impl Into<DocRepoId>, url: impl Into<String>, source_type: SourceType) -> Self {
    Self {
      id: id.into(),
      url: url.into(),
      branch: None,
      source_type,
      last_indexed_commit: None,
      last_indexed_at: None,
      auto_reindex_enabled: false,
      reindex_interval_days: 7,
      next_reindex_at: None,
      total_documents: 0,
      last_indexing_status: None,
      last_indexing_error: None,
      last_indexing_duration_secs: None,
    }
  }

  /// Whether this source is due for a reindex at `now`.
  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    self.auto_reindex_enabled && self.next_reindex_at.is_some_and(|t| t <= now)
  }
}

impl From<String> for DocRepoId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

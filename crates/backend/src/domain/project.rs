//! Project records and their derived indexing status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl std::fmt::Display for ProjectId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ProjectId {
  fn from(s: &str) -> Self {
    Self(s.to_string())
  }
}

/// Derived indexing status of a project.
///
/// Always consistent with the most recent `IndexingJob` for the project:
/// only trigger adapters (Idle → Indexing via job creation) and the status
/// reconciler (terminal transitions) write this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
  #[default]
  Idle,
  Indexing,
  Completed,
  Error,
}

impl std::fmt::Display for IndexStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      IndexStatus::Idle => "idle",
      IndexStatus::Indexing => "indexing",
      IndexStatus::Completed => "completed",
      IndexStatus::Error => "error",
    };
    f.write_str(s)
  }
}

/// A source repository registered for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
  pub id: ProjectId,

  /// Clone URL of the repository
  pub git_repo: String,

  pub index_status: IndexStatus,

  /// HEAD commit of the last successful index
  pub last_indexed_commit: Option<String>,
  pub last_indexed_at: Option<DateTime<Utc>>,

  pub file_count: usize,
  pub vector_count: usize,

  /// Message from the most recent failed run
  pub last_error: Option<String>,

  // ---- webhook bookkeeping ----
  pub webhook_enabled: bool,
  pub last_webhook_at: Option<DateTime<Utc>>,
  pub last_webhook_commit: Option<String>,
  pub last_webhook_branch: Option<String>,
  pub last_webhook_author: Option<String>,

  // ---- scheduled indexing ----
  pub scheduled_indexing_enabled: bool,
  pub scheduled_indexing_interval_days: u32,
  pub scheduled_indexing_branch: Option<String>,
  pub scheduled_indexing_next_run: Option<DateTime<Utc>>,
}

impl Project {
  pub fn new(id: impl Into<ProjectId>, git_repo: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      git_repo: git_repo.into(),
      index_status: IndexStatus::Idle,
      last_indexed_commit: None,
      last_indexed_at: None,
      file_count: 0,
      vector_count: 0,
      last_error: None,
      webhook_enabled: true,
      last_webhook_at: None,
      last_webhook_commit: None,
      last_webhook_branch: None,
      last_webhook_author: None,
      scheduled_indexing_enabled: false,
      scheduled_indexing_interval_days: 7,
      scheduled_indexing_branch: None,
      scheduled_indexing_next_run: None,
    }
  }

  /// Branch used for indexing when a trigger does not name one.
  pub fn default_branch(&self) -> &str {
    self.scheduled_indexing_branch.as_deref().unwrap_or("main")
  }

  /// Whether the project is due for a scheduled run at `now`.
  pub fn is_due(&self, now: DateTime<Utc>) -> bool {
    self.scheduled_indexing_enabled && self.scheduled_indexing_next_run.is_some_and(|t| t <= now)
  }
}

impl From<String> for ProjectId {
  fn from(s: String) -> Self {
    Self(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_is_due() {
    let now = Utc::now();
    let mut project = Project::new("p1", "https://example.com/repo.git");
    assert!(!project.is_due(now));

    project.scheduled_indexing_enabled = true;
    assert!(!project.is_due(now), "no next_run scheduled yet");

    project.scheduled_indexing_next_run = Some(now - chrono::Duration::minutes(1));
    assert!(project.is_due(now));

    project.scheduled_indexing_next_run = Some(now + chrono::Duration::minutes(1));
    assert!(!project.is_due(now));
  }

  #[test]
  fn test_default_branch() {
    let mut project = Project::new("p1", "https://example.com/repo.git");
    assert_eq!(project.default_branch(), "main");

    project.scheduled_indexing_branch = Some("develop".to_string());
    assert_eq!(project.default_branch(), "develop");
  }
}

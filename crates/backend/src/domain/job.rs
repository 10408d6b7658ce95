//! Indexing job records.
//!
//! A job is created `Pending` by a trigger adapter, owned exclusively by a
//! worker while `Running`, and immutable once it reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::project::ProjectId;

/// Unique identifier for an indexing job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(uuid::Uuid);

impl JobId {
  pub fn generate() -> Self {
    Self(uuid::Uuid::new_v4())
  }
}

impl std::fmt::Display for JobId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl JobStatus {
  /// Terminal states accept no further mutation.
  pub fn is_terminal(&self) -> bool {
    matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
  }

  /// Pending or Running - counts against the one-active-job invariant.
  pub fn is_active(&self) -> bool {
    matches!(self, JobStatus::Pending | JobStatus::Running)
  }
}

impl std::fmt::Display for JobStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      JobStatus::Pending => "pending",
      JobStatus::Running => "running",
      JobStatus::Completed => "completed",
      JobStatus::Failed => "failed",
      JobStatus::Cancelled => "cancelled",
    };
    f.write_str(s)
  }
}

/// What caused a job to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
  Manual,
  Webhook,
  Scheduled,
  Api,
}

/// A single indexing run for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingJob {
  pub id: JobId,
  pub project_id: ProjectId,
  pub status: JobStatus,

  pub branch: String,
  pub full_reindex: bool,
  pub triggered_by: Trigger,

  pub total_files: usize,
  pub processed_files: usize,

  pub vectors_added: usize,
  pub vectors_updated: usize,
  pub vectors_deleted: usize,

  /// Completion percentage, 0-100
  pub progress: u8,

  /// HEAD commit the run indexed (recorded by the pipeline)
  pub commit_hash: Option<String>,

  pub created_at: DateTime<Utc>,
  pub started_at: Option<DateTime<Utc>>,
  pub completed_at: Option<DateTime<Utc>>,

  pub error_message: Option<String>,
}

impl IndexingJob {
  pub fn new(project_id: ProjectId, branch: impl Into<String>, full_reindex: bool, triggered_by: Trigger) -> Self {
    Self {
      id: JobId::generate(),
      project_id,
      status: JobStatus::Pending,
      branch: branch.into(),
      full_reindex,
      triggered_by,
      total_files: 0,
      processed_files: 0,
      vectors_added: 0,
      vectors_updated: 0,
      vectors_deleted: 0,
      progress: 0,
      commit_hash: None,
      created_at: Utc::now(),
      started_at: None,
      completed_at: None,
      error_message: None,
    }
  }

  /// Progress percentage for `processed` of `total` files.
  pub fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
      100
    } else {
      ((processed as f64 / total as f64) * 100.0).min(100.0) as u8
    }
  }
}

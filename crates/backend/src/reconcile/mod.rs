//! Status reconciliation - applies run outcomes back onto the owning
//! records.
//!
//! The reconciler is the only writer of terminal status fields on
//! `Project` and `DocumentationRepository`. Next-run times advance on
//! success AND failure so a failing target keeps its place in the
//! schedule instead of stalling forever.

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::{
  domain::{DocRepoId, IndexStatus, ProjectId},
  store::{RecordStore, StoreError},
};

/// Outcome of a project indexing run.
#[derive(Debug, Clone, Default)]
pub struct ProjectOutcome {
  pub success: bool,
  pub file_count: usize,
  pub vector_count: usize,
  pub commit_hash: Option<String>,
  pub error: Option<String>,
}

/// Outcome of a documentation source run.
#[derive(Debug, Clone, Default)]
pub struct DocOutcome {
  pub success: bool,
  pub total_documents: usize,
  pub commit_hash: Option<String>,
  pub duration_secs: u64,
  pub error: Option<String>,
}

pub struct StatusReconciler {
  store: Arc<dyn RecordStore>,
}

impl StatusReconciler {
  pub fn new(store: Arc<dyn RecordStore>) -> Self {
    Self { store }
  }

  /// Apply a run outcome to the owning project.
  pub async fn reconcile_project(&self, id: &ProjectId, outcome: &ProjectOutcome) -> Result<(), StoreError> {
    let now = Utc::now();
    let mut project = self.store.project(id).await?;

    if outcome.success {
      project.index_status = IndexStatus::Completed;
      project.file_count = outcome.file_count;
      project.vector_count = outcome.vector_count;
      project.last_indexed_at = Some(now);
      if let Some(commit) = &outcome.commit_hash {
        project.last_indexed_commit = Some(commit.clone());
      }
      project.last_error = None;
      info!(project_id = %id, files = outcome.file_count, vectors = outcome.vector_count, "Project indexing reconciled");
    } else {
      project.index_status = IndexStatus::Error;
      project.last_error = outcome.error.clone();
      warn!(project_id = %id, error = ?outcome.error, "Project indexing failed");
    }

    if project.scheduled_indexing_enabled {
      project.scheduled_indexing_next_run = Some(now + Duration::days(project.scheduled_indexing_interval_days as i64));
    }

    self.store.upsert_project(project).await
  }

  /// Advance a project's scheduled next-run without touching status.
  ///
  /// Used by the sweep when a due project turns out not to need reindexing
  /// (or its change detection failed) - the schedule must still move on.
  pub async fn advance_project_schedule(&self, id: &ProjectId) -> Result<(), StoreError> {
    let mut project = self.store.project(id).await?;
    if project.scheduled_indexing_enabled {
      project.scheduled_indexing_next_run =
        Some(Utc::now() + Duration::days(project.scheduled_indexing_interval_days as i64));
      self.store.upsert_project(project).await?;
    }
    Ok(())
  }

  /// Apply a run outcome to a documentation repository.
  pub async fn reconcile_doc_repository(&self, id: &DocRepoId, outcome: &DocOutcome) -> Result<(), StoreError> {
    let now = Utc::now();
    let mut repo = self.store.doc_repository(id).await?;

    if outcome.success {
      repo.last_indexing_status = Some(IndexStatus::Completed);
      repo.last_indexing_error = None;
      repo.total_documents = outcome.total_documents;
      repo.last_indexed_at = Some(now);
      if let Some(commit) = &outcome.commit_hash {
        repo.last_indexed_commit = Some(commit.clone());
      }
    } else {
      repo.last_indexing_status = Some(IndexStatus::Error);
      repo.last_indexing_error = outcome.error.clone();
    }
    repo.last_indexing_duration_secs = Some(outcome.duration_secs);

    if repo.auto_reindex_enabled {
      repo.next_reindex_at = Some(now + Duration::days(repo.reindex_interval_days as i64));
    }

    self.store.upsert_doc_repository(repo).await
  }

  /// Advance a documentation repository's next-reindex time only.
  pub async fn advance_doc_schedule(&self, id: &DocRepoId) -> Result<(), StoreError> {
    let mut repo = self.store.doc_repository(id).await?;
    if repo.auto_reindex_enabled {
      repo.next_reindex_at = Some(Utc::now() + Duration::days(repo.reindex_interval_days as i64));
      self.store.upsert_doc_repository(repo).await?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::{
    domain::{DocumentationRepository, Project, SourceType},
    store::MemoryStore,
  };

  async fn setup() -> (Arc<MemoryStore>, StatusReconciler) {
    let store = Arc::new(MemoryStore::new());
    let reconciler = StatusReconciler::new(store.clone());
    (store, reconciler)
  }

  #[tokio::test]
  async fn test_project_success() {
    let (store, reconciler) = setup().await;
    let mut project = Project::new("p1", "https://example.com/repo.git");
    project.last_error = Some("old failure".to_string());
    store.upsert_project(project).await.unwrap();

    let outcome = ProjectOutcome {
      success: true,
      file_count: 10,
      vector_count: 42,
      commit_hash: Some("abcdef1234".to_string()),
      error: None,
    };
    reconciler.reconcile_project(&ProjectId::from("p1"), &outcome).await.unwrap();

    let project = store.project(&ProjectId::from("p1")).await.unwrap();
    assert_eq!(project.index_status, IndexStatus::Completed);
    assert_eq!(project.file_count, 10);
    assert_eq!(project.vector_count, 42);
    assert_eq!(project.last_indexed_commit.as_deref(), Some("abcdef1234"));
    assert!(project.last_error.is_none());
    assert!(project.last_indexed_at.is_some());
  }

  #[tokio::test]
  async fn test_project_failure_still_advances_schedule() {
    let (store, reconciler) = setup().await;
    let mut project = Project::new("p1", "https://example.com/repo.git");
    project.scheduled_indexing_enabled = true;
    project.scheduled_indexing_interval_days = 3;
    project.scheduled_indexing_next_run = Some(Utc::now() - Duration::hours(1));
    store.upsert_project(project).await.unwrap();

    let before = Utc::now();
    let outcome = ProjectOutcome {
      success: false,
      error: Some("clone failed".to_string()),
      ..ProjectOutcome::default()
    };
    reconciler.reconcile_project(&ProjectId::from("p1"), &outcome).await.unwrap();

    let project = store.project(&ProjectId::from("p1")).await.unwrap();
    assert_eq!(project.index_status, IndexStatus::Error);
    assert_eq!(project.last_error.as_deref(), Some("clone failed"));

    let next_run = project.scheduled_indexing_next_run.expect("schedule must self-heal");
    assert!(next_run > before + Duration::days(2));
  }

  #[tokio::test]
  async fn test_doc_repository_reconcile() {
    let (store, reconciler) = setup().await;
    let mut repo = DocumentationRepository::new("d1", "https://docs.example.com/llms.txt", SourceType::LlmsTxt);
    repo.auto_reindex_enabled = true;
    repo.reindex_interval_days = 1;
    store.upsert_doc_repository(repo).await.unwrap();

    let outcome = DocOutcome {
      success: true,
      total_documents: 7,
      duration_secs: 12,
      ..DocOutcome::default()
    };
    reconciler
      .reconcile_doc_repository(&DocRepoId::from("d1"), &outcome)
      .await
      .unwrap();

    let repo = store.doc_repository(&DocRepoId::from("d1")).await.unwrap();
    assert_eq!(repo.last_indexing_status, Some(IndexStatus::Completed));
    assert_eq!(repo.total_documents, 7);
    assert_eq!(repo.last_indexing_duration_secs, Some(12));
    assert!(repo.next_reindex_at.is_some(), "next run always recomputed");
  }

  #[tokio::test]
  async fn test_advance_schedule_only() {
    let (store, reconciler) = setup().await;
    let mut project = Project::new("p1", "https://example.com/repo.git");
    project.scheduled_indexing_enabled = true;
    project.scheduled_indexing_next_run = Some(Utc::now() - Duration::hours(1));
    store.upsert_project(project).await.unwrap();

    reconciler.advance_project_schedule(&ProjectId::from("p1")).await.unwrap();

    let project = store.project(&ProjectId::from("p1")).await.unwrap();
    assert_eq!(project.index_status, IndexStatus::Idle, "status untouched");
    assert!(project.scheduled_indexing_next_run.unwrap() > Utc::now());
  }
}

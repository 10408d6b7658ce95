//! Trigger adapters - the three producers of indexing intent.
//!
//! Manual/API requests, inbound webhooks, and the scheduled sweep all
//! converge on one path: atomically create a `Pending` job (the store
//! enforces the one-active-job invariant) and enqueue a reference to it.
//!
//! Enqueue failure after the job row exists is logged, not surfaced - the
//! job is healed by `IndexQueue::restore_pending` at the next restore pass.

pub mod sweep;
pub mod webhook;

use tracing::{error, info};

use crate::{
  domain::{IndexingJob, Project, ProjectId, Trigger},
  queue::{IndexQueue, IndexTarget, Priority},
  store::{RecordStore, StoreError},
};

/// Errors surfaced synchronously to trigger callers
#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
  #[error("Project {0} is already indexing")]
  AlreadyIndexing(ProjectId),
  #[error(transparent)]
  Store(StoreError),
}

impl From<StoreError> for TriggerError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::AlreadyIndexing(id) => TriggerError::AlreadyIndexing(id),
      other => TriggerError::Store(other),
    }
  }
}

/// Parameters for a manual or API indexing request.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct IndexRequest {
  pub branch: Option<String>,
  pub full_reindex: bool,
  pub triggered_by: Option<Trigger>,
}

/// Create a `Pending` job for the project and enqueue it.
///
/// The create is atomic against the one-active-job invariant. The enqueue
/// is fire-and-forget: a failure leaves a Pending job with no queue entry,
/// which `restore_pending` picks up later.
pub async fn create_and_enqueue(
  store: &dyn RecordStore,
  queue: &IndexQueue,
  project: &Project,
  branch: String,
  full_reindex: bool,
  triggered_by: Trigger,
) -> Result<IndexingJob, TriggerError> {
  let job = IndexingJob::new(project.id.clone(), branch, full_reindex, triggered_by);
  let job = store.create_job_if_idle(job).await?;

  info!(
    project_id = %project.id,
    job_id = %job.id,
    branch = %job.branch,
    triggered_by = ?triggered_by,
    "Queued indexing job"
  );

  let target = IndexTarget::Project {
    project_id: project.id.clone(),
    job_id: job.id.clone(),
    branch: job.branch.clone(),
    full_reindex,
    triggered_by,
  };
  if let Err(e) = queue.enqueue(target, Priority::for_trigger(triggered_by)) {
    // The Pending job row survives; restore_pending re-enqueues it.
    error!(job_id = %job.id, error = %e, "Failed to enqueue indexing job");
  }

  Ok(job)
}

/// Manual/API trigger: index one project now, at interactive priority.
pub async fn trigger_manual(
  store: &dyn RecordStore,
  queue: &IndexQueue,
  project_id: &ProjectId,
  request: IndexRequest,
) -> Result<IndexingJob, TriggerError> {
  let project = store.project(project_id).await?;
  let branch = request
    .branch
    .unwrap_or_else(|| project.default_branch().to_string());
  let triggered_by = request.triggered_by.unwrap_or(Trigger::Manual);

  create_and_enqueue(store, queue, &project, branch, request.full_reindex, triggered_by).await
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::{domain::JobStatus, store::MemoryStore};

  #[tokio::test]
  async fn test_manual_trigger_creates_pending_job() {
    let store = MemoryStore::new();
    let queue = IndexQueue::new(256);
    store
      .upsert_project(Project::new("p1", "https://example.com/repo.git"))
      .await
      .unwrap();

    let job = trigger_manual(&store, &queue, &ProjectId::from("p1"), IndexRequest::default())
      .await
      .expect("trigger");

    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.triggered_by, Trigger::Manual);
    assert_eq!(job.branch, "main");
    assert_eq!(queue.stats().pending, 1);
  }

  #[tokio::test]
  async fn test_manual_trigger_rejects_when_active() {
    let store = MemoryStore::new();
    let queue = IndexQueue::new(256);
    store
      .upsert_project(Project::new("p1", "https://example.com/repo.git"))
      .await
      .unwrap();

    trigger_manual(&store, &queue, &ProjectId::from("p1"), IndexRequest::default())
      .await
      .expect("first trigger");

    let err = trigger_manual(&store, &queue, &ProjectId::from("p1"), IndexRequest::default())
      .await
      .unwrap_err();
    assert!(matches!(err, TriggerError::AlreadyIndexing(_)));
    assert_eq!(queue.stats().pending, 1, "no second entry enqueued");
  }

  #[tokio::test]
  async fn test_enqueue_failure_still_returns_job() {
    let store = MemoryStore::new();
    let queue = IndexQueue::new(256);
    queue.close();
    store
      .upsert_project(Project::new("p1", "https://example.com/repo.git"))
      .await
      .unwrap();

    // Enqueue fails, but the job record exists for restore_pending to heal
    let job = trigger_manual(&store, &queue, &ProjectId::from("p1"), IndexRequest::default())
      .await
      .expect("job creation succeeds despite enqueue failure");

    let stored = store.job(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Pending);
  }

  #[tokio::test]
  async fn test_unknown_project() {
    let store = MemoryStore::new();
    let queue = IndexQueue::new(256);

    let err = trigger_manual(&store, &queue, &ProjectId::from("ghost"), IndexRequest::default())
      .await
      .unwrap_err();
    assert!(matches!(err, TriggerError::Store(StoreError::ProjectNotFound(_))));
  }
}

//! Record store - durable `Project`, `IndexingJob`, and
//! `DocumentationRepository` state.
//!
//! The relational store backing these records is an external collaborator;
//! this module defines the contract the orchestration core needs from it,
//! plus an in-memory reference implementation used by the default runtime
//! and the test suite.
//!
//! Two store-level guarantees the rest of the engine leans on:
//!
//! - `create_job_if_idle` is atomic: the "no active job for this project"
//!   check and the job insert happen under one lock, so concurrent trigger
//!   adapters cannot both win (the check-then-act race is resolved here).
//! - `update_job` rejects writes to jobs already in a terminal state.

mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use memory::MemoryStore;

use crate::domain::{DocRepoId, DocumentationRepository, IndexingJob, JobId, Project, ProjectId};

/// Errors from record store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("Project not found: {0}")]
  ProjectNotFound(ProjectId),
  #[error("Job not found: {0}")]
  JobNotFound(JobId),
  #[error("Documentation repository not found: {0}")]
  DocRepositoryNotFound(DocRepoId),
  #[error("Project {0} already has an active indexing job")]
  AlreadyIndexing(ProjectId),
  #[error("Job {0} is in a terminal state and cannot be modified")]
  TerminalJob(JobId),
  #[error("Store backend error: {0}")]
  Backend(String),
}

/// Contract for the durable record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
  // ---- projects ----
  async fn project(&self, id: &ProjectId) -> Result<Project, StoreError>;
  async fn upsert_project(&self, project: Project) -> Result<(), StoreError>;
  async fn due_projects(&self, now: DateTime<Utc>) -> Result<Vec<Project>, StoreError>;

  // ---- jobs ----
  /// Atomically create a `Pending` job for the project, failing with
  /// [`StoreError::AlreadyIndexing`] if a Pending or Running job exists.
  async fn create_job_if_idle(&self, job: IndexingJob) -> Result<IndexingJob, StoreError>;
  async fn job(&self, id: &JobId) -> Result<IndexingJob, StoreError>;
  /// Persist job mutation. Fails with [`StoreError::TerminalJob`] if the
  /// stored job already reached Completed, Failed, or Cancelled.
  async fn update_job(&self, job: &IndexingJob) -> Result<(), StoreError>;
  async fn active_job_for_project(&self, id: &ProjectId) -> Result<Option<IndexingJob>, StoreError>;
  async fn pending_jobs(&self) -> Result<Vec<IndexingJob>, StoreError>;
  async fn jobs_for_project(&self, id: &ProjectId) -> Result<Vec<IndexingJob>, StoreError>;

  // ---- documentation repositories ----
  async fn doc_repository(&self, id: &DocRepoId) -> Result<DocumentationRepository, StoreError>;
  async fn upsert_doc_repository(&self, repo: DocumentationRepository) -> Result<(), StoreError>;
  async fn due_doc_repositories(&self, now: DateTime<Utc>) -> Result<Vec<DocumentationRepository>, StoreError>;
}

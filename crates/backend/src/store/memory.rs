//! In-memory record store.
//!
//! DashMap-backed reference implementation of [`RecordStore`]. The active-job
//! index doubles as the lock that makes `create_job_if_idle` atomic: the
//! entry API holds the shard lock across the check and the insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::{RecordStore, StoreError};
use crate::domain::{DocRepoId, DocumentationRepository, IndexingJob, JobId, Project, ProjectId};

#[derive(Default)]
pub struct MemoryStore {
  projects: DashMap<ProjectId, Project>,
  jobs: DashMap<JobId, IndexingJob>,
  doc_repos: DashMap<DocRepoId, DocumentationRepository>,

  /// ProjectId -> JobId of the currently active (Pending/Running) job.
  /// Entries are inserted by `create_job_if_idle` and removed when
  /// `update_job` writes a terminal status.
  active: DashMap<ProjectId, JobId>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl RecordStore for MemoryStore {
  async fn project(&self, id: &ProjectId) -> Result<Project, StoreError> {
    self
      .projects
      .get(id)
      .map(|p| p.value().clone())
      .ok_or_else(|| StoreError::ProjectNotFound(id.clone()))
  }

  async fn upsert_project(&self, project: Project) -> Result<(), StoreError> {
    self.projects.insert(project.id.clone(), project);
    Ok(())
  }

  async fn due_projects(&self, now: DateTime<Utc>) -> Result<Vec<Project>, StoreError> {
    Ok(
      self
        .projects
        .iter()
        .filter(|entry| entry.value().is_due(now))
        .map(|entry| entry.value().clone())
        .collect(),
    )
  }

  async fn create_job_if_idle(&self, job: IndexingJob) -> Result<IndexingJob, StoreError> {
    match self.active.entry(job.project_id.clone()) {
      Entry::Occupied(_) => Err(StoreError::AlreadyIndexing(job.project_id.clone())),
      Entry::Vacant(vacant) => {
        vacant.insert(job.id.clone());
        debug!(project_id = %job.project_id, job_id = %job.id, "Created indexing job");
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(job)
      }
    }
  }

  async fn job(&self, id: &JobId) -> Result<IndexingJob, StoreError> {
    self
      .jobs
      .get(id)
      .map(|j| j.value().clone())
      .ok_or_else(|| StoreError::JobNotFound(id.clone()))
  }

  async fn update_job(&self, job: &IndexingJob) -> Result<(), StoreError> {
    {
      let mut stored = self
        .jobs
        .get_mut(&job.id)
        .ok_or_else(|| StoreError::JobNotFound(job.id.clone()))?;

      if stored.status.is_terminal() {
        return Err(StoreError::TerminalJob(job.id.clone()));
      }

      *stored = job.clone();
    }

    // Release the active slot once the job leaves the Pending/Running set.
    if job.status.is_terminal() {
      self
        .active
        .remove_if(&job.project_id, |_, active_id| *active_id == job.id);
    }

    Ok(())
  }

  async fn active_job_for_project(&self, id: &ProjectId) -> Result<Option<IndexingJob>, StoreError> {
    let Some(job_id) = self.active.get(id).map(|e| e.value().clone()) else {
      return Ok(None);
    };
    Ok(self.jobs.get(&job_id).map(|j| j.value().clone()))
  }

  async fn pending_jobs(&self) -> Result<Vec<IndexingJob>, StoreError> {
    Ok(
      self
        .jobs
        .iter()
        .filter(|entry| entry.value().status == crate::domain::JobStatus::Pending)
        .map(|entry| entry.value().clone())
        .collect(),
    )
  }

  async fn jobs_for_project(&self, id: &ProjectId) -> Result<Vec<IndexingJob>, StoreError> {
    let mut jobs: Vec<IndexingJob> = self
      .jobs
      .iter()
      .filter(|entry| entry.value().project_id == *id)
      .map(|entry| entry.value().clone())
      .collect();
    jobs.sort_by_key(|j| j.created_at);
    Ok(jobs)
  }

  async fn doc_repository(&self, id: &DocRepoId) -> Result<DocumentationRepository, StoreError> {
    self
      .doc_repos
      .get(id)
      .map(|r| r.value().clone())
      .ok_or_else(|| StoreError::DocRepositoryNotFound(id.clone()))
  }

  async fn upsert_doc_repository(&self, repo: DocumentationRepository) -> Result<(), StoreError> {
    self.doc_repos.insert(repo.id.clone(), repo);
    Ok(())
  }

  async fn due_doc_repositories(&self, now: DateTime<Utc>) -> Result<Vec<DocumentationRepository>, StoreError> {
    Ok(
      self
        .doc_repos
        .iter()
        .filter(|entry| entry.value().is_due(now))
        .map(|entry| entry.value().clone())
        .collect(),
    )
  }
}

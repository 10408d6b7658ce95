//! Orchestrator - the dependency-injected service facade.
//!
//! Owns the queue, worker pool, detector, and reconciler, with an explicit
//! start/shutdown lifecycle (no module-level singletons). The HTTP layer
//! and the CLI both drive the engine exclusively through this type.

use std::sync::Arc;

use lodestone_core::Config;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
  detect::{ChangeDetector, GitChangeDetector},
  domain::{IndexingJob, JobId, JobStatus, Project, ProjectId},
  embedding::EmbeddingProvider,
  parse::{ChunkParser, PlainChunker},
  queue::{IndexQueue, QueueStats},
  reconcile::StatusReconciler,
  source::{GitSourceFetcher, SourceFetcher},
  store::{MemoryStore, RecordStore, StoreError},
  trigger::{
    self, IndexRequest, TriggerError,
    sweep::{DueTargets, ScheduledSweep, SweepReport},
    webhook::{WebhookError, WebhookResponse},
  },
  vector::{MemoryVectorStore, VectorStore},
  worker::{IndexingPipeline, WorkerPool, WorkerPoolConfig},
};

/// Errors from orchestrator operations
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
  #[error(transparent)]
  Store(#[from] StoreError),
}

/// External collaborators injected into the engine.
pub struct Collaborators {
  pub store: Arc<dyn RecordStore>,
  pub detector: Arc<dyn ChangeDetector>,
  pub fetcher: Arc<dyn SourceFetcher>,
  pub parser: Arc<dyn ChunkParser>,
  pub embedding: Arc<dyn EmbeddingProvider>,
  pub vectors: Arc<dyn VectorStore>,
}

impl Collaborators {
  /// Default wiring: git-backed detection/fetching, plain chunking, HTTP
  /// embeddings, and the in-memory store implementations.
  pub fn defaults(config: &Config) -> Result<Self, crate::embedding::EmbeddingError> {
    Ok(Self {
      store: Arc::new(MemoryStore::new()),
      detector: Arc::new(GitChangeDetector::from_config(&config.git)),
      fetcher: Arc::new(GitSourceFetcher::from_config(&config.git, &config.indexing)),
      parser: Arc::new(PlainChunker::from_config(&config.indexing)),
      embedding: <dyn EmbeddingProvider>::from_config(&config.embedding)?,
      vectors: Arc::new(MemoryVectorStore::new()),
    })
  }
}

/// The indexing orchestration engine.
pub struct Orchestrator {
  config: Config,
  store: Arc<dyn RecordStore>,
  queue: Arc<IndexQueue>,
  pool: Arc<WorkerPool>,
  sweep: ScheduledSweep,
  cancel: CancellationToken,
}

impl Orchestrator {
  /// Assemble the engine from config and collaborators.
  ///
  /// Nothing runs until [`start`](Self::start) is called.
  pub fn new(config: Config, collaborators: Collaborators, cancel: CancellationToken) -> Self {
    let Collaborators {
      store,
      detector,
      fetcher,
      parser,
      embedding,
      vectors,
    } = collaborators;

    let queue = Arc::new(IndexQueue::new(config.queue.pending_warn_threshold));
    let reconciler = Arc::new(StatusReconciler::new(store.clone()));
    let pipeline = Arc::new(IndexingPipeline::new(fetcher, parser, embedding, vectors));

    let pool = Arc::new(WorkerPool::new(
      WorkerPoolConfig {
        width: config.effective_worker_count(num_cpus::get()),
      },
      store.clone(),
      queue.clone(),
      reconciler.clone(),
      pipeline,
      cancel.child_token(),
    ));

    let sweep = ScheduledSweep::new(store.clone(), queue.clone(), detector, reconciler);

    Self {
      config,
      store,
      queue,
      pool,
      sweep,
      cancel,
    }
  }

  /// Restore queued work from the store and start the worker pool.
  pub async fn start(&self) -> Result<(), ServiceError> {
    match self.queue.restore_pending(self.store.as_ref()).await {
      Ok(restored) if restored > 0 => info!(restored, "Restored pending jobs at startup"),
      Ok(_) => {}
      Err(e) => warn!(error = %e, "Failed to restore pending jobs"),
    }

    self.pool.clone().start();
    info!("Orchestrator started");
    Ok(())
  }

  /// Stop the worker pool and reject further work.
  pub async fn shutdown(&self) {
    info!("Orchestrator shutting down");
    self.cancel.cancel();
    self.pool.shutdown().await;
  }

  // ==========================================================================
  // Operations
  // ==========================================================================

  /// Manual/API trigger: start indexing one project.
  pub async fn start_indexing(&self, project_id: &ProjectId, request: IndexRequest) -> Result<IndexingJob, TriggerError> {
    trigger::trigger_manual(self.store.as_ref(), &self.queue, project_id, request).await
  }

  /// Cancel the active job for a project, if any.
  ///
  /// Queued jobs are cancelled immediately; running jobs stop cooperatively
  /// at their next file boundary. Returns the cancelled job id.
  pub async fn stop_indexing(&self, project_id: &ProjectId) -> Result<Option<JobId>, ServiceError> {
    let Some(mut job) = self.store.active_job_for_project(project_id).await? else {
      return Ok(None);
    };

    self.queue.cancel_for_project(project_id);

    match job.status {
      JobStatus::Pending => {
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(chrono::Utc::now());
        if let Err(e) = self.store.update_job(&job).await {
          // The worker claimed it in the meantime; fall back to the token
          warn!(job_id = %job.id, error = %e, "Pending cancel raced a worker claim");
          self.pool.cancel_job(&job.id);
        }
        info!(project_id = %project_id, job_id = %job.id, "Cancelled queued job");
        Ok(Some(job.id))
      }
      JobStatus::Running => {
        self.pool.cancel_job(&job.id);
        info!(project_id = %project_id, job_id = %job.id, "Requested cancellation of running job");
        Ok(Some(job.id))
      }
      _ => Ok(None),
    }
  }

  /// Handle an inbound webhook delivery.
  pub async fn handle_webhook(
    &self,
    project_id: &ProjectId,
    headers: &axum::http::HeaderMap,
    body: &[u8],
  ) -> Result<WebhookResponse, WebhookError> {
    trigger::webhook::handle_webhook(
      self.store.as_ref(),
      &self.queue,
      self.config.webhook.secret.as_deref(),
      project_id,
      headers,
      body,
    )
    .await
  }

  /// Run one scheduled sweep over all due targets.
  pub async fn run_sweep(&self) -> SweepReport {
    self.sweep.run().await
  }

  /// List due targets with no side effects.
  pub async fn due_targets(&self) -> DueTargets {
    self.sweep.due_targets().await
  }

  pub fn queue_stats(&self) -> QueueStats {
    self.queue.stats()
  }

  /// Record store handle, for read paths (dashboards, status endpoints).
  pub fn store(&self) -> &Arc<dyn RecordStore> {
    &self.store
  }

  pub async fn project(&self, id: &ProjectId) -> Result<Project, ServiceError> {
    Ok(self.store.project(id).await?)
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  fn orchestrator() -> Orchestrator {
    let config = Config::default();
    let collaborators = Collaborators::defaults(&config).expect("collaborators");
    Orchestrator::new(config, collaborators, CancellationToken::new())
  }

  #[tokio::test]
  async fn test_stop_indexing_without_active_job() {
    let orchestrator = orchestrator();
    orchestrator
      .store()
      .upsert_project(Project::new("p1", "https://example.com/repo.git"))
      .await
      .unwrap();

    let cancelled = orchestrator.stop_indexing(&ProjectId::from("p1")).await.unwrap();
    assert!(cancelled.is_none());
  }

  #[tokio::test]
  async fn test_stop_indexing_cancels_queued_job() {
    let orchestrator = orchestrator();
    orchestrator
      .store()
      .upsert_project(Project::new("p1", "https://example.com/repo.git"))
      .await
      .unwrap();

    // Pool not started - the job stays queued
    let job = orchestrator
      .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
      .await
      .unwrap();

    let cancelled = orchestrator.stop_indexing(&ProjectId::from("p1")).await.unwrap();
    assert_eq!(cancelled, Some(job.id.clone()));

    let stored = orchestrator.store().job(&job.id).await.unwrap();
    assert_eq!(stored.status, JobStatus::Cancelled);
    assert_eq!(orchestrator.queue_stats().pending, 0);

    // The slot is free again
    orchestrator
      .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
      .await
      .expect("project no longer busy");
  }

  #[tokio::test]
  async fn test_start_indexing_conflict() {
    let orchestrator = orchestrator();
    orchestrator
      .store()
      .upsert_project(Project::new("p1", "https://example.com/repo.git"))
      .await
      .unwrap();

    orchestrator
      .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
      .await
      .unwrap();
    let err = orchestrator
      .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
      .await
      .unwrap_err();
    assert!(matches!(err, TriggerError::AlreadyIndexing(_)));
  }
}

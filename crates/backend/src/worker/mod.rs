//! Worker pool - bounded concurrent executors for queued indexing work.
//!
//! Each worker loops: dequeue → claim the job (Pending → Running) → run the
//! pipeline → write the terminal state and hand the outcome to the status
//! reconciler. Failures are contained at the job boundary; nothing a job
//! does can take down its worker.
//!
//! Per-project serialization is NOT enforced here - the trigger adapters'
//! atomic job creation guarantees at most one Pending/Running job per
//! project before anything reaches the queue.

pub mod pipeline;

use std::{
  sync::{Arc, Mutex},
  time::Instant,
};

use chrono::Utc;
use dashmap::DashMap;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use self::pipeline::{IndexProgress, IndexingPipeline, PipelineError, PipelineOutcome};
use crate::{
  detect::SourceRef,
  domain::{DocRepoId, IndexStatus, IndexingJob, JobId, JobStatus, ProjectId},
  queue::{IndexQueue, IndexTarget, QueueEntry},
  reconcile::{DocOutcome, ProjectOutcome, StatusReconciler},
  store::RecordStore,
};

/// Configuration for the worker pool
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
  /// Number of concurrent workers
  pub width: usize,
}

impl Default for WorkerPoolConfig {
  fn default() -> Self {
    Self {
      width: num_cpus::get().clamp(1, 4),
    }
  }
}

/// Fixed-size pool of indexing workers.
///
/// Explicitly constructed and started; `shutdown` cancels all workers and
/// their in-flight jobs cooperatively (jobs stop at the next file boundary).
pub struct WorkerPool {
  config: WorkerPoolConfig,
  store: Arc<dyn RecordStore>,
  queue: Arc<IndexQueue>,
  reconciler: Arc<StatusReconciler>,
  pipeline: Arc<IndexingPipeline>,
  cancel: CancellationToken,
  handles: Mutex<Vec<JoinHandle<()>>>,
  /// Cancellation tokens for jobs currently being executed
  running: DashMap<JobId, CancellationToken>,
}

impl WorkerPool {
  pub fn new(
    config: WorkerPoolConfig,
    store: Arc<dyn RecordStore>,
    queue: Arc<IndexQueue>,
    reconciler: Arc<StatusReconciler>,
    pipeline: Arc<IndexingPipeline>,
    cancel: CancellationToken,
  ) -> Self {
    Self {
      config,
      store,
      queue,
      reconciler,
      pipeline,
      cancel,
      handles: Mutex::new(Vec::new()),
      running: DashMap::new(),
    }
  }

  /// Spawn the worker tasks.
  pub fn start(self: Arc<Self>) {
    let mut handles = self.handles.lock().expect("pool lock poisoned");
    if !handles.is_empty() {
      warn!("Worker pool already started");
      return;
    }

    info!(width = self.config.width, "Worker pool starting");
    for worker_id in 0..self.config.width {
      let pool = Arc::clone(&self);
      handles.push(tokio::spawn(async move {
        pool.worker_loop(worker_id).await;
      }));
    }
  }

  /// Cancel all workers and wait for them to drain.
  pub async fn shutdown(&self) {
    self.cancel.cancel();
    self.queue.close();

    let handles: Vec<JoinHandle<()>> = {
      let mut guard = self.handles.lock().expect("pool lock poisoned");
      guard.drain(..).collect()
    };
    futures::future::join_all(handles).await;
    info!("Worker pool stopped");
  }

  /// Request cancellation of an in-flight job.
  ///
  /// Cooperative: the pipeline observes the token at its next file
  /// boundary and the worker writes the Cancelled state. Returns false if
  /// the job is not currently executing.
  pub fn cancel_job(&self, job_id: &JobId) -> bool {
    if let Some(token) = self.running.get(job_id) {
      token.cancel();
      true
    } else {
      false
    }
  }

  async fn worker_loop(self: Arc<Self>, worker_id: usize) {
    debug!(worker_id, "Worker started");

    while let Some(entry) = self.queue.dequeue(&self.cancel).await {
      match entry {
        QueueEntry {
          target:
            IndexTarget::Project {
              project_id,
              job_id,
              branch,
              full_reindex,
              ..
            },
          ..
        } => {
          self
            .handle_project_entry(worker_id, &project_id, &job_id, branch, full_reindex)
            .await;
        }
        QueueEntry {
          target: IndexTarget::DocRepository { repo_id },
          ..
        } => {
          self.handle_doc_entry(worker_id, &repo_id).await;
        }
      }
    }

    debug!(worker_id, "Worker stopped");
  }

  // ==========================================================================
  // Project jobs
  // ==========================================================================

  async fn handle_project_entry(
    &self,
    worker_id: usize,
    project_id: &ProjectId,
    job_id: &JobId,
    branch: String,
    full_reindex: bool,
  ) {
    let mut job = match self.store.job(job_id).await {
      Ok(job) => job,
      Err(e) => {
        warn!(worker_id, job_id = %job_id, error = %e, "Dequeued entry references missing job");
        self.queue.finish_skipped();
        return;
      }
    };

    // Cancelled (or otherwise settled) while still queued
    if job.status != JobStatus::Pending {
      debug!(worker_id, job_id = %job_id, status = %job.status, "Skipping settled job");
      self.queue.finish_skipped();
      return;
    }

    let mut project = match self.store.project(project_id).await {
      Ok(project) => project,
      Err(e) => {
        error!(worker_id, project_id = %project_id, error = %e, "Job references missing project");
        job.status = JobStatus::Failed;
        job.error_message = Some(format!("project not found: {}", e));
        job.completed_at = Some(Utc::now());
        let _ = self.store.update_job(&job).await;
        self.queue.finish(false);
        return;
      }
    };

    // Project goes Indexing before the claim so any observer of a Running
    // job already sees the derived status.
    let previous_status = project.index_status;
    project.index_status = IndexStatus::Indexing;
    if let Err(e) = self.store.upsert_project(project.clone()).await {
      warn!(project_id = %project_id, error = %e, "Failed to mark project indexing");
    }

    // Register the cancellation token before the job reads as Running, so
    // a stop request arriving right after the claim always finds it.
    let job_cancel = self.cancel.child_token();
    self.running.insert(job_id.clone(), job_cancel.clone());

    // Claim: Pending → Running
    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    if let Err(e) = self.store.update_job(&job).await {
      // Lost a cancellation race while queued
      debug!(worker_id, job_id = %job_id, error = %e, "Could not claim job");
      self.running.remove(job_id);
      project.index_status = previous_status;
      let _ = self.store.upsert_project(project).await;
      self.queue.finish_skipped();
      return;
    }

    info!(worker_id, project_id = %project_id, job_id = %job_id, branch = %branch, "Indexing run started");

    let source = SourceRef {
      url: project.git_repo.clone(),
      branch,
      source_type: crate::domain::SourceType::Git,
      last_indexed_commit: project.last_indexed_commit.clone(),
    };

    let progress_task = self.spawn_progress_writer(&job);
    let (result, progress_handle) = {
      let (tx, handle) = progress_task;
      let result = self
        .pipeline
        .run(project_id, &source, full_reindex, Some(tx), &job_cancel)
        .await;
      (result, handle)
    };

    // Sender dropped inside the pipeline; wait for the writer to drain so
    // no progress write lands after the terminal write below.
    let _ = progress_handle.await;
    self.running.remove(job_id);

    // Re-read for the freshest progress fields before the terminal write.
    // Reconciliation runs first, the terminal job write last: once a job
    // reads as terminal, the owning record is already settled.
    let mut final_job = self.store.job(job_id).await.unwrap_or(job);
    final_job.completed_at = Some(Utc::now());

    match result {
      Ok(outcome) => {
        let project_outcome = ProjectOutcome {
          success: true,
          file_count: outcome.files_indexed,
          vector_count: outcome.vectors_total,
          commit_hash: outcome.commit_hash.clone(),
          error: None,
        };
        if let Err(e) = self.reconciler.reconcile_project(project_id, &project_outcome).await {
          error!(project_id = %project_id, error = %e, "Reconciliation failed after success");
        }
        self.queue.finish(true);

        final_job.status = JobStatus::Completed;
        final_job.total_files = outcome.files_indexed;
        final_job.processed_files = outcome.files_indexed;
        final_job.progress = 100;
        final_job.vectors_added = outcome.vectors_added;
        final_job.vectors_updated = outcome.vectors_updated;
        final_job.vectors_deleted = outcome.vectors_deleted;
        final_job.commit_hash = outcome.commit_hash;
        if let Err(e) = self.store.update_job(&final_job).await {
          warn!(job_id = %final_job.id, error = %e, "Failed to write completed job");
        }

        info!(
          worker_id,
          project_id = %project_id,
          job_id = %final_job.id,
          files = outcome.files_indexed,
          vectors_added = outcome.vectors_added,
          "Indexing run completed"
        );
      }

      Err(PipelineError::Cancelled) => {
        // Cancellation is not a failure: the project goes back to Idle and
        // keeps its place in the schedule.
        if let Ok(mut project) = self.store.project(project_id).await
          && project.index_status == IndexStatus::Indexing
        {
          project.index_status = IndexStatus::Idle;
          let _ = self.store.upsert_project(project).await;
        }
        if let Err(e) = self.reconciler.advance_project_schedule(project_id).await {
          warn!(project_id = %project_id, error = %e, "Failed to advance schedule after cancel");
        }
        self.queue.finish(false);

        final_job.status = JobStatus::Cancelled;
        if let Err(e) = self.store.update_job(&final_job).await {
          warn!(job_id = %final_job.id, error = %e, "Failed to write cancelled job");
        }

        info!(worker_id, project_id = %project_id, job_id = %final_job.id, "Indexing run cancelled");
      }

      Err(e) => {
        let project_outcome = ProjectOutcome {
          success: false,
          error: Some(e.to_string()),
          ..ProjectOutcome::default()
        };
        if let Err(rec_err) = self.reconciler.reconcile_project(project_id, &project_outcome).await {
          error!(project_id = %project_id, error = %rec_err, "Reconciliation failed after failure");
        }
        self.queue.finish(false);

        final_job.status = JobStatus::Failed;
        final_job.error_message = Some(e.to_string());
        if let Err(write_err) = self.store.update_job(&final_job).await {
          warn!(job_id = %final_job.id, error = %write_err, "Failed to write failed job");
        }

        warn!(worker_id, project_id = %project_id, job_id = %final_job.id, error = %e, "Indexing run failed");
      }
    }
  }

  /// Spawn a task that applies pipeline progress updates to the job record.
  fn spawn_progress_writer(&self, job: &IndexingJob) -> (mpsc::Sender<IndexProgress>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<IndexProgress>(32);
    let store = Arc::clone(&self.store);
    let snapshot = job.clone();

    let handle = tokio::spawn(async move {
      while let Some(update) = rx.recv().await {
        let mut job = snapshot.clone();
        job.total_files = update.total;
        job.processed_files = update.processed;
        job.progress = update.percent();
        if store.update_job(&job).await.is_err() {
          // Job reached a terminal state underneath us; stop reporting
          break;
        }
      }
    });

    (tx, handle)
  }

  // ==========================================================================
  // Documentation repositories
  // ==========================================================================

  async fn handle_doc_entry(&self, worker_id: usize, repo_id: &DocRepoId) {
    let repo = match self.store.doc_repository(repo_id).await {
      Ok(repo) => repo,
      Err(e) => {
        warn!(worker_id, repo_id = %repo_id, error = %e, "Dequeued entry references missing doc repository");
        self.queue.finish_skipped();
        return;
      }
    };

    info!(worker_id, repo_id = %repo_id, source_type = ?repo.source_type, "Documentation run started");
    let started = Instant::now();

    let source = SourceRef::from_doc_repository(&repo);
    let collection = ProjectId::from(format!("docs:{}", repo.id));
    let result = self.pipeline.run(&collection, &source, false, None, &self.cancel).await;
    let duration_secs = started.elapsed().as_secs();

    match result {
      Ok(outcome) => {
        let doc_outcome = DocOutcome {
          success: true,
          total_documents: outcome.files_indexed,
          commit_hash: outcome.commit_hash,
          duration_secs,
          error: None,
        };
        if let Err(e) = self.reconciler.reconcile_doc_repository(repo_id, &doc_outcome).await {
          error!(repo_id = %repo_id, error = %e, "Doc reconciliation failed after success");
        }
        info!(worker_id, repo_id = %repo_id, documents = doc_outcome.total_documents, "Documentation run completed");
        self.queue.finish(true);
      }
      Err(PipelineError::Cancelled) => {
        if let Err(e) = self.reconciler.advance_doc_schedule(repo_id).await {
          warn!(repo_id = %repo_id, error = %e, "Failed to advance doc schedule after cancel");
        }
        self.queue.finish(false);
      }
      Err(e) => {
        let doc_outcome = DocOutcome {
          success: false,
          duration_secs,
          error: Some(e.to_string()),
          ..DocOutcome::default()
        };
        if let Err(rec_err) = self.reconciler.reconcile_doc_repository(repo_id, &doc_outcome).await {
          error!(repo_id = %repo_id, error = %rec_err, "Doc reconciliation failed after failure");
        }
        warn!(worker_id, repo_id = %repo_id, error = %e, "Documentation run failed");
        self.queue.finish(false);
      }
    }
  }
}

//! Priority work queue decoupling trigger adapters from the worker pool.
//!
//! Higher-priority entries dequeue first; entries of equal priority keep
//! FIFO order (monotonic sequence number). Durability rides on the job
//! records behind each entry: `restore_pending` re-enqueues every Pending
//! job from the store, which both survives producer restarts and heals
//! jobs orphaned by an enqueue failure.

use std::{
  collections::BinaryHeap,
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  domain::{DocRepoId, JobId, ProjectId, Trigger},
  store::{RecordStore, StoreError},
};

// ============================================================================
// Entries
// ============================================================================

/// Priority tiers: operator-initiated work preempts webhooks, webhooks
/// preempt background sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
  Scheduled,
  Webhook,
  Interactive,
}

impl Priority {
  /// Default tier for a trigger source.
  pub fn for_trigger(trigger: Trigger) -> Self {
    match trigger {
      Trigger::Manual | Trigger::Api => Priority::Interactive,
      Trigger::Webhook => Priority::Webhook,
      Trigger::Scheduled => Priority::Scheduled,
    }
  }
}

/// What a queue entry points the worker at.
#[derive(Debug, Clone)]
pub enum IndexTarget {
  /// A project indexing job (the job record already exists, Pending)
  Project {
    project_id: ProjectId,
    job_id: JobId,
    branch: String,
    full_reindex: bool,
    triggered_by: Trigger,
  },
  /// A documentation source reindex
  DocRepository { repo_id: DocRepoId },
}

#[derive(Debug, Clone)]
pub struct QueueEntry {
  pub target: IndexTarget,
  pub priority: Priority,
}

impl QueueEntry {
  pub fn job_id(&self) -> Option<&JobId> {
    match &self.target {
      IndexTarget::Project { job_id, .. } => Some(job_id),
      IndexTarget::DocRepository { .. } => None,
    }
  }

  pub fn project_id(&self) -> Option<&ProjectId> {
    match &self.target {
      IndexTarget::Project { project_id, .. } => Some(project_id),
      IndexTarget::DocRepository { .. } => None,
    }
  }
}

// ============================================================================
// Queue
// ============================================================================

/// Errors from queue operations
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
  #[error("Queue is closed")]
  Closed,
  #[error("Store error while restoring queue: {0}")]
  Store(#[from] StoreError),
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
  pub pending: usize,
  pub active: usize,
  pub completed: usize,
  pub failed: usize,
}

struct Prioritized {
  priority: Priority,
  seq: u64,
  entry: QueueEntry,
}

impl PartialEq for Prioritized {
  fn eq(&self, other: &Self) -> bool {
    self.priority == other.priority && self.seq == other.seq
  }
}
impl Eq for Prioritized {}

impl PartialOrd for Prioritized {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Prioritized {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    // Max-heap: higher priority first, then lower sequence (FIFO)
    self
      .priority
      .cmp(&other.priority)
      .then_with(|| other.seq.cmp(&self.seq))
  }
}

struct QueueInner {
  heap: BinaryHeap<Prioritized>,
  seq: u64,
  closed: bool,
}

/// Priority-ordered work queue with blocking dequeue.
pub struct IndexQueue {
  inner: Mutex<QueueInner>,
  notify: Notify,
  pending_warn_threshold: usize,

  active: AtomicUsize,
  completed: AtomicUsize,
  failed: AtomicUsize,
}

impl IndexQueue {
  pub fn new(pending_warn_threshold: usize) -> Self {
    Self {
      inner: Mutex::new(QueueInner {
        heap: BinaryHeap::new(),
        seq: 0,
        closed: false,
      }),
      notify: Notify::new(),
      pending_warn_threshold,
      active: AtomicUsize::new(0),
      completed: AtomicUsize::new(0),
      failed: AtomicUsize::new(0),
    }
  }

  /// Add an entry at the given priority.
  pub fn enqueue(&self, target: IndexTarget, priority: Priority) -> Result<(), QueueError> {
    let depth = {
      let mut inner = self.inner.lock().expect("queue lock poisoned");
      if inner.closed {
        return Err(QueueError::Closed);
      }
      let seq = inner.seq;
      inner.seq += 1;
      inner.heap.push(Prioritized {
        priority,
        seq,
        entry: QueueEntry { target, priority },
      });
      inner.heap.len()
    };

    if depth >= self.pending_warn_threshold {
      warn!(depth, "Queue depth above warning threshold");
    }

    self.notify.notify_one();
    Ok(())
  }

  /// Remove and return the highest-priority entry, blocking until one is
  /// available. Returns `None` when `cancel` fires or the queue closes.
  pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<QueueEntry> {
    loop {
      match self.try_dequeue() {
        Ok(Some(entry)) => return Some(entry),
        Ok(None) => {}
        Err(QueueError::Closed) => return None,
        Err(_) => return None,
      }

      tokio::select! {
        biased;

        _ = cancel.cancelled() => return None,
        _ = self.notify.notified() => {}
      }
    }
  }

  fn try_dequeue(&self) -> Result<Option<QueueEntry>, QueueError> {
    let mut inner = self.inner.lock().expect("queue lock poisoned");
    if let Some(item) = inner.heap.pop() {
      // Wake another waiter if work remains - notify_one stores at most
      // one permit, so bursts of enqueues can otherwise strand workers.
      if !inner.heap.is_empty() {
        self.notify.notify_one();
      }
      self.active.fetch_add(1, Ordering::Relaxed);
      return Ok(Some(item.entry));
    }
    if inner.closed {
      return Err(QueueError::Closed);
    }
    Ok(None)
  }

  /// Record the outcome of a dequeued entry.
  pub fn finish(&self, success: bool) {
    self.active.fetch_sub(1, Ordering::Relaxed);
    if success {
      self.completed.fetch_add(1, Ordering::Relaxed);
    } else {
      self.failed.fetch_add(1, Ordering::Relaxed);
    }
  }

  /// Record a dequeued entry that was dropped without running (stale or
  /// cancelled-while-queued). Counts as neither completed nor failed.
  pub fn finish_skipped(&self) {
    self.active.fetch_sub(1, Ordering::Relaxed);
  }

  /// Remove all queued entries for a project, returning the job ids of the
  /// removed entries. In-flight jobs are unaffected (cancellation of those
  /// is cooperative, handled by the worker pool).
  pub fn cancel_for_project(&self, project_id: &ProjectId) -> Vec<JobId> {
    let mut inner = self.inner.lock().expect("queue lock poisoned");
    let mut removed = Vec::new();
    let retained: BinaryHeap<Prioritized> = inner
      .heap
      .drain()
      .filter(|item| {
        if item.entry.project_id() == Some(project_id) {
          if let Some(job_id) = item.entry.job_id() {
            removed.push(job_id.clone());
          }
          false
        } else {
          true
        }
      })
      .collect();
    inner.heap = retained;

    if !removed.is_empty() {
      info!(project_id = %project_id, count = removed.len(), "Removed queued entries for project");
    }
    removed
  }

  /// Re-enqueue every Pending job from the store that is not already
  /// queued. Run at daemon startup so enqueued-but-undequeued work survives
  /// a restart and jobs orphaned by an enqueue failure get picked up.
  pub async fn restore_pending(&self, store: &dyn RecordStore) -> Result<usize, QueueError> {
    let pending = store.pending_jobs().await?;

    let mut restored = 0;
    for job in pending {
      let already_queued = {
        let inner = self.inner.lock().expect("queue lock poisoned");
        inner.heap.iter().any(|item| item.entry.job_id() == Some(&job.id))
      };
      if already_queued {
        continue;
      }

      debug!(job_id = %job.id, project_id = %job.project_id, "Restoring pending job to queue");
      self.enqueue(
        IndexTarget::Project {
          project_id: job.project_id.clone(),
          job_id: job.id.clone(),
          branch: job.branch.clone(),
          full_reindex: job.full_reindex,
          triggered_by: job.triggered_by,
        },
        Priority::for_trigger(job.triggered_by),
      )?;
      restored += 1;
    }

    if restored > 0 {
      info!(restored, "Restored pending jobs into the queue");
    }
    Ok(restored)
  }

  /// Stop accepting entries and wake all waiting workers.
  pub fn close(&self) {
    let mut inner = self.inner.lock().expect("queue lock poisoned");
    inner.closed = true;
    drop(inner);
    self.notify.notify_waiters();
  }

  pub fn stats(&self) -> QueueStats {
    let pending = self.inner.lock().expect("queue lock poisoned").heap.len();
    QueueStats {
      pending,
      active: self.active.load(Ordering::Relaxed),
      completed: self.completed.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
    }
  }
}

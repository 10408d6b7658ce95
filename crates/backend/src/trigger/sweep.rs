//! Scheduled sweep - the time-based trigger adapter.
//!
//! A sweep is one pass over everything due: projects with scheduled
//! indexing enabled and documentation repositories with auto-reindex
//! enabled. Targets are processed sequentially to bound concurrent git
//! clones and embedding load; the worker pool provides the concurrency.
//!
//! One target's failure is caught into its result and never aborts the
//! sweep, and every processed target gets its next run time advanced -
//! a failing target must not fall out of the schedule.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{TriggerError, create_and_enqueue};
use crate::{
  detect::{ChangeDetector, SourceRef},
  domain::{DocumentationRepository, Project, Trigger},
  queue::{IndexQueue, IndexTarget, Priority},
  reconcile::StatusReconciler,
  store::RecordStore,
};

/// What the sweep did with one due target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepAction {
  Queued,
  Skipped,
  Failed,
}

/// Per-target sweep result.
#[derive(Debug, Clone, Serialize)]
pub struct SweepTargetResult {
  pub target: String,
  pub success: bool,
  pub action: SweepAction,
  pub message: String,
}

/// Aggregate report for one sweep invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
  pub projects_processed: usize,
  pub results: Vec<SweepTargetResult>,
}

/// Due targets listing for monitoring (no side effects).
#[derive(Debug, Clone, Serialize)]
pub struct DueTargets {
  pub projects: Vec<Project>,
  pub doc_repositories: Vec<DocumentationRepository>,
}

pub struct ScheduledSweep {
  store: Arc<dyn RecordStore>,
  queue: Arc<IndexQueue>,
  detector: Arc<dyn ChangeDetector>,
  reconciler: Arc<StatusReconciler>,
}

impl ScheduledSweep {
  pub fn new(
    store: Arc<dyn RecordStore>,
    queue: Arc<IndexQueue>,
    detector: Arc<dyn ChangeDetector>,
    reconciler: Arc<StatusReconciler>,
  ) -> Self {
    Self {
      store,
      queue,
      detector,
      reconciler,
    }
  }

  /// List everything currently due, with no side effects.
  pub async fn due_targets(&self) -> DueTargets {
    let now = Utc::now();
    let projects = self.store.due_projects(now).await.unwrap_or_else(|e| {
      warn!(error = %e, "Failed to query due projects");
      Vec::new()
    });
    let doc_repositories = self.store.due_doc_repositories(now).await.unwrap_or_else(|e| {
      warn!(error = %e, "Failed to query due documentation repositories");
      Vec::new()
    });
    DueTargets {
      projects,
      doc_repositories,
    }
  }

  /// Run one sweep over all due targets.
  pub async fn run(&self) -> SweepReport {
    let due = self.due_targets().await;
    info!(
      projects = due.projects.len(),
      doc_repositories = due.doc_repositories.len(),
      "Scheduled sweep starting"
    );

    let mut results = Vec::with_capacity(due.projects.len() + due.doc_repositories.len());

    // Sequential on purpose - see module docs
    for project in &due.projects {
      let result = self.process_project(project).await;
      if let Err(e) = self.reconciler.advance_project_schedule(&project.id).await {
        warn!(project_id = %project.id, error = %e, "Failed to advance project schedule");
      }
      results.push(result);
    }

    for repo in &due.doc_repositories {
      let result = self.process_doc_repository(repo).await;
      if let Err(e) = self.reconciler.advance_doc_schedule(&repo.id).await {
        warn!(repo_id = %repo.id, error = %e, "Failed to advance documentation schedule");
      }
      results.push(result);
    }

    let report = SweepReport {
      projects_processed: results.len(),
      results,
    };
    info!(
      processed = report.projects_processed,
      queued = report.results.iter().filter(|r| r.action == SweepAction::Queued).count(),
      failed = report.results.iter().filter(|r| r.action == SweepAction::Failed).count(),
      "Scheduled sweep complete"
    );
    report
  }

  async fn process_project(&self, project: &Project) -> SweepTargetResult {
    let target = format!("project:{}", project.id);
    let decision = self.detector.needs_reindexing(&SourceRef::from_project(project)).await;

    if !decision.needs_reindexing {
      return SweepTargetResult {
        target,
        success: true,
        action: SweepAction::Skipped,
        message: decision.reason,
      };
    }

    match create_and_enqueue(
      self.store.as_ref(),
      &self.queue,
      project,
      project.default_branch().to_string(),
      false,
      Trigger::Scheduled,
    )
    .await
    {
      Ok(job) => SweepTargetResult {
        target,
        success: true,
        action: SweepAction::Queued,
        message: format!("queued job {}: {}", job.id, decision.reason),
      },
      Err(TriggerError::AlreadyIndexing(_)) => SweepTargetResult {
        target,
        success: true,
        action: SweepAction::Skipped,
        message: "already indexing".to_string(),
      },
      Err(e) => {
        warn!(project_id = %project.id, error = %e, "Sweep failed to queue project");
        SweepTargetResult {
          target,
          success: false,
          action: SweepAction::Failed,
          message: e.to_string(),
        }
      }
    }
  }

  async fn process_doc_repository(&self, repo: &DocumentationRepository) -> SweepTargetResult {
    let target = format!("docs:{}", repo.id);
    let decision = self
      .detector
      .needs_reindexing(&SourceRef::from_doc_repository(repo))
      .await;

    if !decision.needs_reindexing {
      return SweepTargetResult {
        target,
        success: true,
        action: SweepAction::Skipped,
        message: decision.reason,
      };
    }

    match self
      .queue
      .enqueue(IndexTarget::DocRepository { repo_id: repo.id.clone() }, Priority::Scheduled)
    {
      Ok(()) => SweepTargetResult {
        target,
        success: true,
        action: SweepAction::Queued,
        message: decision.reason,
      },
      Err(e) => {
        warn!(repo_id = %repo.id, error = %e, "Sweep failed to queue documentation repository");
        SweepTargetResult {
          target,
          success: false,
          action: SweepAction::Failed,
          message: e.to_string(),
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use async_trait::async_trait;
  use pretty_assertions::assert_eq;

  use super::*;
  use crate::{
    detect::ChangeDecision,
    domain::{ProjectId, SourceType},
    store::MemoryStore,
  };

  /// Detector returning a fixed decision.
  struct StaticDetector {
    needs_reindexing: bool,
    reason: &'static str,
  }

  #[async_trait]
  impl ChangeDetector for StaticDetector {
    async fn needs_reindexing(&self, _source: &SourceRef) -> ChangeDecision {
      if self.needs_reindexing {
        ChangeDecision::reindex(Some("feedface0000".to_string()), self.reason)
      } else {
        ChangeDecision::skip(self.reason)
      }
    }
  }

  fn sweep_with(detector: StaticDetector) -> (Arc<MemoryStore>, Arc<IndexQueue>, ScheduledSweep) {
    let store = Arc::new(MemoryStore::new());
    let queue = Arc::new(IndexQueue::new(256));
    let reconciler = Arc::new(StatusReconciler::new(store.clone()));
    let sweep = ScheduledSweep::new(store.clone(), queue.clone(), Arc::new(detector), reconciler);
    (store, queue, sweep)
  }

  fn due_project(id: &str) -> Project {
    let mut project = Project::new(id, "https://example.com/repo.git");
    project.scheduled_indexing_enabled = true;
    project.scheduled_indexing_interval_days = 1;
    project.scheduled_indexing_next_run = Some(Utc::now() - chrono::Duration::hours(1));
    project
  }

  #[tokio::test]
  async fn test_sweep_queues_changed_projects() {
    let (store, queue, sweep) = sweep_with(StaticDetector {
      needs_reindexing: true,
      reason: "new commits available: 1111111 -> 2222222",
    });
    store.upsert_project(due_project("p1")).await.unwrap();

    let report = sweep.run().await;
    assert_eq!(report.projects_processed, 1);
    assert_eq!(report.results[0].action, SweepAction::Queued);
    assert!(report.results[0].success);
    assert_eq!(queue.stats().pending, 1);
  }

  #[tokio::test]
  async fn test_sweep_skip_still_advances_schedule() {
    let (store, queue, sweep) = sweep_with(StaticDetector {
      needs_reindexing: false,
      reason: "up to date",
    });
    store.upsert_project(due_project("p1")).await.unwrap();

    let report = sweep.run().await;
    assert_eq!(report.results[0].action, SweepAction::Skipped);
    assert_eq!(report.results[0].message, "up to date");
    assert_eq!(queue.stats().pending, 0);

    let project = store.project(&ProjectId::from("p1")).await.unwrap();
    assert!(
      project.scheduled_indexing_next_run.unwrap() > Utc::now(),
      "schedule advanced even without a reindex"
    );
  }

  #[tokio::test]
  async fn test_sweep_includes_doc_repositories() {
    let (store, queue, sweep) = sweep_with(StaticDetector {
      needs_reindexing: true,
      reason: "crawled source due for reindex",
    });

    let mut repo = DocumentationRepository::new("d1", "https://docs.example.com/llms.txt", SourceType::LlmsTxt);
    repo.auto_reindex_enabled = true;
    repo.next_reindex_at = Some(Utc::now() - chrono::Duration::hours(1));
    store.upsert_doc_repository(repo).await.unwrap();

    let report = sweep.run().await;
    assert_eq!(report.projects_processed, 1);
    assert_eq!(report.results[0].target, "docs:d1");
    assert_eq!(report.results[0].action, SweepAction::Queued);
    assert_eq!(queue.stats().pending, 1);
  }

  #[tokio::test]
  async fn test_due_targets_has_no_side_effects() {
    let (store, _queue, sweep) = sweep_with(StaticDetector {
      needs_reindexing: true,
      reason: "never indexed",
    });
    store.upsert_project(due_project("p1")).await.unwrap();

    let before = store
      .project(&ProjectId::from("p1"))
      .await
      .unwrap()
      .scheduled_indexing_next_run;

    let due = sweep.due_targets().await;
    assert_eq!(due.projects.len(), 1);

    let after = store
      .project(&ProjectId::from("p1"))
      .await
      .unwrap()
      .scheduled_indexing_next_run;
    assert_eq!(before, after, "listing must not mutate schedules");
  }
}

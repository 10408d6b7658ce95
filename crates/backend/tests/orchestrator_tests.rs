//! End-to-end orchestration tests: trigger → queue → worker → reconciler.

mod common;

use common::{MockFetcher, StaticDetector, build_orchestrator, memory_store, wait_for_running, wait_for_terminal};
use lodestone::{
  domain::{IndexStatus, JobStatus, Project, ProjectId, Trigger},
  store::{RecordStore, StoreError},
  trigger::IndexRequest,
};

#[tokio::test]
async fn test_manual_trigger_end_to_end() {
  let store = memory_store();
  let (orchestrator, _cancel) = build_orchestrator(store.clone(), StaticDetector::changed(), MockFetcher::with_files(10));

  store
    .upsert_project(Project::new("p1", "https://example.com/repo.git"))
    .await
    .unwrap();
  assert_eq!(
    store.project(&ProjectId::from("p1")).await.unwrap().index_status,
    IndexStatus::Idle
  );

  orchestrator.start().await.unwrap();

  let job = orchestrator
    .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
    .await
    .expect("trigger");
  assert_eq!(job.status, JobStatus::Pending);
  assert_eq!(job.triggered_by, Trigger::Manual);

  let finished = wait_for_terminal(&store, &job.id).await;
  assert_eq!(finished.status, JobStatus::Completed);
  assert_eq!(finished.processed_files, 10);
  assert_eq!(finished.total_files, 10);
  assert_eq!(finished.progress, 100);
  assert_eq!(finished.commit_hash.as_deref(), Some("2222222eeeee"));
  assert!(finished.vectors_added > 0);
  assert!(finished.started_at.is_some());
  assert!(finished.completed_at.is_some());

  let project = store.project(&ProjectId::from("p1")).await.unwrap();
  assert_eq!(project.index_status, IndexStatus::Completed);
  assert_eq!(project.file_count, 10);
  assert!(project.vector_count > 0);
  assert_eq!(project.last_indexed_commit.as_deref(), Some("2222222eeeee"));
  assert!(project.last_indexed_at.is_some());

  let stats = orchestrator.queue_stats();
  assert_eq!(stats.completed, 1);
  assert_eq!(stats.active, 0);

  orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_project_is_indexing_while_job_runs() {
  let store = memory_store();
  let (fetcher, gate) = MockFetcher::with_files(3).gated();
  let (orchestrator, _cancel) = build_orchestrator(store.clone(), StaticDetector::changed(), fetcher);

  store
    .upsert_project(Project::new("p1", "https://example.com/repo.git"))
    .await
    .unwrap();
  orchestrator.start().await.unwrap();

  let job = orchestrator
    .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
    .await
    .unwrap();

  // Worker claims the job, then blocks inside fetch
  wait_for_running(&store, &job.id).await;
  let project = store.project(&ProjectId::from("p1")).await.unwrap();
  assert_eq!(project.index_status, IndexStatus::Indexing);

  // While running, another trigger must be rejected
  let err = orchestrator
    .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
    .await
    .unwrap_err();
  assert!(matches!(err, lodestone::trigger::TriggerError::AlreadyIndexing(_)));

  gate.add_permits(1);
  let finished = wait_for_terminal(&store, &job.id).await;
  assert_eq!(finished.status, JobStatus::Completed);

  orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_pipeline_failure_marks_job_and_project() {
  let store = memory_store();
  let (orchestrator, _cancel) = build_orchestrator(store.clone(), StaticDetector::changed(), MockFetcher::failing());

  store
    .upsert_project(Project::new("p1", "https://example.com/repo.git"))
    .await
    .unwrap();
  orchestrator.start().await.unwrap();

  let job = orchestrator
    .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
    .await
    .unwrap();

  let finished = wait_for_terminal(&store, &job.id).await;
  assert_eq!(finished.status, JobStatus::Failed);
  assert!(finished.error_message.as_deref().unwrap().contains("mock fetch failure"));

  let project = store.project(&ProjectId::from("p1")).await.unwrap();
  assert_eq!(project.index_status, IndexStatus::Error);
  assert!(project.last_error.is_some());

  // The failure frees the slot - a retry is accepted
  orchestrator
    .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
    .await
    .expect("slot freed after failure");

  orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_cancel_running_job() {
  let store = memory_store();
  let (fetcher, gate) = MockFetcher::with_files(5).gated();
  let (orchestrator, _cancel) = build_orchestrator(store.clone(), StaticDetector::changed(), fetcher);

  store
    .upsert_project(Project::new("p1", "https://example.com/repo.git"))
    .await
    .unwrap();
  orchestrator.start().await.unwrap();

  let job = orchestrator
    .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
    .await
    .unwrap();
  wait_for_running(&store, &job.id).await;

  let cancelled = orchestrator.stop_indexing(&ProjectId::from("p1")).await.unwrap();
  assert_eq!(cancelled, Some(job.id.clone()));

  // Unblock the fetch so the pipeline can observe the token
  gate.add_permits(1);

  let finished = wait_for_terminal(&store, &job.id).await;
  assert_eq!(finished.status, JobStatus::Cancelled);

  let project = store.project(&ProjectId::from("p1")).await.unwrap();
  assert_eq!(project.index_status, IndexStatus::Idle, "cancellation is not an error");

  orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_terminal_job_rejects_further_writes() {
  let store = memory_store();
  let (orchestrator, _cancel) = build_orchestrator(store.clone(), StaticDetector::changed(), MockFetcher::with_files(2));

  store
    .upsert_project(Project::new("p1", "https://example.com/repo.git"))
    .await
    .unwrap();
  orchestrator.start().await.unwrap();

  let job = orchestrator
    .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
    .await
    .unwrap();
  let mut finished = wait_for_terminal(&store, &job.id).await;
  assert_eq!(finished.status, JobStatus::Completed);

  finished.error_message = Some("tampered".to_string());
  let err = store.update_job(&finished).await.unwrap_err();
  assert!(matches!(err, StoreError::TerminalJob(_)));

  orchestrator.shutdown().await;
}

#[tokio::test]
async fn test_at_most_one_active_job_across_concurrent_triggers() {
  let store = memory_store();
  let (orchestrator, _cancel) = build_orchestrator(store.clone(), StaticDetector::changed(), MockFetcher::with_files(1));

  store
    .upsert_project(Project::new("p1", "https://example.com/repo.git"))
    .await
    .unwrap();

  // Pool intentionally not started: jobs stay Pending while triggers race
  let mut winners = 0;
  for _ in 0..8 {
    if orchestrator
      .start_indexing(&ProjectId::from("p1"), IndexRequest::default())
      .await
      .is_ok()
    {
      winners += 1;
    }
  }
  assert_eq!(winners, 1);

  let active: Vec<_> = store
    .jobs_for_project(&ProjectId::from("p1"))
    .await
    .unwrap()
    .into_iter()
    .filter(|j| j.status.is_active())
    .collect();
  assert_eq!(active.len(), 1, "invariant: at most one Pending/Running job per project");
}

//! Common test utilities for backend integration tests
//!
//! These tests verify end-to-end orchestration over the in-memory store
//! with mock collaborators - no network, no git binary, no embedding
//! server required.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use lodestone::{
  Collaborators, Orchestrator,
  detect::{ChangeDecision, ChangeDetector, SourceRef},
  domain::{IndexingJob, JobId, JobStatus},
  embedding::{EmbeddingError, EmbeddingProvider},
  parse::PlainChunker,
  source::{FetchError, FetchedSource, SourceFetcher, SourceFile},
  store::{MemoryStore, RecordStore},
  vector::MemoryVectorStore,
};
use lodestone_core::Config;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Change detector returning a fixed decision.
pub struct StaticDetector {
  pub needs_reindexing: bool,
  pub reason: String,
}

#[allow(dead_code)]
impl StaticDetector {
  pub fn changed() -> Self {
    Self {
      needs_reindexing: true,
      reason: "new commits available: 1111111 -> 2222222".to_string(),
    }
  }

  pub fn unchanged() -> Self {
    Self {
      needs_reindexing: false,
      reason: "up to date".to_string(),
    }
  }
}

#[async_trait]
impl ChangeDetector for StaticDetector {
  async fn needs_reindexing(&self, _source: &SourceRef) -> ChangeDecision {
    if self.needs_reindexing {
      ChangeDecision::reindex(Some("2222222eeeee".to_string()), self.reason.clone())
    } else {
      ChangeDecision::skip(self.reason.clone())
    }
  }
}

/// Source fetcher serving a fixed file set, optionally gated so tests can
/// observe the engine mid-run.
pub struct MockFetcher {
  files: Vec<(String, String)>,
  commit: Option<String>,
  gate: Option<Arc<Semaphore>>,
  fail: bool,
}

#[allow(dead_code)]
impl MockFetcher {
  pub fn with_files(count: usize) -> Self {
    let files = (0..count)
      .map(|i| (format!("src/file_{i}.rs"), format!("pub fn f{i}() {{}}")))
      .collect();
    Self {
      files,
      commit: Some("2222222eeeee".to_string()),
      gate: None,
      fail: false,
    }
  }

  pub fn failing() -> Self {
    Self {
      files: Vec::new(),
      commit: None,
      gate: None,
      fail: true,
    }
  }

  /// Block `fetch` until a permit is added to the returned semaphore.
  pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    self.gate = Some(gate.clone());
    (self, gate)
  }
}

#[async_trait]
impl SourceFetcher for MockFetcher {
  async fn fetch(&self, _source: &SourceRef) -> Result<FetchedSource, FetchError> {
    if let Some(gate) = &self.gate {
      let permit = gate.acquire().await.expect("gate closed");
      permit.forget();
    }
    if self.fail {
      return Err(FetchError::Fetcher("mock fetch failure".to_string()));
    }
    Ok(FetchedSource {
      files: self
        .files
        .iter()
        .map(|(relative, content)| SourceFile {
          relative: relative.clone(),
          content: content.clone(),
        })
        .collect(),
      commit_hash: self.commit.clone(),
    })
  }
}

/// Deterministic embedder - no model, fixed dimensions.
pub struct FixedEmbedder;

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
  fn name(&self) -> &str {
    "fixed"
  }
  fn model_id(&self) -> &str {
    "fixed-test"
  }
  fn dimensions(&self) -> usize {
    4
  }
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    Ok(texts.iter().map(|_| vec![0.25; 4]).collect())
  }
}

/// Build an orchestrator over the given store, detector, and fetcher.
#[allow(dead_code)]
pub fn build_orchestrator(
  store: Arc<dyn RecordStore>,
  detector: StaticDetector,
  fetcher: MockFetcher,
) -> (Arc<Orchestrator>, CancellationToken) {
  let config = Config::default();
  let cancel = CancellationToken::new();
  let collaborators = Collaborators {
    store,
    detector: Arc::new(detector),
    fetcher: Arc::new(fetcher),
    parser: Arc::new(PlainChunker::new(60, 2000)),
    embedding: Arc::new(FixedEmbedder),
    vectors: Arc::new(MemoryVectorStore::new()),
  };
  let orchestrator = Arc::new(Orchestrator::new(config, collaborators, cancel.clone()));
  (orchestrator, cancel)
}

#[allow(dead_code)]
pub fn memory_store() -> Arc<MemoryStore> {
  Arc::new(MemoryStore::new())
}

/// Poll the store until the job satisfies `predicate` (5s deadline).
#[allow(dead_code)]
pub async fn wait_for_job<F>(store: &Arc<MemoryStore>, job_id: &JobId, predicate: F) -> IndexingJob
where
  F: Fn(&IndexingJob) -> bool,
{
  let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
  loop {
    if let Ok(job) = store.job(job_id).await
      && predicate(&job)
    {
      return job;
    }
    if tokio::time::Instant::now() > deadline {
      panic!("timed out waiting for job {job_id} to reach expected state");
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
}

/// Poll until the job reaches any terminal state.
#[allow(dead_code)]
pub async fn wait_for_terminal(store: &Arc<MemoryStore>, job_id: &JobId) -> IndexingJob {
  wait_for_job(store, job_id, |job| job.status.is_terminal()).await
}

/// Poll until the job is Running.
#[allow(dead_code)]
pub async fn wait_for_running(store: &Arc<MemoryStore>, job_id: &JobId) -> IndexingJob {
  wait_for_job(store, job_id, |job| job.status == JobStatus::Running).await
}

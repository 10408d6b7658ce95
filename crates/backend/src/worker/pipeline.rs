//! The indexing pipeline a worker runs for one queue entry.
//!
//! Fetch the source, then per file: parse into chunks, embed, upsert
//! vectors. Progress is reported per file through an optional channel, and
//! cancellation is checked at every file boundary - the pipeline stops
//! cleanly between files, keeping vector writes that already completed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
  detect::SourceRef,
  domain::{IndexingJob, ProjectId},
  embedding::{EmbeddingError, EmbeddingProvider},
  parse::ChunkParser,
  source::{FetchError, SourceFetcher},
  vector::{VectorError, VectorRecord, VectorStore},
};

/// Errors that abort a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
  #[error("Fetch error: {0}")]
  Fetch(#[from] FetchError),
  #[error("Embedding error: {0}")]
  Embedding(#[from] EmbeddingError),
  #[error("Vector store error: {0}")]
  Vector(#[from] VectorError),
  #[error("Cancelled")]
  Cancelled,
}

/// Progress update emitted after each processed file.
#[derive(Debug, Clone, Copy)]
pub struct IndexProgress {
  pub processed: usize,
  pub total: usize,
}

impl IndexProgress {
  pub fn percent(&self) -> u8 {
    IndexingJob::percent(self.processed, self.total)
  }
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
  pub files_indexed: usize,
  pub vectors_added: usize,
  pub vectors_updated: usize,
  pub vectors_deleted: usize,
  /// Total vectors stored for the collection after the run
  pub vectors_total: usize,
  pub commit_hash: Option<String>,
}

/// Executes indexing runs against the injected collaborators.
pub struct IndexingPipeline {
  fetcher: Arc<dyn SourceFetcher>,
  parser: Arc<dyn ChunkParser>,
  embedding: Arc<dyn EmbeddingProvider>,
  vectors: Arc<dyn VectorStore>,
}

impl IndexingPipeline {
  pub fn new(
    fetcher: Arc<dyn SourceFetcher>,
    parser: Arc<dyn ChunkParser>,
    embedding: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
  ) -> Self {
    Self {
      fetcher,
      parser,
      embedding,
      vectors,
    }
  }

  /// Run one indexing pass for `collection`.
  ///
  /// `full_reindex` purges the collection's vectors before indexing;
  /// otherwise chunks upsert over their stable ids (`path:index`).
  pub async fn run(
    &self,
    collection: &ProjectId,
    source: &SourceRef,
    full_reindex: bool,
    progress: Option<mpsc::Sender<IndexProgress>>,
    cancel: &CancellationToken,
  ) -> Result<PipelineOutcome, PipelineError> {
    let fetched = self.fetcher.fetch(source).await?;
    let total = fetched.files.len();
    debug!(collection = %collection, files = total, full_reindex, "Pipeline starting");

    let mut outcome = PipelineOutcome {
      commit_hash: fetched.commit_hash.clone(),
      ..PipelineOutcome::default()
    };

    if full_reindex {
      outcome.vectors_deleted = self.vectors.delete_vectors(collection, None).await?;
    }

    if let Some(tx) = &progress {
      let _ = tx.send(IndexProgress { processed: 0, total }).await;
    }

    for file in &fetched.files {
      // File boundary is the cancellation checkpoint; completed writes stay.
      if cancel.is_cancelled() {
        debug!(collection = %collection, processed = outcome.files_indexed, "Pipeline cancelled at file boundary");
        return Err(PipelineError::Cancelled);
      }

      let chunks = self.parser.parse(&file.content, &file.relative);
      if chunks.is_empty() {
        trace!(file = %file.relative, "No chunks produced, skipping");
        outcome.files_indexed += 1;
        self.report(&progress, outcome.files_indexed, total).await;
        continue;
      }

      let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
      let embeddings = self.embedding.embed_batch(&texts).await?;

      let records: Vec<VectorRecord> = chunks
        .iter()
        .zip(embeddings)
        .enumerate()
        .map(|(index, (chunk, embedding))| VectorRecord {
          id: format!("{}:{}", file.relative, index),
          source: file.relative.clone(),
          content: chunk.content.clone(),
          embedding,
        })
        .collect();

      let report = self.vectors.upsert_vectors(collection, records).await?;
      outcome.vectors_added += report.added;
      outcome.vectors_updated += report.updated;
      outcome.files_indexed += 1;

      self.report(&progress, outcome.files_indexed, total).await;
    }

    outcome.vectors_total = self.vectors.count(collection).await?;

    debug!(
      collection = %collection,
      files = outcome.files_indexed,
      added = outcome.vectors_added,
      updated = outcome.vectors_updated,
      deleted = outcome.vectors_deleted,
      "Pipeline complete"
    );
    Ok(outcome)
  }

  async fn report(&self, progress: &Option<mpsc::Sender<IndexProgress>>, processed: usize, total: usize) {
    if let Some(tx) = progress {
      let _ = tx.send(IndexProgress { processed, total }).await;
    }
  }
}

//! Embedding provider seam.
//!
//! The embedding model is an external collaborator; the pipeline only needs
//! "generate embeddings for these chunks". The HTTP implementation targets
//! an Ollama-style batch endpoint and splits oversized batches itself.

mod http;

use std::sync::Arc;

pub use http::HttpEmbeddingProvider;
use lodestone_core::EmbeddingConfig;

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  fn dimensions(&self) -> usize;

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

impl dyn EmbeddingProvider {
  pub fn from_config(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let provider = HttpEmbeddingProvider::new(config)?;
    Ok(Arc::new(provider))
  }
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Provider error: {0}")]
  Provider(String),
  #[error("Expected {expected} embeddings, provider returned {actual}")]
  CountMismatch { expected: usize, actual: usize },
  #[error("Expected {expected}-dimensional embedding, provider returned {actual}")]
  DimensionMismatch { expected: usize, actual: usize },
}

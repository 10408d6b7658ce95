//! HTTP embedding provider.
//!
//! Posts `{ model, input }` to a configurable batch endpoint and expects
//! `{ embeddings: [[f32]] }` back (the Ollama `/api/embed` shape).

use std::time::Duration;

use async_trait::async_trait;
use lodestone_core::EmbeddingConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{EmbeddingError, EmbeddingProvider};

#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
  client: reqwest::Client,
  endpoint_url: String,
  model: String,
  dimensions: usize,
  max_batch_size: usize,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
  model: &'a str,
  input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
  embeddings: Vec<Vec<f32>>,
}

impl HttpEmbeddingProvider {
  pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.request_timeout_secs))
      .build()?;

    info!(
      endpoint_url = %config.endpoint_url,
      model = %config.model,
      dimensions = config.dimensions,
      max_batch_size = config.max_batch_size,
      "Embedding provider initialized"
    );

    Ok(Self {
      client,
      endpoint_url: config.endpoint_url.clone(),
      model: config.model.clone(),
      dimensions: config.dimensions,
      max_batch_size: config.max_batch_size.max(1),
    })
  }

  async fn embed_single_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    trace!(batch_size = texts.len(), "Requesting embeddings");

    let request = EmbedRequest {
      model: &self.model,
      input: texts,
    };

    let response = self.client.post(&self.endpoint_url).json(&request).send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      return Err(EmbeddingError::Provider(format!("HTTP {}: {}", status, body)));
    }

    let parsed: EmbedResponse = response.json().await?;

    if parsed.embeddings.len() != texts.len() {
      return Err(EmbeddingError::CountMismatch {
        expected: texts.len(),
        actual: parsed.embeddings.len(),
      });
    }

    for embedding in &parsed.embeddings {
      if embedding.len() != self.dimensions {
        return Err(EmbeddingError::DimensionMismatch {
          expected: self.dimensions,
          actual: embedding.len(),
        });
      }
    }

    Ok(parsed.embeddings)
  }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
  fn name(&self) -> &str {
    "http"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    let mut all = Vec::with_capacity(texts.len());
    for batch in texts.chunks(self.max_batch_size) {
      let embeddings = self.embed_single_batch(batch).await?;
      all.extend(embeddings);
    }

    debug!(texts = texts.len(), model = %self.model, "Embedded batch");
    Ok(all)
  }
}

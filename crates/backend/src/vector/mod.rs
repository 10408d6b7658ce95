//! Vector store seam.
//!
//! The similarity index is an external collaborator; the pipeline only
//! needs upsert/delete/count per project. `MemoryVectorStore` is the
//! reference implementation used by the default runtime and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;

use crate::domain::ProjectId;

#[derive(Debug, thiserror::Error)]
pub enum VectorError {
  #[error("Vector store backend error: {0}")]
  Backend(String),
}

/// One embedded chunk ready for storage.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
  /// Stable id, derived from source path + chunk index
  pub id: String,
  /// Source file the chunk came from (relative path or document URL)
  pub source: String,
  pub content: String,
  pub embedding: Vec<f32>,
}

/// Counts from an upsert call.
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertReport {
  pub added: usize,
  pub updated: usize,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
  async fn upsert_vectors(&self, project: &ProjectId, vectors: Vec<VectorRecord>) -> Result<UpsertReport, VectorError>;

  /// Delete vectors for a project. `source = None` deletes everything for
  /// the project; otherwise only vectors from that source. Returns the
  /// number of vectors removed.
  async fn delete_vectors(&self, project: &ProjectId, source: Option<&str>) -> Result<usize, VectorError>;

  async fn count(&self, project: &ProjectId) -> Result<usize, VectorError>;
}

/// In-memory vector store keyed by project.
#[derive(Default)]
pub struct MemoryVectorStore {
  collections: DashMap<ProjectId, DashMap<String, VectorRecord>>,
}

impl MemoryVectorStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
  async fn upsert_vectors(&self, project: &ProjectId, vectors: Vec<VectorRecord>) -> Result<UpsertReport, VectorError> {
    let collection = self.collections.entry(project.clone()).or_default();

    let mut report = UpsertReport::default();
    for vector in vectors {
      if collection.insert(vector.id.clone(), vector).is_some() {
        report.updated += 1;
      } else {
        report.added += 1;
      }
    }
    Ok(report)
  }

  async fn delete_vectors(&self, project: &ProjectId, source: Option<&str>) -> Result<usize, VectorError> {
    match source {
      None => Ok(
        self
          .collections
          .remove(project)
          .map(|(_, collection)| collection.len())
          .unwrap_or(0),
      ),
      Some(source) => {
        let Some(collection) = self.collections.get(project) else {
          return Ok(0);
        };
        let doomed: Vec<String> = collection
          .iter()
          .filter(|entry| entry.value().source == source)
          .map(|entry| entry.key().clone())
          .collect();
        for id in &doomed {
          collection.remove(id);
        }
        Ok(doomed.len())
      }
    }
  }

  async fn count(&self, project: &ProjectId) -> Result<usize, VectorError> {
    Ok(self.collections.get(project).map(|c| c.len()).unwrap_or(0))
  }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use codectx_core::{RankerConfig, SparseVector, VectorDocument};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("collection {0} not found")]
  CollectionNotFound(String),
  #[error("collection {0} already exists")]
  CollectionExists(String),
  #[error("invalid filter expression: {0}")]
  InvalidFilter(String),
  #[error("vector dimension mismatch: expected {expected}, got {got}")]
  DimensionMismatch { expected: usize, got: usize },
  #[error("hybrid search is not supported by this store")]
  HybridUnsupported,
  #[error("storage backend error: {0}")]
  Backend(String),
}

/// Schema captured at collection creation; never mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
  pub dimension: usize,
  pub has_sparse: bool,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
  pub top_k: usize,
  /// Minimum score a hit must reach to be returned.
  pub threshold: f32,
}

#[derive(Debug, Clone)]
pub struct HybridSearchOptions {
  pub top_k: usize,
  pub threshold: f32,
  pub ranker: RankerConfig,
}

#[derive(Debug, Clone)]
pub struct ScoredDocument {
  pub document: VectorDocument,
  pub score: f32,
}

/// One row returned by [`VectorStore::query`], keyed by output field name.
/// All filterable fields are string-typed; numeric columns are rendered.
pub type Row = BTreeMap<String, String>;

/// Abstract vector database.
///
/// The pipeline owns an `Arc<dyn VectorStore>` and never sees a concrete
/// backend. `hybrid_search` is an optional capability: the default
/// implementation reports [`StorageError::HybridUnsupported`], which the
/// query planner treats as the signal to fall back to dense-only search.
#[async_trait]
pub trait VectorStore: Send + Sync {
  async fn create_collection(
    &self,
    name: &str,
    dimension: usize,
    has_sparse: bool,
    description: Option<&str>,
  ) -> Result<(), StorageError>;

  /// Idempotent: dropping a missing collection returns cleanly.
  async fn drop_collection(&self, name: &str) -> Result<(), StorageError>;

  async fn has_collection(&self, name: &str) -> Result<bool, StorageError>;

  async fn describe_collection(&self, name: &str) -> Result<CollectionSchema, StorageError>;

  /// Upsert by document id.
  async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<(), StorageError>;

  async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StorageError>;

  /// Scalar query over string fields. `filter` uses the grammar of
  /// [`crate::Filter`]: equality and list membership only.
  async fn query(&self, name: &str, filter: &str, output_fields: &[&str]) -> Result<Vec<Row>, StorageError>;

  async fn search(&self, name: &str, vector: &[f32], options: SearchOptions)
  -> Result<Vec<ScoredDocument>, StorageError>;

  async fn hybrid_search(
    &self,
    name: &str,
    dense: &[f32],
    sparse: &SparseVector,
    options: HybridSearchOptions,
  ) -> Result<Vec<ScoredDocument>, StorageError> {
    let _ = (name, dense, sparse, options);
    Err(StorageError::HybridUnsupported)
  }
}

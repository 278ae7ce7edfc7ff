//! Shared fixtures for pipeline and search integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use codectx_core::SparseVector;
use embedding::{Embedder, EmbeddingError};
use store::{
  CollectionSchema, HybridSearchOptions, MemoryStore, Row, ScoredDocument, SearchOptions, StorageError, VectorStore,
};

pub const DIM: usize = 26;

/// Deterministic embedding: one bucket per leading letter, L2-normalized.
///
/// Texts sharing no leading letters are orthogonal, identical texts map to
/// identical vectors, so similarity in tests is fully controlled by word
/// choice.
pub fn mock_vector(text: &str) -> Vec<f32> {
  let mut vector = vec![0.0f32; DIM];
  for token in text.split(|c: char| !c.is_ascii_alphanumeric()) {
    let Some(first) = token.chars().next() else {
      continue;
    };
    let first = first.to_ascii_lowercase();
    if first.is_ascii_lowercase() {
      vector[(first as u8 - b'a') as usize] += 1.0;
    } else if first.is_ascii_digit() {
      vector[(first as u8 - b'0') as usize] += 1.0;
    }
  }
  let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if norm > 0.0 {
    for x in &mut vector {
      *x /= norm;
    }
  } else {
    vector[DIM - 1] = 1.0;
  }
  vector
}

/// Mock embedder with per-batch failure injection and call counting.
#[derive(Default)]
pub struct MockEmbedder {
  pub batch_calls: AtomicUsize,
  /// Fail this many batch calls before succeeding.
  pub fail_first_batches: AtomicUsize,
}

impl MockEmbedder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn failing_first(batches: usize) -> Self {
    Self {
      batch_calls: AtomicUsize::new(0),
      fail_first_batches: AtomicUsize::new(batches),
    }
  }
}

#[async_trait]
impl Embedder for MockEmbedder {
  fn name(&self) -> &str {
    "mock"
  }

  fn model_id(&self) -> &str {
    "mock-model"
  }

  fn dimension(&self) -> usize {
    DIM
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    Ok(mock_vector(text))
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    self.batch_calls.fetch_add(1, Ordering::SeqCst);
    let remaining = self.fail_first_batches.load(Ordering::SeqCst);
    if remaining > 0 {
      self.fail_first_batches.store(remaining - 1, Ordering::SeqCst);
      return Err(EmbeddingError::Provider("injected batch failure".to_string()));
    }
    Ok(texts.iter().map(|text| mock_vector(text)).collect())
  }
}

/// Store wrapper whose hybrid search always refuses, for fallback tests.
pub struct HybridRefusingStore {
  pub inner: MemoryStore,
}

impl HybridRefusingStore {
  pub fn new() -> Self {
    Self {
      inner: MemoryStore::new(),
    }
  }
}

#[async_trait]
impl VectorStore for HybridRefusingStore {
  async fn create_collection(
    &self,
    name: &str,
    dimension: usize,
    has_sparse: bool,
    description: Option<&str>,
  ) -> Result<(), StorageError> {
    self.inner.create_collection(name, dimension, has_sparse, description).await
  }

  async fn drop_collection(&self, name: &str) -> Result<(), StorageError> {
    self.inner.drop_collection(name).await
  }

  async fn has_collection(&self, name: &str) -> Result<bool, StorageError> {
    self.inner.has_collection(name).await
  }

  async fn describe_collection(&self, name: &str) -> Result<CollectionSchema, StorageError> {
    self.inner.describe_collection(name).await
  }

  async fn insert(&self, name: &str, documents: Vec<codectx_core::VectorDocument>) -> Result<(), StorageError> {
    self.inner.insert(name, documents).await
  }

  async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StorageError> {
    self.inner.delete(name, ids).await
  }

  async fn query(&self, name: &str, filter: &str, output_fields: &[&str]) -> Result<Vec<Row>, StorageError> {
    self.inner.query(name, filter, output_fields).await
  }

  async fn search(
    &self,
    name: &str,
    vector: &[f32],
    options: SearchOptions,
  ) -> Result<Vec<ScoredDocument>, StorageError> {
    self.inner.search(name, vector, options).await
  }

  async fn hybrid_search(
    &self,
    _name: &str,
    _dense: &[f32],
    _sparse: &SparseVector,
    _options: HybridSearchOptions,
  ) -> Result<Vec<ScoredDocument>, StorageError> {
    Err(StorageError::Backend("sparse queries refused".to_string()))
  }
}

/// Write a file under `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) {
  let path = root.join(relative);
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, content).unwrap();
}

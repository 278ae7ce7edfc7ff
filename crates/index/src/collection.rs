//! Collection lifecycle against the vector store.

use std::sync::Arc;

use embedding::Embedder;
use store::VectorStore;
use tracing::{debug, info};

use crate::IndexError;

const COLLECTION_DESCRIPTION: &str = "code chunks indexed by codectx";

/// Creates and drops collections, pinning the embedding dimension at
/// creation time. Schemas are never mutated in place; `clear_index` drops
/// and the next index run recreates.
pub struct CollectionManager {
  embedder: Arc<dyn Embedder>,
  store: Arc<dyn VectorStore>,
}

impl CollectionManager {
  pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
    Self { embedder, store }
  }

  /// Ensure `name` exists with the embedder's dimension, probing lazy
  /// providers first. Returns the dimension the collection is anchored to.
  pub async fn prepare(&self, name: &str, enable_sparse: bool) -> Result<usize, IndexError> {
    let dimension = self.embedder.ensure_dimension().await?;

    if self.store.has_collection(name).await? {
      let schema = self.store.describe_collection(name).await?;
      if schema.dimension != dimension {
        return Err(IndexError::Storage(store::StorageError::DimensionMismatch {
          expected: schema.dimension,
          got: dimension,
        }));
      }
      debug!(collection = name, dimension, "collection already prepared");
      return Ok(dimension);
    }

    self
      .store
      .create_collection(name, dimension, enable_sparse, Some(COLLECTION_DESCRIPTION))
      .await?;
    info!(collection = name, dimension, enable_sparse, "created collection");
    Ok(dimension)
  }

  /// Idempotent drop; missing collections return cleanly.
  pub async fn drop(&self, name: &str) -> Result<(), IndexError> {
    self.store.drop_collection(name).await?;
    Ok(())
  }
}

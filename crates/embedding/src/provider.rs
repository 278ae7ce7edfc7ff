use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("no api key configured for provider")]
  NoApiKey,
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("provider error: {0}")]
  Provider(String),
  #[error("got {got} embeddings for {expected} inputs")]
  BatchSizeMismatch { expected: usize, got: usize },
  #[error("embedding dimension mismatch: expected {expected}, got {got}")]
  DimensionMismatch { expected: usize, got: usize },
  #[error("request timed out")]
  Timeout,
}

/// Produces dense vectors for texts.
///
/// Implementations live behind `Arc<dyn Embedder>`; the pipeline never knows
/// which provider it talks to.
#[async_trait]
pub trait Embedder: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;

  /// Dense vector length this provider produces.
  fn dimension(&self) -> usize;

  /// Probe the provider for its dimension when it is only known lazily.
  ///
  /// Called once before collection creation. The default trusts the
  /// statically configured dimension.
  async fn ensure_dimension(&self) -> Result<usize, EmbeddingError> {
    Ok(self.dimension())
  }

  /// Provider-imposed ceiling on texts per batch call, if any.
  fn max_batch_size(&self) -> Option<usize> {
    None
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

  /// Embed many texts; output order matches input order and lengths are
  /// equal, or the call fails with [`EmbeddingError::BatchSizeMismatch`].
  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

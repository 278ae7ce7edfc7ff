use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Embedder, EmbeddingError};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_DIMENSION: usize = 768;
const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// Embedding provider backed by a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
  client: reqwest::Client,
  base_url: String,
  model: String,
  dimension: usize,
  max_batch_size: usize,
}

impl Default for OllamaEmbedder {
  fn default() -> Self {
    Self::new()
  }
}

impl OllamaEmbedder {
  pub fn new() -> Self {
    Self {
      client: reqwest::Client::new(),
      base_url: DEFAULT_OLLAMA_URL.to_string(),
      model: DEFAULT_MODEL.to_string(),
      dimension: DEFAULT_DIMENSION,
      max_batch_size: DEFAULT_MAX_BATCH_SIZE,
    }
  }

  pub fn with_url(mut self, url: impl Into<String>) -> Self {
    self.base_url = url.into();
    self
  }

  pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
    self.model = model.into();
    self.dimension = dimension;
    self
  }

  pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
    self.max_batch_size = max_batch_size.max(1);
    self
  }

  fn embed_url(&self) -> String {
    format!("{}/api/embed", self.base_url)
  }

  /// Embed one sub-batch within the provider's batch ceiling.
  async fn embed_sub_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let request = EmbedRequest {
      model: &self.model,
      input: texts.to_vec(),
    };

    debug!(count = texts.len(), model = %self.model, "embedding batch with ollama");

    let response = self.client.post(self.embed_url()).json(&request).send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "ollama embedding failed");
      return Err(EmbeddingError::Provider(format!("ollama returned {status}: {body}")));
    }

    let result: EmbedResponse = response.json().await?;

    if result.embeddings.len() != texts.len() {
      return Err(EmbeddingError::BatchSizeMismatch {
        expected: texts.len(),
        got: result.embeddings.len(),
      });
    }

    for embedding in &result.embeddings {
      if embedding.len() != self.dimension {
        return Err(EmbeddingError::DimensionMismatch {
          expected: self.dimension,
          got: embedding.len(),
        });
      }
    }

    Ok(result.embeddings)
  }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
  model: &'a str,
  input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
  embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl Embedder for OllamaEmbedder {
  fn name(&self) -> &str {
    "ollama"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  fn max_batch_size(&self) -> Option<usize> {
    Some(self.max_batch_size)
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut embeddings = self.embed_sub_batch(&[text]).await?;
    Ok(embeddings.remove(0))
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }

    // Sub-batches run sequentially; the pipeline is single-task and relies
    // on input-order outputs.
    let mut all = Vec::with_capacity(texts.len());
    for sub in texts.chunks(self.max_batch_size) {
      all.extend(self.embed_sub_batch(sub).await?);
    }
    Ok(all)
  }
}

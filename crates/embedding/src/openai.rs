use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Embedder, EmbeddingError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";
const DEFAULT_DIMENSION: usize = 1536;
const DEFAULT_MAX_BATCH_SIZE: usize = 64;

/// Embedding provider for any OpenAI-compatible `/embeddings` endpoint.
///
/// Works against OpenAI itself and the many gateways that mirror its wire
/// shape; point `base_url` at the `/v1` root of the service.
#[derive(Debug, Clone)]
pub struct OpenAiCompatEmbedder {
  client: reqwest::Client,
  base_url: String,
  api_key: String,
  model: String,
  dimension: usize,
  max_batch_size: usize,
}

impl OpenAiCompatEmbedder {
  pub fn new(api_key: impl Into<String>) -> Result<Self, EmbeddingError> {
    let api_key = api_key.into();
    if api_key.is_empty() {
      return Err(EmbeddingError::NoApiKey);
    }
    Ok(Self {
      client: reqwest::Client::new(),
      base_url: DEFAULT_BASE_URL.to_string(),
      api_key,
      model: DEFAULT_MODEL.to_string(),
      dimension: DEFAULT_DIMENSION,
      max_batch_size: DEFAULT_MAX_BATCH_SIZE,
    })
  }

  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
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

  fn embeddings_url(&self) -> String {
    format!("{}/embeddings", self.base_url)
  }

  async fn embed_sub_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let request = EmbeddingRequest {
      model: &self.model,
      input: texts.to_vec(),
    };

    debug!(count = texts.len(), model = %self.model, "embedding batch");

    let response = self
      .client
      .post(self.embeddings_url())
      .header("Authorization", format!("Bearer {}", self.api_key))
      .json(&request)
      .send()
      .await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!(%status, "embedding request failed");
      return Err(EmbeddingError::Provider(format!("provider returned {status}: {body}")));
    }

    let result: EmbeddingResponse = response.json().await?;

    if result.data.len() != texts.len() {
      return Err(EmbeddingError::BatchSizeMismatch {
        expected: texts.len(),
        got: result.data.len(),
      });
    }

    // Responses may arrive out of order; `index` is authoritative.
    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
    for item in result.data {
      if item.index >= texts.len() {
        return Err(EmbeddingError::Provider(format!(
          "embedding index {} out of range for batch of {}",
          item.index,
          texts.len()
        )));
      }
      ordered[item.index] = Some(item.embedding);
    }

    ordered
      .into_iter()
      .map(|slot| slot.ok_or_else(|| EmbeddingError::Provider("missing embedding index in response".to_string())))
      .collect()
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  index: usize,
  embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAiCompatEmbedder {
  fn name(&self) -> &str {
    "openai-compat"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimension(&self) -> usize {
    self.dimension
  }

  /// Probe with a tiny request so a misconfigured dimension surfaces before
  /// the collection is created with the wrong schema.
  async fn ensure_dimension(&self) -> Result<usize, EmbeddingError> {
    let probe = self.embed("dimension probe").await?;
    if probe.len() != self.dimension {
      return Err(EmbeddingError::DimensionMismatch {
        expected: self.dimension,
        got: probe.len(),
      });
    }
    Ok(probe.len())
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

    let mut all = Vec::with_capacity(texts.len());
    for sub in texts.chunks(self.max_batch_size) {
      all.extend(self.embed_sub_batch(sub).await?);
    }
    Ok(all)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_api_key_rejected() {
    assert!(matches!(OpenAiCompatEmbedder::new(""), Err(EmbeddingError::NoApiKey)));
  }

  #[test]
  fn test_builder_configuration() {
    let provider = OpenAiCompatEmbedder::new("sk-test")
      .unwrap()
      .with_base_url("http://localhost:8081/v1")
      .with_model("text-embedding-3-large", 3072);

    assert_eq!(provider.embeddings_url(), "http://localhost:8081/v1/embeddings");
    assert_eq!(provider.model_id(), "text-embedding-3-large");
    assert_eq!(provider.dimension(), 3072);
  }

  #[tokio::test]
  async fn test_empty_batch_short_circuits() {
    let provider = OpenAiCompatEmbedder::new("sk-test")
      .unwrap()
      .with_base_url("http://localhost:1/v1");
    let result = provider.embed_batch(&[]).await.unwrap();
    assert!(result.is_empty());
  }
}

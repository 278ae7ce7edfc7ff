// Retry wrapper for embedding providers.
//
// Retries transient failures (429/502/503/504, transport errors, timeouts)
// with exponential backoff and jitter. A batch that keeps failing surfaces
// its error to the caller; the pipeline skips that batch and continues.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::{Embedder, EmbeddingError};

#[derive(Debug, Clone)]
pub struct RetryConfig {
  /// Retry attempts after the initial call.
  pub max_retries: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  pub backoff_multiplier: f64,
  pub add_jitter: bool,
  /// Deadline for each individual call.
  pub request_timeout: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_millis(500),
      max_backoff: Duration::from_secs(30),
      backoff_multiplier: 2.0,
      add_jitter: true,
      request_timeout: Duration::from_secs(60),
    }
  }
}

impl RetryConfig {
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
    let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

    if self.add_jitter {
      // Up to 25% jitter so synchronized clients do not retry in lockstep.
      let jitter_factor = 1.0 + (rand_f64() * 0.25);
      backoff = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
    }

    backoff.min(self.max_backoff)
  }
}

/// Pseudo-random fraction for jitter without pulling in a rand dependency.
fn rand_f64() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};

  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .subsec_nanos();

  (nanos as f64 / u32::MAX as f64).fract()
}

/// Whether an error is worth retrying.
pub fn is_retryable_error(error: &EmbeddingError) -> bool {
  match error {
    EmbeddingError::Timeout => true,
    EmbeddingError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
    EmbeddingError::Provider(msg) => {
      msg.contains("429") || msg.contains("502") || msg.contains("503") || msg.contains("504")
    }
    _ => false,
  }
}

/// Wraps any [`Embedder`] with bounded retries and per-call timeouts.
pub struct ResilientEmbedder<E: Embedder> {
  inner: E,
  config: RetryConfig,
}

impl<E: Embedder> ResilientEmbedder<E> {
  pub fn new(inner: E) -> Self {
    Self {
      inner,
      config: RetryConfig::default(),
    }
  }

  pub fn with_config(inner: E, config: RetryConfig) -> Self {
    Self { inner, config }
  }

  async fn retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T, EmbeddingError>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, EmbeddingError>>,
  {
    let mut last_error: Option<EmbeddingError> = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let backoff = self.config.backoff_for_attempt(attempt - 1);
        debug!(what, attempt, backoff_ms = backoff.as_millis() as u64, "retrying after backoff");
        sleep(backoff).await;
      }

      match tokio::time::timeout(self.config.request_timeout, call()).await {
        Ok(Ok(result)) => return Ok(result),
        Ok(Err(e)) if is_retryable_error(&e) && attempt < self.config.max_retries => {
          warn!(what, attempt = attempt + 1, err = %e, "retryable embedding error");
          last_error = Some(e);
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
          warn!(
            what,
            attempt = attempt + 1,
            timeout_ms = self.config.request_timeout.as_millis() as u64,
            "embedding call timed out"
          );
          last_error = Some(EmbeddingError::Timeout);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| EmbeddingError::Provider("retries exhausted".to_string())))
  }
}

#[async_trait]
impl<E: Embedder> Embedder for ResilientEmbedder<E> {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn model_id(&self) -> &str {
    self.inner.model_id()
  }

  fn dimension(&self) -> usize {
    self.inner.dimension()
  }

  async fn ensure_dimension(&self) -> Result<usize, EmbeddingError> {
    self.retry("ensure_dimension", || self.inner.ensure_dimension()).await
  }

  fn max_batch_size(&self) -> Option<usize> {
    self.inner.max_batch_size()
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.retry("embed", || self.inner.embed(text)).await
  }

  async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    self.retry("embed_batch", || self.inner.embed_batch(texts)).await
  }
}

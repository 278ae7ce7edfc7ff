pub mod ollama;
pub mod openai;
pub mod provider;
pub mod resilient;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiCompatEmbedder;
pub use provider::{Embedder, EmbeddingError};
pub use resilient::{ResilientEmbedder, RetryConfig, is_retryable_error};

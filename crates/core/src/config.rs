use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Extensions indexed when the caller does not supply a custom set.
///
/// Lowercase, dotted. Covers every grammar the splitter ships plus common
/// window-split text formats.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
  ".rs", ".py", ".js", ".mjs", ".jsx", ".ts", ".tsx", ".go", ".java", ".c", ".h", ".cpp", ".cc", ".hpp", ".cs",
  ".rb", ".php", ".swift", ".kt", ".scala", ".sh", ".md", ".txt", ".json", ".yaml", ".yml", ".toml", ".sql",
];

const DEFAULT_EMBED_BATCH: usize = 100;
const DEFAULT_CHUNK_SIZE: usize = 2500;
const DEFAULT_CHUNK_OVERLAP: usize = 300;
const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Score multiplier applied when a hybrid search degrades to dense-only.
pub const HYBRID_FALLBACK_PENALTY: f32 = 0.9;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("embed_batch must be at least 1")]
  EmbedBatchTooSmall,
  #[error("splitter_chunk_overlap ({overlap}) must be smaller than splitter_chunk_size ({size})")]
  OverlapTooLarge { overlap: usize, size: usize },
  #[error("weighted ranker weights must be positive (dense={dense}, sparse={sparse})")]
  InvalidRankerWeights { dense: f32, sparse: f32 },
}

/// Hybrid result fusion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RankerConfig {
  /// Reciprocal-rank fusion: `score = Σ 1 / (k + rank)`.
  Rrf { k: f32 },
  /// Weighted sum over min-max normalized scores.
  Weighted { dense: f32, sparse: f32 },
}

impl Default for RankerConfig {
  fn default() -> Self {
    RankerConfig::Rrf { k: 100.0 }
  }
}

impl RankerConfig {
  /// Label recorded by the planner for observability.
  pub fn label(&self) -> &'static str {
    match self {
      RankerConfig::Rrf { .. } => "rrf",
      RankerConfig::Weighted { .. } => "weight",
    }
  }
}

/// Consistency hint forwarded to the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
  Strong,
  Session,
  #[default]
  Bounded,
  Eventually,
}

/// Configuration handed to the orchestrator at construction.
///
/// There is no global state; everything the pipeline needs, including the
/// snapshot directory, arrives through this struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
  /// Chunks buffered before an embed + insert flush. Minimum 1.
  pub embed_batch: usize,
  /// Create collections with a sparse field and use hybrid search.
  pub enable_sparse: bool,
  /// Lowercase dotted extensions eligible for indexing.
  pub supported_extensions: BTreeSet<String>,
  /// User ignore patterns, merged with the built-in denylist.
  pub ignore_patterns: Vec<String>,
  /// Window-splitter chunk size in characters.
  pub splitter_chunk_size: usize,
  /// Window-splitter overlap in characters.
  pub splitter_chunk_overlap: usize,
  pub ranker: RankerConfig,
  pub consistency_level: ConsistencyLevel,
  /// Snapshot directory; `None` resolves to `$HOME/.codeindexer/merkle`.
  pub snapshot_root: Option<PathBuf>,
  /// Files larger than this are skipped with a warning.
  pub max_file_size_bytes: u64,
}

impl Default for IndexConfig {
  fn default() -> Self {
    Self {
      embed_batch: DEFAULT_EMBED_BATCH,
      enable_sparse: false,
      supported_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
      ignore_patterns: Vec::new(),
      splitter_chunk_size: DEFAULT_CHUNK_SIZE,
      splitter_chunk_overlap: DEFAULT_CHUNK_OVERLAP,
      ranker: RankerConfig::default(),
      consistency_level: ConsistencyLevel::default(),
      snapshot_root: None,
      max_file_size_bytes: DEFAULT_MAX_FILE_SIZE,
    }
  }
}

impl IndexConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.embed_batch < 1 {
      return Err(ConfigError::EmbedBatchTooSmall);
    }
    if self.splitter_chunk_overlap >= self.splitter_chunk_size {
      return Err(ConfigError::OverlapTooLarge {
        overlap: self.splitter_chunk_overlap,
        size: self.splitter_chunk_size,
      });
    }
    if let RankerConfig::Weighted { dense, sparse } = self.ranker
      && (dense <= 0.0 || sparse <= 0.0)
    {
      return Err(ConfigError::InvalidRankerWeights { dense, sparse });
    }
    Ok(())
  }

  /// True when `ext` (with or without leading dot) is indexable.
  pub fn supports_extension(&self, ext: &str) -> bool {
    let dotted = if ext.starts_with('.') {
      ext.to_lowercase()
    } else {
      format!(".{}", ext.to_lowercase())
    };
    self.supported_extensions.contains(&dotted)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_is_valid() {
    let config = IndexConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.embed_batch, 100);
    assert!(!config.enable_sparse);
  }

  #[test]
  fn test_zero_embed_batch_rejected() {
    let config = IndexConfig {
      embed_batch: 0,
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::EmbedBatchTooSmall)));
  }

  #[test]
  fn test_overlap_must_be_smaller_than_chunk() {
    let config = IndexConfig {
      splitter_chunk_size: 100,
      splitter_chunk_overlap: 100,
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::OverlapTooLarge { .. })));
  }

  #[test]
  fn test_weighted_ranker_weights_checked() {
    let config = IndexConfig {
      ranker: RankerConfig::Weighted { dense: 0.0, sparse: 1.0 },
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidRankerWeights { .. })));
  }

  #[test]
  fn test_supports_extension_normalizes() {
    let config = IndexConfig::default();
    assert!(config.supports_extension("rs"));
    assert!(config.supports_extension(".rs"));
    assert!(config.supports_extension("RS"));
    assert!(!config.supports_extension("exe"));
  }

  #[test]
  fn test_ranker_labels() {
    assert_eq!(RankerConfig::default().label(), "rrf");
    assert_eq!(RankerConfig::Weighted { dense: 0.7, sparse: 0.3 }.label(), "weight");
  }
}

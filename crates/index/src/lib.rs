pub mod collection;
pub mod ignore;
pub mod pipeline;
pub mod search;
pub mod sync;

use std::path::PathBuf;

pub use collection::CollectionManager;
pub use ignore::IgnoreEngine;
pub use pipeline::{ChunkTransform, IndexOutcome, IndexProgress, IndexStatus, Indexer, ProgressCallback, ReindexOutcome};
pub use search::Searcher;
pub use sync::{Delta, FileSynchronizer};

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
  #[error("configuration error: {0}")]
  Config(#[from] codectx_core::ConfigError),
  #[error("codebase path error: {0}")]
  Path(String),
  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Embedding(#[from] embedding::EmbeddingError),
  #[error(transparent)]
  Storage(#[from] store::StorageError),
  #[error("snapshot {0} is locked by another synchronizer")]
  SnapshotLocked(PathBuf),
}

impl IndexError {
  pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    IndexError::Io {
      path: path.into(),
      source,
    }
  }
}

pub mod chunk;
pub mod collection;
pub mod config;
pub mod document;

pub use chunk::{CodeChunk, Language, NodeType, chunk_id, content_hash};
pub use collection::{collection_name, snapshot_file_name};
pub use config::{ConfigError, ConsistencyLevel, DEFAULT_EXTENSIONS, HYBRID_FALLBACK_PENALTY, IndexConfig, RankerConfig};
pub use document::{SearchResult, SparseVector, VectorDocument};

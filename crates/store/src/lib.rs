pub mod filter;
pub mod memory;
pub mod sparse;
pub mod vector_store;

pub use filter::Filter;
pub use memory::MemoryStore;
pub use sparse::{Bm25LiteEncoder, SparseEncoder};
pub use vector_store::{
  CollectionSchema, HybridSearchOptions, Row, ScoredDocument, SearchOptions, StorageError, VectorStore,
};

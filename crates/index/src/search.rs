//! Query planner: dense search, hybrid fusion, and degradation fallback.

use std::path::Path;
use std::sync::Arc;

use codectx_core::{HYBRID_FALLBACK_PENALTY, IndexConfig, Language, SearchResult, collection_name};
use embedding::Embedder;
use store::{HybridSearchOptions, ScoredDocument, SearchOptions, SparseEncoder, VectorStore};
use tracing::{debug, warn};

use crate::IndexError;

/// Plans and executes searches against an indexed codebase.
pub struct Searcher {
  config: IndexConfig,
  embedder: Arc<dyn Embedder>,
  store: Arc<dyn VectorStore>,
  sparse_encoder: Arc<dyn SparseEncoder>,
}

impl Searcher {
  pub fn new(
    config: IndexConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    sparse_encoder: Arc<dyn SparseEncoder>,
  ) -> Self {
    Self {
      config,
      embedder,
      store,
      sparse_encoder,
    }
  }

  /// Search a codebase. Hybrid (dense + sparse) runs when both the config
  /// and the collection schema allow it; any hybrid failure or empty result
  /// degrades to dense-only with scores scaled by 0.9.
  pub async fn search(
    &self,
    path: &Path,
    query: &str,
    top_k: usize,
    threshold: f32,
  ) -> Result<Vec<SearchResult>, IndexError> {
    let root = path.canonicalize().map_err(|e| IndexError::io(path, e))?;
    let collection = collection_name(&root);

    if !self.store.has_collection(&collection).await? {
      return Err(IndexError::Storage(store::StorageError::CollectionNotFound(collection)));
    }

    let vector = self.embedder.embed(query).await?;
    let schema = self.store.describe_collection(&collection).await?;

    let hits = if schema.has_sparse && self.config.enable_sparse {
      self.hybrid_with_fallback(&collection, &vector, query, top_k, threshold).await?
    } else {
      self
        .store
        .search(&collection, &vector, SearchOptions { top_k, threshold })
        .await?
    };

    let mut results: Vec<SearchResult> = hits.into_iter().map(to_search_result).collect();
    // Stable ordering: score descending, ties by path then start line.
    results.sort_by(|a, b| {
      b.score
        .total_cmp(&a.score)
        .then_with(|| a.relative_path.cmp(&b.relative_path))
        .then_with(|| a.start_line.cmp(&b.start_line))
    });
    Ok(results)
  }

  async fn hybrid_with_fallback(
    &self,
    collection: &str,
    vector: &[f32],
    query: &str,
    top_k: usize,
    threshold: f32,
  ) -> Result<Vec<ScoredDocument>, IndexError> {
    let sparse = self.sparse_encoder.encode(query);
    let options = HybridSearchOptions {
      top_k,
      threshold,
      ranker: self.config.ranker,
    };
    debug!(ranker = self.config.ranker.label(), "running hybrid search");

    match self.store.hybrid_search(collection, vector, &sparse, options).await {
      Ok(hits) if !hits.is_empty() => Ok(hits),
      Ok(_) => {
        warn!("hybrid search returned no hits, degrading to dense-only");
        self.dense_degraded(collection, vector, top_k, threshold).await
      }
      Err(err) => {
        warn!(error = %err, "hybrid search failed, degrading to dense-only");
        self.dense_degraded(collection, vector, top_k, threshold).await
      }
    }
  }

  /// Dense-only fallback with scores scaled by 0.9 to signal degradation.
  ///
  /// The dense threshold is raised so that every scaled score still clears
  /// the caller's threshold.
  async fn dense_degraded(
    &self,
    collection: &str,
    vector: &[f32],
    top_k: usize,
    threshold: f32,
  ) -> Result<Vec<ScoredDocument>, IndexError> {
    let raised = threshold / HYBRID_FALLBACK_PENALTY;
    let mut hits = self
      .store
      .search(collection, vector, SearchOptions { top_k, threshold: raised })
      .await?;
    for hit in &mut hits {
      hit.score *= HYBRID_FALLBACK_PENALTY;
    }
    Ok(hits)
  }
}

fn to_search_result(hit: ScoredDocument) -> SearchResult {
  let document = hit.document;
  let language = document
    .metadata
    .get("language")
    .cloned()
    .or_else(|| {
      Language::from_extension(&document.file_extension).map(|language| language.as_str().to_string())
    })
    .unwrap_or_else(|| "text".to_string());

  SearchResult {
    content: document.content,
    relative_path: document.relative_path,
    start_line: document.start_line,
    end_line: document.end_line,
    language,
    score: hit.score,
  }
}

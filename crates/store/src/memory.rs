//! In-memory reference store.
//!
//! Brute-force cosine over dense vectors and BM25-style inner product over
//! sparse maps. This is the embedded default backend and the double every
//! pipeline test runs against; scoring is real so retrieval properties hold.

use std::collections::HashMap;

use async_trait::async_trait;
use codectx_core::{RankerConfig, SparseVector, VectorDocument};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::filter::{Filter, field_value};
use crate::vector_store::{
  CollectionSchema, HybridSearchOptions, Row, ScoredDocument, SearchOptions, StorageError, VectorStore,
};

struct MemoryCollection {
  schema: CollectionSchema,
  documents: HashMap<String, VectorDocument>,
}

/// Process-local vector store.
#[derive(Default)]
pub struct MemoryStore {
  collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl VectorStore for MemoryStore {
  async fn create_collection(
    &self,
    name: &str,
    dimension: usize,
    has_sparse: bool,
    description: Option<&str>,
  ) -> Result<(), StorageError> {
    let mut collections = self.collections.write().await;
    if collections.contains_key(name) {
      return Err(StorageError::CollectionExists(name.to_string()));
    }
    debug!(collection = name, dimension, has_sparse, "creating collection");
    collections.insert(
      name.to_string(),
      MemoryCollection {
        schema: CollectionSchema {
          dimension,
          has_sparse,
          description: description.map(|s| s.to_string()),
        },
        documents: HashMap::new(),
      },
    );
    Ok(())
  }

  async fn drop_collection(&self, name: &str) -> Result<(), StorageError> {
    let mut collections = self.collections.write().await;
    if collections.remove(name).is_some() {
      debug!(collection = name, "dropped collection");
    }
    Ok(())
  }

  async fn has_collection(&self, name: &str) -> Result<bool, StorageError> {
    Ok(self.collections.read().await.contains_key(name))
  }

  async fn describe_collection(&self, name: &str) -> Result<CollectionSchema, StorageError> {
    let collections = self.collections.read().await;
    collections
      .get(name)
      .map(|c| c.schema.clone())
      .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))
  }

  async fn insert(&self, name: &str, documents: Vec<VectorDocument>) -> Result<(), StorageError> {
    let mut collections = self.collections.write().await;
    let collection = collections
      .get_mut(name)
      .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))?;

    for document in &documents {
      if document.vector.len() != collection.schema.dimension {
        return Err(StorageError::DimensionMismatch {
          expected: collection.schema.dimension,
          got: document.vector.len(),
        });
      }
    }

    trace!(collection = name, count = documents.len(), "inserting documents");
    for document in documents {
      collection.documents.insert(document.id.clone(), document);
    }
    Ok(())
  }

  async fn delete(&self, name: &str, ids: &[String]) -> Result<(), StorageError> {
    let mut collections = self.collections.write().await;
    let collection = collections
      .get_mut(name)
      .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))?;
    for id in ids {
      collection.documents.remove(id);
    }
    Ok(())
  }

  async fn query(&self, name: &str, filter: &str, output_fields: &[&str]) -> Result<Vec<Row>, StorageError> {
    let parsed = Filter::parse(filter)?;
    let collections = self.collections.read().await;
    let collection = collections
      .get(name)
      .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))?;

    let mut rows: Vec<Row> = collection
      .documents
      .values()
      .filter(|doc| parsed.matches(doc))
      .map(|doc| {
        output_fields
          .iter()
          .filter_map(|field| field_value(doc, field).map(|value| (field.to_string(), value)))
          .collect()
      })
      .collect();
    rows.sort();
    Ok(rows)
  }

  async fn search(
    &self,
    name: &str,
    vector: &[f32],
    options: SearchOptions,
  ) -> Result<Vec<ScoredDocument>, StorageError> {
    let collections = self.collections.read().await;
    let collection = collections
      .get(name)
      .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))?;

    if vector.len() != collection.schema.dimension {
      return Err(StorageError::DimensionMismatch {
        expected: collection.schema.dimension,
        got: vector.len(),
      });
    }

    let mut hits: Vec<ScoredDocument> = collection
      .documents
      .values()
      .map(|doc| ScoredDocument {
        score: cosine(vector, &doc.vector),
        document: doc.clone(),
      })
      .filter(|hit| hit.score >= options.threshold)
      .collect();

    sort_hits(&mut hits);
    hits.truncate(options.top_k);
    Ok(hits)
  }

  async fn hybrid_search(
    &self,
    name: &str,
    dense: &[f32],
    sparse: &SparseVector,
    options: HybridSearchOptions,
  ) -> Result<Vec<ScoredDocument>, StorageError> {
    let collections = self.collections.read().await;
    let collection = collections
      .get(name)
      .ok_or_else(|| StorageError::CollectionNotFound(name.to_string()))?;

    if !collection.schema.has_sparse {
      return Err(StorageError::HybridUnsupported);
    }
    if dense.len() != collection.schema.dimension {
      return Err(StorageError::DimensionMismatch {
        expected: collection.schema.dimension,
        got: dense.len(),
      });
    }

    let documents: Vec<&VectorDocument> = collection.documents.values().collect();

    let mut dense_ranked: Vec<(usize, f32)> = documents
      .iter()
      .enumerate()
      .map(|(i, doc)| (i, cosine(dense, &doc.vector)))
      .collect();
    dense_ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let idf = idf_table(&documents, sparse);
    let mut sparse_ranked: Vec<(usize, f32)> = documents
      .iter()
      .enumerate()
      .filter_map(|(i, doc)| {
        let score = sparse_score(sparse, doc.sparse.as_ref()?, &idf);
        (score > 0.0).then_some((i, score))
      })
      .collect();
    sparse_ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let fused = match options.ranker {
      RankerConfig::Rrf { k } => rrf_fuse(&[&dense_ranked, &sparse_ranked], k),
      RankerConfig::Weighted { dense: wd, sparse: ws } => weighted_fuse(&dense_ranked, &sparse_ranked, wd, ws),
    };

    let mut hits: Vec<ScoredDocument> = fused
      .into_iter()
      .filter(|(_, score)| *score >= options.threshold)
      .map(|(i, score)| ScoredDocument {
        document: documents[i].clone(),
        score,
      })
      .collect();

    sort_hits(&mut hits);
    hits.truncate(options.top_k);
    Ok(hits)
  }
}

fn sort_hits(hits: &mut [ScoredDocument]) {
  hits.sort_by(|a, b| {
    b.score
      .total_cmp(&a.score)
      .then_with(|| a.document.relative_path.cmp(&b.document.relative_path))
      .then_with(|| a.document.start_line.cmp(&b.document.start_line))
  });
}

pub(crate) fn cosine(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }
  let mut dot = 0.0f32;
  let mut norm_a = 0.0f32;
  let mut norm_b = 0.0f32;
  for (x, y) in a.iter().zip(b.iter()) {
    dot += x * y;
    norm_a += x * x;
    norm_b += y * y;
  }
  if norm_a == 0.0 || norm_b == 0.0 {
    return 0.0;
  }
  dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// BM25-style idf for every query term, computed over the collection.
fn idf_table(documents: &[&VectorDocument], query: &SparseVector) -> HashMap<String, f32> {
  let n = documents.len() as f32;
  query
    .keys()
    .map(|term| {
      let df = documents
        .iter()
        .filter(|doc| doc.sparse.as_ref().is_some_and(|s| s.contains_key(term)))
        .count() as f32;
      let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
      (term.clone(), idf.max(0.0))
    })
    .collect()
}

fn sparse_score(query: &SparseVector, document: &SparseVector, idf: &HashMap<String, f32>) -> f32 {
  query
    .iter()
    .filter_map(|(term, q_weight)| {
      let d_weight = document.get(term)?;
      let idf = idf.get(term).copied().unwrap_or(0.0);
      Some(q_weight * d_weight * idf)
    })
    .sum()
}

/// Reciprocal-rank fusion over ranked lists: `score = Σ 1 / (k + rank)`.
fn rrf_fuse(lists: &[&Vec<(usize, f32)>], k: f32) -> Vec<(usize, f32)> {
  let mut scores: HashMap<usize, f32> = HashMap::new();
  for list in lists {
    for (rank, (doc, _)) in list.iter().enumerate() {
      *scores.entry(*doc).or_insert(0.0) += 1.0 / (k + rank as f32 + 1.0);
    }
  }
  scores.into_iter().collect()
}

/// Weighted sum over min-max normalized scores; weights are renormalized.
fn weighted_fuse(dense: &[(usize, f32)], sparse: &[(usize, f32)], wd: f32, ws: f32) -> Vec<(usize, f32)> {
  let total = wd + ws;
  let (wd, ws) = if total > 0.0 { (wd / total, ws / total) } else { (0.5, 0.5) };

  let dense_norm = min_max_normalize(dense);
  let sparse_norm = min_max_normalize(sparse);

  let mut scores: HashMap<usize, f32> = HashMap::new();
  for (doc, score) in dense_norm {
    *scores.entry(doc).or_insert(0.0) += wd * score;
  }
  for (doc, score) in sparse_norm {
    *scores.entry(doc).or_insert(0.0) += ws * score;
  }
  scores.into_iter().collect()
}

fn min_max_normalize(list: &[(usize, f32)]) -> Vec<(usize, f32)> {
  if list.is_empty() {
    return Vec::new();
  }
  let max = list.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
  let min = list.iter().map(|(_, s)| *s).fold(f32::MAX, f32::min);
  let range = max - min;
  list
    .iter()
    .map(|(doc, score)| {
      let normalized = if range > 0.0 { (score - min) / range } else { 1.0 };
      (*doc, normalized)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use codectx_core::chunk_id;
  use std::collections::BTreeMap;

  fn doc(path: &str, start_line: u32, vector: Vec<f32>) -> VectorDocument {
    VectorDocument {
      id: chunk_id(path, start_line, start_line, path),
      vector,
      content: format!("content of {path}"),
      relative_path: path.to_string(),
      start_line,
      end_line: start_line,
      file_extension: "rs".to_string(),
      metadata: BTreeMap::new(),
      sparse: None,
    }
  }

  fn sparse_doc(path: &str, vector: Vec<f32>, text: &str) -> VectorDocument {
    use crate::sparse::{Bm25LiteEncoder, SparseEncoder};
    let mut d = doc(path, 1, vector);
    d.content = text.to_string();
    d.sparse = Some(Bm25LiteEncoder::new().encode(text));
    d
  }

  #[tokio::test]
  async fn test_collection_lifecycle() {
    let store = MemoryStore::new();
    assert!(!store.has_collection("c").await.unwrap());

    store.create_collection("c", 3, false, Some("test")).await.unwrap();
    assert!(store.has_collection("c").await.unwrap());

    let schema = store.describe_collection("c").await.unwrap();
    assert_eq!(schema.dimension, 3);
    assert!(!schema.has_sparse);
    assert_eq!(schema.description.as_deref(), Some("test"));

    // Creating again is an error, dropping twice is not.
    assert!(matches!(
      store.create_collection("c", 3, false, None).await,
      Err(StorageError::CollectionExists(_))
    ));
    store.drop_collection("c").await.unwrap();
    store.drop_collection("c").await.unwrap();
    assert!(!store.has_collection("c").await.unwrap());
  }

  #[tokio::test]
  async fn test_insert_rejects_wrong_dimension() {
    let store = MemoryStore::new();
    store.create_collection("c", 3, false, None).await.unwrap();
    let result = store.insert("c", vec![doc("a.rs", 1, vec![1.0, 0.0])]).await;
    assert!(matches!(result, Err(StorageError::DimensionMismatch { expected: 3, got: 2 })));
  }

  #[tokio::test]
  async fn test_insert_is_upsert_by_id() {
    let store = MemoryStore::new();
    store.create_collection("c", 2, false, None).await.unwrap();

    let d = doc("a.rs", 1, vec![1.0, 0.0]);
    store.insert("c", vec![d.clone()]).await.unwrap();
    store.insert("c", vec![d.clone()]).await.unwrap();

    let rows = store
      .query("c", "relative_path == \"a.rs\"", &["id"])
      .await
      .unwrap();
    assert_eq!(rows.len(), 1, "same id must not duplicate");
  }

  #[tokio::test]
  async fn test_delete_by_ids() {
    let store = MemoryStore::new();
    store.create_collection("c", 2, false, None).await.unwrap();
    let d1 = doc("a.rs", 1, vec![1.0, 0.0]);
    let d2 = doc("b.rs", 1, vec![0.0, 1.0]);
    store.insert("c", vec![d1.clone(), d2]).await.unwrap();

    store.delete("c", &[d1.id]).await.unwrap();
    let rows = store.query("c", "file_extension == \"rs\"", &["relative_path"]).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("relative_path").map(String::as_str), Some("b.rs"));
  }

  #[tokio::test]
  async fn test_search_orders_by_cosine_and_applies_threshold() {
    let store = MemoryStore::new();
    store.create_collection("c", 2, false, None).await.unwrap();
    store
      .insert(
        "c",
        vec![
          doc("near.rs", 1, vec![1.0, 0.05]),
          doc("far.rs", 1, vec![0.0, 1.0]),
          doc("mid.rs", 1, vec![1.0, 1.0]),
        ],
      )
      .await
      .unwrap();

    let hits = store
      .search("c", &[1.0, 0.0], SearchOptions { top_k: 10, threshold: 0.5 })
      .await
      .unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document.relative_path, "near.rs");
    assert_eq!(hits[1].document.relative_path, "mid.rs");
    assert!(hits.iter().all(|h| h.score >= 0.5));
  }

  #[tokio::test]
  async fn test_round_trip_own_vector_is_top_hit() {
    let store = MemoryStore::new();
    store.create_collection("c", 3, false, None).await.unwrap();
    let target = doc("target.rs", 1, vec![0.2, 0.7, 0.1]);
    store
      .insert(
        "c",
        vec![target.clone(), doc("x.rs", 1, vec![0.9, 0.0, 0.1]), doc("y.rs", 1, vec![0.0, 0.1, 0.9])],
      )
      .await
      .unwrap();

    let hits = store
      .search("c", &target.vector, SearchOptions { top_k: 5, threshold: 0.0 })
      .await
      .unwrap();
    assert_eq!(hits[0].document.id, target.id);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
  }

  #[tokio::test]
  async fn test_hybrid_requires_sparse_schema() {
    let store = MemoryStore::new();
    store.create_collection("dense_only", 2, false, None).await.unwrap();
    let result = store
      .hybrid_search(
        "dense_only",
        &[1.0, 0.0],
        &SparseVector::new(),
        HybridSearchOptions {
          top_k: 5,
          threshold: 0.0,
          ranker: RankerConfig::default(),
        },
      )
      .await;
    assert!(matches!(result, Err(StorageError::HybridUnsupported)));
  }

  #[tokio::test]
  async fn test_hybrid_rrf_rewards_presence_in_both_lists() {
    use crate::sparse::{Bm25LiteEncoder, SparseEncoder};

    let store = MemoryStore::new();
    store.create_collection("c", 2, true, None).await.unwrap();
    store
      .insert(
        "c",
        vec![
          // Dense-closest and keyword match: wins both ranked lists.
          sparse_doc("both.rs", vec![1.0, 0.0], "fn parse_config file"),
          // Dense runner-up only.
          sparse_doc("dense.rs", vec![1.0, 0.3], "unrelated words entirely"),
          // Keyword match only.
          sparse_doc("sparse.rs", vec![0.0, 1.0], "parse_config parse_config"),
        ],
      )
      .await
      .unwrap();

    let query_sparse = Bm25LiteEncoder::new().encode("parse config");
    let hits = store
      .hybrid_search(
        "c",
        &[1.0, 0.0],
        &query_sparse,
        HybridSearchOptions {
          top_k: 3,
          threshold: 0.0,
          ranker: RankerConfig::Rrf { k: 10.0 },
        },
      )
      .await
      .unwrap();

    assert_eq!(hits[0].document.relative_path, "both.rs");
  }

  #[tokio::test]
  async fn test_hybrid_weighted_ranker() {
    use crate::sparse::{Bm25LiteEncoder, SparseEncoder};

    let store = MemoryStore::new();
    store.create_collection("c", 2, true, None).await.unwrap();
    store
      .insert(
        "c",
        vec![
          sparse_doc("a.rs", vec![1.0, 0.0], "alpha beta"),
          sparse_doc("b.rs", vec![0.0, 1.0], "gamma delta"),
        ],
      )
      .await
      .unwrap();

    // All weight on the sparse side: the keyword match must win even though
    // it is dense-orthogonal to the query.
    let hits = store
      .hybrid_search(
        "c",
        &[1.0, 0.0],
        &Bm25LiteEncoder::new().encode("gamma"),
        HybridSearchOptions {
          top_k: 2,
          threshold: 0.0,
          ranker: RankerConfig::Weighted { dense: 0.01, sparse: 0.99 },
        },
      )
      .await
      .unwrap();

    assert_eq!(hits[0].document.relative_path, "b.rs");
  }

  #[tokio::test]
  async fn test_query_missing_collection() {
    let store = MemoryStore::new();
    let result = store.query("nope", "id == \"x\"", &["id"]).await;
    assert!(matches!(result, Err(StorageError::CollectionNotFound(_))));
  }

  #[test]
  fn test_cosine_edge_cases() {
    assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    assert!((cosine(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
  }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sparse term -> weight representation, compared by inner product.
///
/// BTreeMap keeps serialization order stable across runs.
pub type SparseVector = BTreeMap<String, f32>;

/// The unit persisted in a vector collection.
///
/// `id` is a pure function of `(relative_path, start_line, end_line,
/// content)` (see [`crate::chunk_id`]), which makes inserts idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorDocument {
  pub id: String,
  pub vector: Vec<f32>,
  pub content: String,
  pub relative_path: String,
  pub start_line: u32,
  pub end_line: u32,
  pub file_extension: String,
  /// Free-form metadata, serialized to a JSON string at the store boundary.
  #[serde(default)]
  pub metadata: BTreeMap<String, String>,
  /// Present only when the collection was created with a sparse field.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sparse: Option<SparseVector>,
}

impl VectorDocument {
  /// Metadata rendered as a single JSON string, the shape stores persist.
  pub fn metadata_json(&self) -> String {
    serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string())
  }
}

/// One hit returned by the query planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
  pub content: String,
  pub relative_path: String,
  pub start_line: u32,
  pub end_line: u32,
  pub language: String,
  pub score: f32,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn doc() -> VectorDocument {
    VectorDocument {
      id: "chunk_0011223344556677".to_string(),
      vector: vec![0.1, 0.2],
      content: "fn main() {}".to_string(),
      relative_path: "src/main.rs".to_string(),
      start_line: 1,
      end_line: 1,
      file_extension: "rs".to_string(),
      metadata: BTreeMap::new(),
      sparse: None,
    }
  }

  #[test]
  fn test_metadata_json_empty() {
    assert_eq!(doc().metadata_json(), "{}");
  }

  #[test]
  fn test_metadata_json_round_trip() {
    let mut d = doc();
    d.metadata.insert("node_type".to_string(), "method".to_string());
    let parsed: BTreeMap<String, String> = serde_json::from_str(&d.metadata_json()).unwrap();
    assert_eq!(parsed.get("node_type").map(String::as_str), Some("method"));
  }

  #[test]
  fn test_sparse_field_skipped_when_absent() {
    let json = serde_json::to_string(&doc()).unwrap();
    assert!(!json.contains("sparse"));
  }
}

//! Scalar filter expressions.
//!
//! The grammar is intentionally tiny: field equality and list membership
//! over string-typed fields.
//!
//! ```text
//! relative_path == "src/main.rs"
//! id in ["chunk_a", "chunk_b"]
//! ```
//!
//! Both quote styles are accepted; there is no escaping.

use codectx_core::VectorDocument;

use crate::StorageError;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
  Eq { field: String, value: String },
  In { field: String, values: Vec<String> },
}

impl Filter {
  pub fn parse(expr: &str) -> Result<Self, StorageError> {
    let expr = expr.trim();
    if expr.is_empty() {
      return Err(StorageError::InvalidFilter("empty expression".to_string()));
    }

    if let Some((lhs, rhs)) = expr.split_once("==") {
      let field = parse_field(lhs, expr)?;
      let value = parse_string_literal(rhs.trim(), expr)?;
      return Ok(Filter::Eq { field, value });
    }

    if let Some((lhs, rhs)) = split_once_keyword(expr, " in ") {
      let field = parse_field(lhs, expr)?;
      let values = parse_string_list(rhs.trim(), expr)?;
      return Ok(Filter::In { field, values });
    }

    Err(StorageError::InvalidFilter(format!(
      "expected `field == \"value\"` or `field in [..]`, got `{expr}`"
    )))
  }

  /// Evaluate against a document's string fields.
  pub fn matches(&self, document: &VectorDocument) -> bool {
    match self {
      Filter::Eq { field, value } => field_value(document, field).is_some_and(|v| v == *value),
      Filter::In { field, values } => field_value(document, field).is_some_and(|v| values.iter().any(|c| *c == v)),
    }
  }
}

/// String value of a filterable field.
pub fn field_value(document: &VectorDocument, field: &str) -> Option<String> {
  match field {
    "id" => Some(document.id.clone()),
    "relative_path" => Some(document.relative_path.clone()),
    "file_extension" => Some(document.file_extension.clone()),
    "content" => Some(document.content.clone()),
    "start_line" => Some(document.start_line.to_string()),
    "end_line" => Some(document.end_line.to_string()),
    "metadata" => Some(document.metadata_json()),
    _ => None,
  }
}

fn parse_field(raw: &str, expr: &str) -> Result<String, StorageError> {
  let field = raw.trim();
  if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
    return Err(StorageError::InvalidFilter(format!("bad field name in `{expr}`")));
  }
  Ok(field.to_string())
}

fn parse_string_literal(raw: &str, expr: &str) -> Result<String, StorageError> {
  for quote in ['"', '\''] {
    if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
      return Ok(raw[1..raw.len() - 1].to_string());
    }
  }
  Err(StorageError::InvalidFilter(format!("expected quoted string in `{expr}`")))
}

fn parse_string_list(raw: &str, expr: &str) -> Result<Vec<String>, StorageError> {
  let Some(inner) = raw.strip_prefix('[').and_then(|r| r.strip_suffix(']')) else {
    return Err(StorageError::InvalidFilter(format!("expected [..] list in `{expr}`")));
  };
  let inner = inner.trim();
  if inner.is_empty() {
    return Ok(Vec::new());
  }
  inner
    .split(',')
    .map(|item| parse_string_literal(item.trim(), expr))
    .collect()
}

/// Case-sensitive keyword split that ignores keyword text inside quotes.
fn split_once_keyword<'a>(expr: &'a str, keyword: &str) -> Option<(&'a str, &'a str)> {
  let mut in_quote: Option<char> = None;
  let bytes = expr.as_bytes();
  for i in 0..bytes.len() {
    let c = bytes[i] as char;
    match in_quote {
      Some(q) if c == q => in_quote = None,
      Some(_) => {}
      None if c == '"' || c == '\'' => in_quote = Some(c),
      None => {
        if expr.is_char_boundary(i) && expr[i..].starts_with(keyword) {
          return Some((&expr[..i], &expr[i + keyword.len()..]));
        }
      }
    }
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  fn doc(relative_path: &str) -> VectorDocument {
    VectorDocument {
      id: format!("chunk_{relative_path}"),
      vector: vec![1.0],
      content: "body".to_string(),
      relative_path: relative_path.to_string(),
      start_line: 1,
      end_line: 2,
      file_extension: "rs".to_string(),
      metadata: BTreeMap::new(),
      sparse: None,
    }
  }

  #[test]
  fn test_parse_equality() {
    let filter = Filter::parse("relative_path == \"src/main.rs\"").unwrap();
    assert_eq!(
      filter,
      Filter::Eq {
        field: "relative_path".to_string(),
        value: "src/main.rs".to_string(),
      }
    );
  }

  #[test]
  fn test_parse_equality_single_quotes() {
    let filter = Filter::parse("file_extension == 'rs'").unwrap();
    assert!(filter.matches(&doc("src/lib.rs")));
  }

  #[test]
  fn test_parse_in_list() {
    let filter = Filter::parse("id in [\"chunk_a\", \"chunk_b\"]").unwrap();
    assert_eq!(
      filter,
      Filter::In {
        field: "id".to_string(),
        values: vec!["chunk_a".to_string(), "chunk_b".to_string()],
      }
    );
  }

  #[test]
  fn test_empty_in_list_matches_nothing() {
    let filter = Filter::parse("id in []").unwrap();
    assert!(!filter.matches(&doc("src/main.rs")));
  }

  #[test]
  fn test_invalid_expressions() {
    assert!(Filter::parse("").is_err());
    assert!(Filter::parse("relative_path = \"x\"").is_err());
    assert!(Filter::parse("relative_path == unquoted").is_err());
    assert!(Filter::parse("id in (\"a\")").is_err());
    assert!(Filter::parse("drop table; == \"x\"").is_err());
  }

  #[test]
  fn test_matches_path_equality() {
    let filter = Filter::parse("relative_path == \"src/main.rs\"").unwrap();
    assert!(filter.matches(&doc("src/main.rs")));
    assert!(!filter.matches(&doc("src/lib.rs")));
  }

  #[test]
  fn test_keyword_inside_quotes_not_split() {
    let filter = Filter::parse("relative_path == \"dir with in it/x.rs\"").unwrap();
    assert!(matches!(filter, Filter::Eq { .. }));
  }

  #[test]
  fn test_numeric_fields_render_as_strings() {
    let filter = Filter::parse("start_line == \"1\"").unwrap();
    assert!(filter.matches(&doc("a.rs")));
  }

  #[test]
  fn test_unknown_field_never_matches() {
    let filter = Filter::parse("missing == \"x\"").unwrap();
    assert!(!filter.matches(&doc("a.rs")));
  }
}

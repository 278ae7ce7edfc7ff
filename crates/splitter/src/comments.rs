//! Leading-comment scanning for chunk extension.

use codectx_core::Language;

/// Scan upward from the line above `node_start_idx` (0-based) through a
/// contiguous comment block and return the 0-based index of its first line.
///
/// `min_idx` is the first index the scan may claim; lines below it belong to
/// an earlier chunk. Blank lines terminate the scan outside a block comment
/// and continue it inside one. Returns `None` when no comment directly
/// precedes the node.
pub fn leading_comment_start(lines: &[&str], node_start_idx: usize, min_idx: usize, language: Language) -> Option<usize> {
  let mut first: Option<usize> = None;
  let mut in_block = false;
  let mut i = node_start_idx;

  while i > min_idx {
    let line = lines[i - 1].trim();

    if in_block {
      first = Some(i - 1);
      if line.starts_with("/*") {
        in_block = false;
      }
      i -= 1;
      continue;
    }

    if line.is_empty() {
      break;
    }

    if line.ends_with("*/") {
      first = Some(i - 1);
      // A one-line `/* ... */` closes immediately; otherwise keep scanning
      // until the opening marker.
      if !line.contains("/*") {
        in_block = true;
      }
      i -= 1;
      continue;
    }

    if is_line_comment(line, language) || line.starts_with('*') {
      first = Some(i - 1);
      i -= 1;
      continue;
    }

    break;
  }

  // An unterminated block scan means the `*/` had no matching `/*` above the
  // node; treat whatever was collected as the comment block anyway.
  first
}

fn is_line_comment(trimmed: &str, language: Language) -> bool {
  match language {
    Language::Python | Language::Ruby | Language::Shell | Language::Yaml | Language::Toml => trimmed.starts_with('#'),
    Language::Sql => trimmed.starts_with("--"),
    _ => trimmed.starts_with("//"),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn lines(source: &str) -> Vec<&str> {
    source.lines().collect()
  }

  #[test]
  fn test_no_comment_above() {
    let src = lines("let x = 1;\nfn main() {}");
    assert_eq!(leading_comment_start(&src, 1, 0, Language::Rust), None);
  }

  #[test]
  fn test_single_line_comment() {
    let src = lines("// entry point\nfn main() {}");
    assert_eq!(leading_comment_start(&src, 1, 0, Language::Rust), Some(0));
  }

  #[test]
  fn test_doc_comment_block() {
    let src = lines("/// First\n/// Second\nfn main() {}");
    assert_eq!(leading_comment_start(&src, 2, 0, Language::Rust), Some(0));
  }

  #[test]
  fn test_block_comment_with_blank_line_inside() {
    let src = lines("/*\n * part one\n\n * part two\n */\nfn main() {}");
    assert_eq!(leading_comment_start(&src, 5, 0, Language::Rust), Some(0));
  }

  #[test]
  fn test_blank_line_terminates_outside_block() {
    let src = lines("// unrelated\n\nfn main() {}");
    assert_eq!(leading_comment_start(&src, 2, 0, Language::Rust), None);
  }

  #[test]
  fn test_stops_at_code() {
    let src = lines("let y = 2;\n// note\nfn main() {}");
    assert_eq!(leading_comment_start(&src, 2, 0, Language::Rust), Some(1));
  }

  #[test]
  fn test_min_idx_floor_respected() {
    let src = lines("// claimed by earlier chunk\n// mine\nfn main() {}");
    assert_eq!(leading_comment_start(&src, 2, 1, Language::Rust), Some(1));
  }

  #[test]
  fn test_hash_comments_for_python() {
    let src = lines("# helper\n# does things\ndef f():\n    pass");
    assert_eq!(leading_comment_start(&src, 2, 0, Language::Python), Some(0));
    // Hash is not a comment marker in Rust.
    assert_eq!(leading_comment_start(&src, 2, 0, Language::Rust), None);
  }

  #[test]
  fn test_javadoc_block() {
    let src = lines("/**\n * Doc.\n */\npublic class A {}");
    assert_eq!(leading_comment_start(&src, 3, 0, Language::Java), Some(0));
  }
}

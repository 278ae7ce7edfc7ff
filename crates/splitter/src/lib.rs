//! AST-aware code splitting.
//!
//! Parses a file with tree-sitter and carves it into chunks at declaration
//! boundaries: classes, interfaces, methods, constructors, top-level
//! functions. Methods nested inside a class are emitted as sibling chunks;
//! the class itself becomes a header chunk ending where its first nested
//! declaration (including that declaration's leading comment) begins. Each
//! chunk is extended upward over the contiguous comment block immediately
//! above it.
//!
//! When no grammar is available, parsing fails outright, or a file contains
//! no recognized declarations, the whole file is split by a character-window
//! line splitter instead.

mod comments;
mod languages;
mod window;

use std::collections::HashMap;

use codectx_core::{CodeChunk, Language, NodeType};
use languages::NodeRole;
use tracing::debug;
use tree_sitter::{Node, Parser};

/// Recursion guard for pathological trees (minified sources).
const MAX_WALK_DEPTH: usize = 64;

#[derive(Debug, Clone)]
pub struct SplitterConfig {
  /// Window-splitter chunk size in characters.
  pub chunk_size: usize,
  /// Window-splitter overlap in characters.
  pub chunk_overlap: usize,
  /// AST nodes larger than this are subdivided by the window rules.
  pub max_node_chars: usize,
}

impl Default for SplitterConfig {
  fn default() -> Self {
    Self {
      chunk_size: 2500,
      chunk_overlap: 300,
      max_node_chars: 10_000,
    }
  }
}

/// A chunkable node recorded during the tree walk.
struct RawNode {
  start_line: u32,
  end_line: u32,
  byte_start: usize,
  node_type: NodeType,
  node_name: Option<String>,
  container: bool,
  /// Start line of the earliest chunkable descendant, for containers.
  first_inner_start: Option<u32>,
}

/// Splits source text into [`CodeChunk`]s.
///
/// Parsers are created lazily per language and reused across files.
pub struct Splitter {
  config: SplitterConfig,
  parsers: HashMap<Language, Parser>,
}

impl Default for Splitter {
  fn default() -> Self {
    Self::new(SplitterConfig::default())
  }
}

impl Splitter {
  pub fn new(config: SplitterConfig) -> Self {
    Self {
      config,
      parsers: HashMap::new(),
    }
  }

  /// Split `source` into ordered, non-overlapping chunks.
  ///
  /// Infallible: any parse problem degrades to the window splitter rather
  /// than failing the file.
  pub fn split(&mut self, source: &str, language: Language, file_path: &str) -> Vec<CodeChunk> {
    if source.trim().is_empty() {
      return Vec::new();
    }

    let lines: Vec<&str> = source.lines().collect();

    let Some(parser) = self.parser_for(language) else {
      return self.window_split(&lines, language, file_path);
    };

    let Some(tree) = parser.parse(source, None) else {
      debug!(file = file_path, "parser returned no tree, using window splitter");
      return self.window_split(&lines, language, file_path);
    };

    let root = tree.root_node();
    if root.is_error() {
      debug!(file = file_path, "fatal parse error, using window splitter");
      return self.window_split(&lines, language, file_path);
    }

    let mut nodes = Vec::new();
    collect_nodes(language, &root, source, &mut nodes, 0);

    if nodes.is_empty() {
      return self.window_split(&lines, language, file_path);
    }

    nodes.sort_by_key(|n| (n.start_line, n.byte_start));

    let mut chunks = Vec::new();
    // Highest 1-based line already covered or attributed; comment extension
    // never reaches back into it, which gives each comment block exactly one
    // owner (the chunk that follows it).
    let mut claimed_end: u32 = 0;

    for node in &nodes {
      let start = comments::leading_comment_start(&lines, (node.start_line - 1) as usize, claimed_end as usize, language)
        .map(|idx| idx as u32 + 1)
        .unwrap_or(node.start_line);

      let end = if node.container {
        match node.first_inner_start {
          Some(inner) => {
            let inner_start =
              comments::leading_comment_start(&lines, (inner - 1) as usize, node.start_line as usize, language)
                .map(|idx| idx as u32 + 1)
                .unwrap_or(inner);
            inner_start.saturating_sub(1).max(node.start_line)
          }
          None => node.end_line,
        }
      } else {
        node.end_line
      };

      self.push_chunk(
        &mut chunks,
        &lines,
        language,
        file_path,
        start,
        end,
        Some(node.node_type),
        node.node_name.clone(),
      );
      claimed_end = claimed_end.max(end);
    }

    chunks.sort_by_key(|c| (c.start_line, c.end_line));
    chunks
  }

  fn parser_for(&mut self, language: Language) -> Option<&mut Parser> {
    if !self.parsers.contains_key(&language) {
      let grammar = languages::grammar_for(language)?;
      let mut parser = Parser::new();
      if parser.set_language(&grammar).is_err() {
        debug!(language = language.as_str(), "grammar rejected by parser");
        return None;
      }
      self.parsers.insert(language, parser);
    }
    self.parsers.get_mut(&language)
  }

  /// Window-splitter fallback over a whole file.
  fn window_split(&self, lines: &[&str], language: Language, file_path: &str) -> Vec<CodeChunk> {
    let mut chunks = Vec::new();
    for (start_idx, end_idx) in window::window_ranges(lines, self.config.chunk_size, self.config.chunk_overlap) {
      self.push_window(
        &mut chunks,
        lines,
        language,
        file_path,
        start_idx as u32 + 1,
        end_idx as u32 + 1,
        None,
        None,
      );
    }
    chunks
  }

  /// Emit one chunk, subdividing oversized nodes by the window rules.
  #[allow(clippy::too_many_arguments)]
  fn push_chunk(
    &self,
    chunks: &mut Vec<CodeChunk>,
    lines: &[&str],
    language: Language,
    file_path: &str,
    start_line: u32,
    end_line: u32,
    node_type: Option<NodeType>,
    node_name: Option<String>,
  ) {
    let slice = &lines[(start_line - 1) as usize..end_line as usize];
    let total_chars: usize = slice.iter().map(|l| l.len() + 1).sum();

    if total_chars > self.config.max_node_chars {
      for (rel_start, rel_end) in window::window_ranges(slice, self.config.chunk_size, self.config.chunk_overlap) {
        self.push_window(
          chunks,
          lines,
          language,
          file_path,
          start_line + rel_start as u32,
          start_line + rel_end as u32,
          node_type,
          node_name.clone(),
        );
      }
    } else {
      self.push_window(chunks, lines, language, file_path, start_line, end_line, node_type, node_name);
    }
  }

  #[allow(clippy::too_many_arguments)]
  fn push_window(
    &self,
    chunks: &mut Vec<CodeChunk>,
    lines: &[&str],
    language: Language,
    file_path: &str,
    start_line: u32,
    mut end_line: u32,
    node_type: Option<NodeType>,
    node_name: Option<String>,
  ) {
    // Trailing empty lines would break the span/line-count invariant once
    // joined, so the range shrinks past them.
    while end_line > start_line && lines[(end_line - 1) as usize].is_empty() {
      end_line -= 1;
    }

    let content = lines[(start_line - 1) as usize..end_line as usize].join("\n");
    if content.trim().is_empty() {
      return;
    }

    chunks.push(CodeChunk {
      content,
      language,
      file_path: file_path.to_string(),
      start_line,
      end_line,
      node_type,
      node_name,
    });
  }
}

fn collect_nodes(language: Language, node: &Node, source: &str, out: &mut Vec<RawNode>, depth: usize) {
  if depth > MAX_WALK_DEPTH {
    return;
  }

  let mut cursor = node.walk();
  for child in node.named_children(&mut cursor) {
    match languages::classify(language, &child, source) {
      Some((NodeRole::Leaf, node_type)) => {
        out.push(raw_node(language, &child, source, node_type, false));
      }
      Some((NodeRole::Container, node_type)) => {
        let idx = out.len();
        out.push(raw_node(language, &child, source, node_type, true));
        let before = out.len();
        collect_nodes(language, &child, source, out, depth + 1);
        out[idx].first_inner_start = out[before..].iter().map(|n| n.start_line).min();
      }
      None => collect_nodes(language, &child, source, out, depth + 1),
    }
  }
}

fn raw_node(language: Language, node: &Node, source: &str, node_type: NodeType, container: bool) -> RawNode {
  RawNode {
    start_line: node.start_position().row as u32 + 1,
    end_line: node.end_position().row as u32 + 1,
    byte_start: node.start_byte(),
    node_type,
    node_name: languages::node_name(language, node, source),
    container,
    first_inner_start: None,
  }
}

//! Per-language grammar loading and chunkable-node classification.

use codectx_core::{Language, NodeType};
use tree_sitter::Node;

/// How a chunkable node participates in splitting.
///
/// `Container` nodes may hold further chunkable nodes (class bodies, impl
/// blocks); the walk descends into them and they are emitted as header
/// chunks. `Leaf` nodes are emitted whole and the walk does not descend, so
/// closures and local functions stay inside their parent chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
  Leaf,
  Container,
}

/// Load the tree-sitter grammar for a language, if one is compiled in.
pub fn grammar_for(language: Language) -> Option<tree_sitter::Language> {
  match language {
    Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
    Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
    Language::JavaScript | Language::Jsx => Some(tree_sitter_javascript::LANGUAGE.into()),
    Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
    Language::Tsx => Some(tree_sitter_typescript::LANGUAGE_TSX.into()),
    Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
    Language::Java => Some(tree_sitter_java::LANGUAGE.into()),
    Language::C => Some(tree_sitter_c::LANGUAGE.into()),
    Language::Cpp => Some(tree_sitter_cpp::LANGUAGE.into()),
    _ => None,
  }
}

/// Classify a node as chunkable (and how) for the given language.
///
/// Returns `None` for nodes that are not chunk boundaries; the walk recurses
/// through those looking for nested declarations (export wrappers, inline
/// modules, decorated definitions).
pub fn classify(language: Language, node: &Node, source: &str) -> Option<(NodeRole, NodeType)> {
  let kind = node.kind();
  match language {
    Language::Rust => match kind {
      "function_item" => Some((NodeRole::Leaf, NodeType::Method)),
      "struct_item" | "enum_item" | "union_item" => Some((NodeRole::Leaf, NodeType::Class)),
      "impl_item" => Some((NodeRole::Container, NodeType::Class)),
      "trait_item" => Some((NodeRole::Container, NodeType::Interface)),
      _ => None,
    },
    Language::Python => match kind {
      "function_definition" => {
        let node_type = match name_text(node, source) {
          Some("__init__") => NodeType::Constructor,
          _ => NodeType::Method,
        };
        Some((NodeRole::Leaf, node_type))
      }
      "class_definition" => Some((NodeRole::Container, NodeType::Class)),
      _ => None,
    },
    Language::JavaScript | Language::Jsx | Language::TypeScript | Language::Tsx => match kind {
      "function_declaration" | "generator_function_declaration" => Some((NodeRole::Leaf, NodeType::Method)),
      "method_definition" => {
        let node_type = match name_text(node, source) {
          Some("constructor") => NodeType::Constructor,
          _ => NodeType::Method,
        };
        Some((NodeRole::Leaf, node_type))
      }
      "class_declaration" | "abstract_class_declaration" => Some((NodeRole::Container, NodeType::Class)),
      "interface_declaration" => Some((NodeRole::Leaf, NodeType::Interface)),
      "enum_declaration" => Some((NodeRole::Leaf, NodeType::Class)),
      _ => None,
    },
    Language::Go => match kind {
      "function_declaration" | "method_declaration" => Some((NodeRole::Leaf, NodeType::Method)),
      "type_declaration" => {
        let node_type = if has_descendant_kind(node, "interface_type") {
          NodeType::Interface
        } else if has_descendant_kind(node, "struct_type") {
          NodeType::Class
        } else {
          NodeType::Unknown
        };
        Some((NodeRole::Leaf, node_type))
      }
      _ => None,
    },
    Language::Java => match kind {
      "class_declaration" | "enum_declaration" => Some((NodeRole::Container, NodeType::Class)),
      "interface_declaration" => Some((NodeRole::Container, NodeType::Interface)),
      "method_declaration" => Some((NodeRole::Leaf, NodeType::Method)),
      "constructor_declaration" => Some((NodeRole::Leaf, NodeType::Constructor)),
      _ => None,
    },
    Language::C => match kind {
      "function_definition" => Some((NodeRole::Leaf, NodeType::Method)),
      _ => None,
    },
    Language::Cpp => match kind {
      "function_definition" => Some((NodeRole::Leaf, NodeType::Method)),
      // Only specifiers with a body are definitions; bare `class Foo;` is a reference.
      "class_specifier" | "struct_specifier" if node.child_by_field_name("body").is_some() => {
        Some((NodeRole::Container, NodeType::Class))
      }
      _ => None,
    },
    _ => None,
  }
}

/// Extract the declared name of a chunkable node.
pub fn node_name(language: Language, node: &Node, source: &str) -> Option<String> {
  if let Some(text) = name_text(node, source) {
    return Some(text.to_string());
  }
  match language {
    // `impl Foo for Bar` has no name field; use the implemented type.
    Language::Rust => node
      .child_by_field_name("type")
      .and_then(|n| n.utf8_text(source.as_bytes()).ok())
      .map(|s| s.to_string()),
    // C/C++ bury the name inside nested declarators.
    Language::C | Language::Cpp => node
      .child_by_field_name("declarator")
      .and_then(|d| find_identifier(&d, source))
      .map(|s| s.to_string()),
    // Go type declarations name the inner type_spec.
    Language::Go => {
      let mut cursor = node.walk();
      let found = node
        .named_children(&mut cursor)
        .find(|c| c.kind() == "type_spec")
        .and_then(|spec| spec.child_by_field_name("name"))
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .map(|s| s.to_string());
      found
    }
    _ => None,
  }
}

fn name_text<'a>(node: &Node, source: &'a str) -> Option<&'a str> {
  node
    .child_by_field_name("name")
    .and_then(|n| n.utf8_text(source.as_bytes()).ok())
}

fn find_identifier<'a>(node: &Node, source: &'a str) -> Option<&'a str> {
  if node.kind().ends_with("identifier") {
    return node.utf8_text(source.as_bytes()).ok();
  }
  let mut cursor = node.walk();
  for child in node.named_children(&mut cursor) {
    if let Some(found) = find_identifier(&child, source) {
      return Some(found);
    }
  }
  None
}

fn has_descendant_kind(node: &Node, kind: &str) -> bool {
  if node.kind() == kind {
    return true;
  }
  let mut cursor = node.walk();
  for child in node.named_children(&mut cursor) {
    if has_descendant_kind(&child, kind) {
      return true;
    }
  }
  false
}

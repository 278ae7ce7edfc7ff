use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute the full sha256 hex digest of raw file bytes.
///
/// Used by the file synchronizer to detect content changes independently of
/// mtime or checkout timestamps.
pub fn content_hash(bytes: &[u8]) -> String {
  let mut hasher = Sha256::new();
  hasher.update(bytes);
  hex::encode(hasher.finalize())
}

/// Deterministic document id for a chunk.
///
/// `chunk_` + first 16 hex chars of `sha256(relative_path:start:end:content)`.
/// The id is a pure function of its inputs, so re-emitting the same chunk
/// upserts instead of duplicating, and partial runs are safely restartable.
pub fn chunk_id(relative_path: &str, start_line: u32, end_line: u32, content: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(relative_path.as_bytes());
  hasher.update(b":");
  hasher.update(start_line.to_string().as_bytes());
  hasher.update(b":");
  hasher.update(end_line.to_string().as_bytes());
  hasher.update(b":");
  hasher.update(content.as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("chunk_{}", &digest[..16])
}

/// The kind of AST node a chunk was carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
  Class,
  Interface,
  Method,
  Constructor,
  Unknown,
}

impl NodeType {
  pub fn as_str(&self) -> &'static str {
    match self {
      NodeType::Class => "class",
      NodeType::Interface => "interface",
      NodeType::Method => "method",
      NodeType::Constructor => "constructor",
      NodeType::Unknown => "unknown",
    }
  }
}

/// A contiguous slice of a source file produced by the splitter.
///
/// Lines are 1-based and inclusive. After leading-comment extension the
/// content always spans exactly `end_line - start_line + 1` lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunk {
  pub content: String,
  pub language: Language,
  pub file_path: String,
  pub start_line: u32,
  pub end_line: u32,
  #[serde(default)]
  pub node_type: Option<NodeType>,
  #[serde(default)]
  pub node_name: Option<String>,
}

impl CodeChunk {
  /// Number of lines this chunk spans.
  pub fn line_count(&self) -> u32 {
    self.end_line - self.start_line + 1
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
  Rust,
  Python,
  JavaScript,
  Jsx,
  TypeScript,
  Tsx,
  Go,
  Java,
  C,
  Cpp,
  CSharp,
  Ruby,
  Php,
  Swift,
  Kotlin,
  Scala,
  Shell,
  Markdown,
  Json,
  Yaml,
  Toml,
  Html,
  Css,
  Sql,
  /// Catch-all for indexable files with no grammar; always window-split.
  Text,
}

impl Language {
  pub fn from_extension(ext: &str) -> Option<Self> {
    match ext.trim_start_matches('.').to_lowercase().as_str() {
      "rs" => Some(Language::Rust),
      "py" | "pyi" => Some(Language::Python),
      "js" | "mjs" | "cjs" => Some(Language::JavaScript),
      "jsx" => Some(Language::Jsx),
      "ts" | "mts" => Some(Language::TypeScript),
      "tsx" => Some(Language::Tsx),
      "go" => Some(Language::Go),
      "java" => Some(Language::Java),
      "c" | "h" => Some(Language::C),
      "cpp" | "cc" | "cxx" | "hpp" | "hxx" => Some(Language::Cpp),
      "cs" => Some(Language::CSharp),
      "rb" | "rake" => Some(Language::Ruby),
      "php" => Some(Language::Php),
      "swift" => Some(Language::Swift),
      "kt" | "kts" => Some(Language::Kotlin),
      "scala" | "sc" => Some(Language::Scala),
      "sh" | "bash" | "zsh" => Some(Language::Shell),
      "md" | "markdown" => Some(Language::Markdown),
      "json" | "jsonc" => Some(Language::Json),
      "yaml" | "yml" => Some(Language::Yaml),
      "toml" => Some(Language::Toml),
      "html" | "htm" => Some(Language::Html),
      "css" | "scss" => Some(Language::Css),
      "sql" => Some(Language::Sql),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Language::Rust => "rust",
      Language::Python => "python",
      Language::JavaScript => "javascript",
      Language::Jsx => "jsx",
      Language::TypeScript => "typescript",
      Language::Tsx => "tsx",
      Language::Go => "go",
      Language::Java => "java",
      Language::C => "c",
      Language::Cpp => "cpp",
      Language::CSharp => "csharp",
      Language::Ruby => "ruby",
      Language::Php => "php",
      Language::Swift => "swift",
      Language::Kotlin => "kotlin",
      Language::Scala => "scala",
      Language::Shell => "shell",
      Language::Markdown => "markdown",
      Language::Json => "json",
      Language::Yaml => "yaml",
      Language::Toml => "toml",
      Language::Html => "html",
      Language::Css => "css",
      Language::Sql => "sql",
      Language::Text => "text",
    }
  }
}

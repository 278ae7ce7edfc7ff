//! Traversal filtering with gitignore semantics.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use codectx_core::IndexConfig;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::IndexError;

/// Patterns applied to every codebase before user patterns.
///
/// Trailing `/` marks directory patterns; a pattern without `/` matches a
/// basename at any depth, and `.*` covers dotfiles and dot-directories.
const DEFAULT_PATTERNS: &[&str] = &[
  // Version control
  ".git/",
  ".hg/",
  ".svn/",
  // Dependencies
  "node_modules/",
  "vendor/",
  "venv/",
  // Build outputs
  "target/",
  "dist/",
  "build/",
  "out/",
  "__pycache__/",
  // Dotfiles and caches
  ".*",
  // Generated artifacts
  "*.min.js",
  "*.min.css",
  "*.map",
  "*.lock",
  "package-lock.json",
];

/// Compiled ignore matcher plus traversal for one codebase root.
pub struct IgnoreEngine {
  root: PathBuf,
  matcher: Gitignore,
}

impl IgnoreEngine {
  /// Build the matcher from the default denylist, the codebase's own
  /// `.gitignore` when present, and user patterns (deduplicated, in order).
  pub fn new(root: &Path, user_patterns: &[String]) -> Self {
    let mut builder = GitignoreBuilder::new(root);

    let mut seen: HashSet<&str> = HashSet::new();
    for pattern in DEFAULT_PATTERNS {
      if seen.insert(pattern) {
        let _ = builder.add_line(None, pattern);
      }
    }
    for pattern in user_patterns {
      if seen.insert(pattern.as_str()) && builder.add_line(None, pattern).is_err() {
        warn!(pattern = %pattern, "skipping malformed ignore pattern");
      }
    }

    let gitignore_path = root.join(".gitignore");
    if gitignore_path.exists() {
      let _ = builder.add(&gitignore_path);
    }

    let matcher = builder.build().unwrap_or_else(|err| {
      warn!(error = %err, "ignore matcher build failed, using defaults only");
      let mut fallback = GitignoreBuilder::new(root);
      for pattern in DEFAULT_PATTERNS {
        let _ = fallback.add_line(None, pattern);
      }
      fallback.build().expect("default ignore patterns are well-formed")
    });

    Self {
      root: root.to_path_buf(),
      matcher,
    }
  }

  /// Whether `path` (absolute or codebase-relative) is excluded.
  pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
    let relative = path.strip_prefix(&self.root).unwrap_or(path);
    self.matcher.matched_path_or_any_parents(relative, is_dir).is_ignore()
  }

  /// Enumerate indexable files under the root.
  ///
  /// Returns codebase-relative paths, sorted lexicographically so traversal
  /// order is reproducible across platforms and runs. Ignored directories
  /// are pruned without descending.
  pub fn enumerate(&self, config: &IndexConfig) -> Result<Vec<PathBuf>, IndexError> {
    let mut files = Vec::new();

    let walker = WalkDir::new(&self.root)
      .follow_links(false)
      .into_iter()
      .filter_entry(|entry| entry.path() == self.root || !self.is_ignored(entry.path(), entry.file_type().is_dir()));

    for entry in walker {
      let entry = match entry {
        Ok(entry) => entry,
        Err(err) => {
          warn!(error = %err, "skipping unreadable directory entry");
          continue;
        }
      };
      if !entry.file_type().is_file() {
        continue;
      }
      let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) else {
        continue;
      };
      if !config.supports_extension(ext) {
        continue;
      }
      let relative = entry
        .path()
        .strip_prefix(&self.root)
        .map_err(|_| IndexError::Path(format!("entry {} escapes codebase root", entry.path().display())))?;
      files.push(relative.to_path_buf());
    }

    files.sort();
    debug!(count = files.len(), root = %self.root.display(), "enumerated files");
    Ok(files)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::TempDir;

  fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, "fn x() {}\n").unwrap();
  }

  #[test]
  fn test_default_denylist() {
    let dir = TempDir::new().unwrap();
    let engine = IgnoreEngine::new(dir.path(), &[]);

    assert!(engine.is_ignored(&dir.path().join(".git/config"), false));
    assert!(engine.is_ignored(&dir.path().join("node_modules/pkg/index.js"), false));
    assert!(engine.is_ignored(&dir.path().join("target/debug/main"), false));
    assert!(engine.is_ignored(&dir.path().join("src/app.min.js"), false));
    assert!(engine.is_ignored(&dir.path().join(".hidden"), false));

    assert!(!engine.is_ignored(&dir.path().join("src/main.rs"), false));
  }

  #[test]
  fn test_user_patterns_merged() {
    let dir = TempDir::new().unwrap();
    let engine = IgnoreEngine::new(dir.path(), &["generated/".to_string(), "*.gen.rs".to_string()]);

    assert!(engine.is_ignored(&dir.path().join("generated/types.rs"), false));
    assert!(engine.is_ignored(&dir.path().join("src/schema.gen.rs"), false));
    assert!(!engine.is_ignored(&dir.path().join("src/schema.rs"), false));
  }

  #[test]
  fn test_rooted_pattern_with_slash() {
    let dir = TempDir::new().unwrap();
    let engine = IgnoreEngine::new(dir.path(), &["docs/internal/".to_string()]);

    assert!(engine.is_ignored(&dir.path().join("docs/internal/notes.md"), false));
    assert!(!engine.is_ignored(&dir.path().join("other/docs/file.md"), false));
  }

  #[test]
  fn test_codebase_gitignore_is_loaded() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(".gitignore"), "secret/\n*.tmp\n").unwrap();
    let engine = IgnoreEngine::new(dir.path(), &[]);

    assert!(engine.is_ignored(&dir.path().join("secret/keys.rs"), false));
    assert!(engine.is_ignored(&dir.path().join("scratch.tmp"), false));
  }

  #[test]
  fn test_enumerate_filters_and_sorts() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "src/zeta.rs");
    touch(dir.path(), "src/alpha.rs");
    touch(dir.path(), "build/out.js");
    touch(dir.path(), "notes.txt");
    touch(dir.path(), "lib/util.py");

    let engine = IgnoreEngine::new(dir.path(), &[]);
    let files = engine.enumerate(&IndexConfig::default()).unwrap();

    assert_eq!(
      files,
      vec![
        PathBuf::from("lib/util.py"),
        PathBuf::from("src/alpha.rs"),
        PathBuf::from("src/zeta.rs"),
      ]
    );
  }

  #[test]
  fn test_enumerate_never_descends_into_ignored_dirs() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "build/deep/nested/out.rs");
    touch(dir.path(), "src/main.rs");

    let engine = IgnoreEngine::new(dir.path(), &["build/**".to_string()]);
    let files = engine.enumerate(&IndexConfig::default()).unwrap();

    assert_eq!(files, vec![PathBuf::from("src/main.rs")]);
  }

  #[test]
  fn test_duplicate_user_patterns_tolerated() {
    let dir = TempDir::new().unwrap();
    let patterns = vec!["target/".to_string(), "target/".to_string(), ".git/".to_string()];
    let engine = IgnoreEngine::new(dir.path(), &patterns);
    assert!(engine.is_ignored(&dir.path().join("target/x.rs"), false));
  }
}

//! Pipeline orchestrator.
//!
//! Single-task streaming: walk files, split, buffer chunks, and flush the
//! buffer through `embed_batch` + `insert` whenever it reaches the
//! configured batch size. Peak memory stays proportional to
//! `embed_batch x avg chunk size` regardless of repository size.
//! Suspension happens only at outbound calls (file reads, embedding,
//! store operations, snapshot commit); splitting itself never yields.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codectx_core::{CodeChunk, IndexConfig, Language, VectorDocument, chunk_id, collection_name, content_hash};
use embedding::Embedder;
use splitter::{Splitter, SplitterConfig};
use store::{Bm25LiteEncoder, SparseEncoder, VectorStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collection::CollectionManager;
use crate::ignore::IgnoreEngine;
use crate::sync::FileSynchronizer;
use crate::{IndexError, Searcher};

pub type ProgressCallback = Arc<dyn Fn(IndexProgress) + Send + Sync>;

/// Optional pre-embedding transform.
///
/// Returning `Some(text)` embeds `text` in place of the chunk content; the
/// persisted document always keeps the original content either way.
pub type ChunkTransform = Arc<dyn Fn(&CodeChunk) -> Option<String> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexProgress {
  pub phase: String,
  pub current: u64,
  pub total: u64,
  /// Monotonically non-decreasing within one call, in `[0, 100]`.
  pub percentage: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexStatus {
  #[default]
  Completed,
  Aborted,
}

#[derive(Debug, Default)]
pub struct IndexOutcome {
  /// Files whose chunks reached the buffer (skipped files excluded).
  pub indexed_files: usize,
  /// Chunks actually persisted; failed batches do not count.
  pub total_chunks: usize,
  pub status: IndexStatus,
  /// One entry per failed embed/insert batch.
  pub batch_errors: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ReindexOutcome {
  pub added: usize,
  pub removed: usize,
  pub modified: usize,
  pub status: IndexStatus,
  pub batch_errors: Vec<String>,
}

/// Emits progress with a monotone percentage.
struct ProgressTracker {
  callback: Option<ProgressCallback>,
  last: u8,
}

impl ProgressTracker {
  fn new(callback: Option<ProgressCallback>) -> Self {
    Self { callback, last: 0 }
  }

  fn emit(&mut self, phase: &str, current: u64, total: u64, percentage: u8) {
    let percentage = percentage.clamp(self.last, 100);
    self.last = percentage;
    if let Some(callback) = &self.callback {
      callback(IndexProgress {
        phase: phase.to_string(),
        current,
        total,
        percentage,
      });
    }
  }
}

/// A chunk waiting in the flush buffer.
struct PendingChunk {
  chunk: CodeChunk,
  relative_path: String,
  embed_text: Option<String>,
}

/// Result of streaming a file list through the pipeline.
struct RunStats {
  indexed_files: usize,
  persisted_chunks: usize,
  hashes: BTreeMap<String, String>,
  batch_errors: Vec<String>,
  aborted: bool,
}

/// Orchestrates indexing, incremental re-indexing, and index lifecycle for
/// codebases against one embedder + store pair.
pub struct Indexer {
  config: IndexConfig,
  embedder: Arc<dyn Embedder>,
  store: Arc<dyn VectorStore>,
  sparse_encoder: Arc<dyn SparseEncoder>,
  transform: Option<ChunkTransform>,
  cancel: CancellationToken,
}

impl Indexer {
  pub fn new(
    config: IndexConfig,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
  ) -> Result<Self, IndexError> {
    config.validate()?;
    Ok(Self {
      config,
      embedder,
      store,
      sparse_encoder: Arc::new(Bm25LiteEncoder::new()),
      transform: None,
      cancel: CancellationToken::new(),
    })
  }

  pub fn with_sparse_encoder(mut self, encoder: Arc<dyn SparseEncoder>) -> Self {
    self.sparse_encoder = encoder;
    self
  }

  pub fn with_transform(mut self, transform: ChunkTransform) -> Self {
    self.transform = Some(transform);
    self
  }

  /// Token the caller can trigger to abort between batches.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  /// A searcher sharing this indexer's collaborators and configuration.
  pub fn searcher(&self) -> Searcher {
    Searcher::new(
      self.config.clone(),
      self.embedder.clone(),
      self.store.clone(),
      self.sparse_encoder.clone(),
    )
  }

  /// Index a codebase from scratch (or on top of an existing collection;
  /// deterministic ids make that an upsert).
  pub async fn index_codebase(
    &self,
    path: &Path,
    progress: Option<ProgressCallback>,
  ) -> Result<IndexOutcome, IndexError> {
    let root = canonical_root(path)?;
    let collection = collection_name(&root);
    let mut tracker = ProgressTracker::new(progress);

    info!(path = %root.display(), collection = %collection, "indexing codebase");

    tracker.emit("Preparing collection...", 0, 100, 0);
    let manager = CollectionManager::new(self.embedder.clone(), self.store.clone());
    manager.prepare(&collection, self.config.enable_sparse).await?;

    tracker.emit("Scanning files...", 0, 100, 5);
    let engine = IgnoreEngine::new(&root, &self.config.ignore_patterns);
    let files = engine.enumerate(&self.config)?;

    let stats = self.run_files(&root, &collection, &files, &mut tracker, 5, 95).await;

    // The snapshot becomes the baseline for the next reindex_by_change; an
    // aborted run keeps the previous baseline so nothing is missed.
    if !stats.aborted {
      let synchronizer = FileSynchronizer::new(&root, &self.snapshot_root()?);
      synchronizer.commit(stats.hashes).await?;
      tracker.emit("Indexing complete", files.len() as u64, files.len() as u64, 100);
    }

    info!(
      indexed_files = stats.indexed_files,
      total_chunks = stats.persisted_chunks,
      aborted = stats.aborted,
      "index run finished"
    );

    Ok(IndexOutcome {
      indexed_files: stats.indexed_files,
      total_chunks: stats.persisted_chunks,
      status: if stats.aborted { IndexStatus::Aborted } else { IndexStatus::Completed },
      batch_errors: stats.batch_errors,
    })
  }

  /// Incremental re-index: diff against the snapshot, delete vectors for
  /// removed and modified files, re-run the pipeline on added and modified
  /// files, then commit the new snapshot.
  pub async fn reindex_by_change(
    &self,
    path: &Path,
    progress: Option<ProgressCallback>,
  ) -> Result<ReindexOutcome, IndexError> {
    let root = canonical_root(path)?;
    let collection = collection_name(&root);
    let mut tracker = ProgressTracker::new(progress);

    tracker.emit("Preparing collection...", 0, 100, 0);
    let manager = CollectionManager::new(self.embedder.clone(), self.store.clone());
    manager.prepare(&collection, self.config.enable_sparse).await?;

    tracker.emit("Detecting changes...", 0, 100, 5);
    let engine = IgnoreEngine::new(&root, &self.config.ignore_patterns);
    let files = engine.enumerate(&self.config)?;
    let synchronizer = FileSynchronizer::new(&root, &self.snapshot_root()?);
    let (delta, current) = synchronizer.compare(&files).await?;

    info!(
      added = delta.added.len(),
      removed = delta.removed.len(),
      modified = delta.modified.len(),
      "delta computed"
    );

    // Stale vectors go first so a re-inserted file never coexists with its
    // previous chunks. Orphans from files deleted without a reindex call are
    // reconciled here as `removed`.
    let stale: Vec<&String> = delta.removed.iter().chain(delta.modified.iter()).collect();
    let total_deletes = stale.len() as u64;
    for (i, relative) in stale.iter().enumerate() {
      if self.cancel.is_cancelled() {
        return Ok(ReindexOutcome {
          added: delta.added.len(),
          removed: delta.removed.len(),
          modified: delta.modified.len(),
          status: IndexStatus::Aborted,
          batch_errors: Vec::new(),
        });
      }
      self.delete_file_chunks(&collection, relative).await?;
      let pct = 5 + (20 * (i as u64 + 1) / total_deletes.max(1)) as u8;
      tracker.emit("Removing stale chunks...", i as u64 + 1, total_deletes, pct);
    }

    let mut to_index: Vec<PathBuf> = delta.added.iter().chain(delta.modified.iter()).map(PathBuf::from).collect();
    to_index.sort();

    let stats = self.run_files(&root, &collection, &to_index, &mut tracker, 25, 95).await;

    if !stats.aborted {
      synchronizer.commit(current).await?;
      tracker.emit("Reindex complete", delta.total() as u64, delta.total() as u64, 100);
    }

    Ok(ReindexOutcome {
      added: delta.added.len(),
      removed: delta.removed.len(),
      modified: delta.modified.len(),
      status: if stats.aborted { IndexStatus::Aborted } else { IndexStatus::Completed },
      batch_errors: stats.batch_errors,
    })
  }

  /// Drop the collection and delete the snapshot for a codebase.
  pub async fn clear_index(&self, path: &Path) -> Result<(), IndexError> {
    let root = canonical_root(path)?;
    let collection = collection_name(&root);

    let manager = CollectionManager::new(self.embedder.clone(), self.store.clone());
    manager.drop(&collection).await?;
    FileSynchronizer::new(&root, &self.snapshot_root()?).delete_snapshot().await?;

    info!(path = %root.display(), collection = %collection, "cleared index");
    Ok(())
  }

  pub async fn has_index(&self, path: &Path) -> Result<bool, IndexError> {
    let root = canonical_root(path)?;
    Ok(self.store.has_collection(&collection_name(&root)).await?)
  }

  /// Stream a file list through split -> buffer -> embed -> insert.
  async fn run_files(
    &self,
    root: &Path,
    collection: &str,
    files: &[PathBuf],
    tracker: &mut ProgressTracker,
    pct_from: u8,
    pct_to: u8,
  ) -> RunStats {
    let mut stats = RunStats {
      indexed_files: 0,
      persisted_chunks: 0,
      hashes: BTreeMap::new(),
      batch_errors: Vec::new(),
      aborted: false,
    };

    let mut splitter = Splitter::new(SplitterConfig {
      chunk_size: self.config.splitter_chunk_size,
      chunk_overlap: self.config.splitter_chunk_overlap,
      max_node_chars: self.config.splitter_chunk_size * 4,
    });
    let mut buffer: Vec<PendingChunk> = Vec::new();
    let total = files.len();

    'files: for (index, relative) in files.iter().enumerate() {
      if self.cancel.is_cancelled() {
        stats.aborted = true;
        break;
      }

      let absolute = root.join(relative);
      let relative_str = relative_key(relative);

      let bytes = match tokio::fs::read(&absolute).await {
        Ok(bytes) => bytes,
        Err(err) => {
          warn!(path = %absolute.display(), error = %err, "skipping unreadable file");
          continue;
        }
      };
      // Every readable file is hashed into the snapshot baseline, skipped or
      // not, so the synchronizer (which hashes with no size filter) sees the
      // same map and a no-change reindex stays empty.
      stats.hashes.insert(relative_str.clone(), content_hash(&bytes));

      if bytes.len() as u64 > self.config.max_file_size_bytes {
        warn!(path = %absolute.display(), size = bytes.len(), "skipping oversized file");
        continue;
      }

      let text = String::from_utf8_lossy(&bytes);

      let language = relative
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Language::from_extension)
        .unwrap_or(Language::Text);

      let chunks = splitter.split(&text, language, &absolute.to_string_lossy());
      debug!(path = %relative_str, chunks = chunks.len(), "split file");

      for chunk in chunks {
        let embed_text = self.transform.as_ref().and_then(|transform| transform(&chunk));
        buffer.push(PendingChunk {
          chunk,
          relative_path: relative_str.clone(),
          embed_text,
        });

        if buffer.len() >= self.config.embed_batch {
          self.flush(collection, &mut buffer, &mut stats).await;
          if self.cancel.is_cancelled() {
            // The flush that was in flight has completed; drop whatever is
            // still unembedded and surface the aborted status.
            buffer.clear();
            stats.aborted = true;
            break 'files;
          }
        }
      }

      stats.indexed_files += 1;
      let span = (pct_to - pct_from) as u64;
      let pct = pct_from as u64 + span * (index as u64 + 1) / total.max(1) as u64;
      tracker.emit(
        &format!("Processing files ({}/{})...", index + 1, total),
        index as u64 + 1,
        total as u64,
        pct as u8,
      );
    }

    if !stats.aborted {
      self.flush(collection, &mut buffer, &mut stats).await;
    }

    stats
  }

  /// Flush the buffer through one embed + insert round.
  ///
  /// The buffer is cleared unconditionally, failure included, to bound
  /// memory; a failed batch is recorded and the pipeline moves on.
  async fn flush(&self, collection: &str, buffer: &mut Vec<PendingChunk>, stats: &mut RunStats) {
    if buffer.is_empty() {
      return;
    }
    let batch = std::mem::take(buffer);

    let texts: Vec<&str> = batch
      .iter()
      .map(|pending| pending.embed_text.as_deref().unwrap_or(&pending.chunk.content))
      .collect();

    let vectors = match self.embedder.embed_batch(&texts).await {
      Ok(vectors) => vectors,
      Err(err) => {
        warn!(batch_size = batch.len(), error = %err, "embed batch failed, skipping");
        stats.batch_errors.push(format!("embed batch of {} failed: {err}", batch.len()));
        return;
      }
    };
    if vectors.len() != batch.len() {
      stats
        .batch_errors
        .push(format!("embedder returned {} vectors for {} chunks", vectors.len(), batch.len()));
      return;
    }

    let documents: Vec<VectorDocument> = batch
      .iter()
      .zip(vectors)
      .map(|(pending, vector)| self.build_document(pending, vector))
      .collect();
    let count = documents.len();

    match self.store.insert(collection, documents).await {
      Ok(()) => {
        stats.persisted_chunks += count;
        debug!(batch_size = count, "batch inserted");
      }
      Err(err) => {
        warn!(batch_size = count, error = %err, "insert batch failed, skipping");
        stats.batch_errors.push(format!("insert batch of {count} failed: {err}"));
      }
    }
  }

  fn build_document(&self, pending: &PendingChunk, vector: Vec<f32>) -> VectorDocument {
    let chunk = &pending.chunk;
    let mut metadata = BTreeMap::new();
    metadata.insert("language".to_string(), chunk.language.as_str().to_string());
    if let Some(node_type) = chunk.node_type {
      metadata.insert("node_type".to_string(), node_type.as_str().to_string());
    }
    if let Some(node_name) = &chunk.node_name {
      metadata.insert("node_name".to_string(), node_name.clone());
    }

    let sparse = self
      .config
      .enable_sparse
      .then(|| self.sparse_encoder.encode(&chunk.content));

    VectorDocument {
      id: chunk_id(&pending.relative_path, chunk.start_line, chunk.end_line, &chunk.content),
      vector,
      content: chunk.content.clone(),
      relative_path: pending.relative_path.clone(),
      start_line: chunk.start_line,
      end_line: chunk.end_line,
      file_extension: Path::new(&pending.relative_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string(),
      metadata,
      sparse,
    }
  }

  /// Query-then-delete all vectors for one relative path.
  async fn delete_file_chunks(&self, collection: &str, relative: &str) -> Result<(), IndexError> {
    let rows = self.store.query(collection, &path_filter(relative), &["id"]).await?;
    let ids: Vec<String> = rows.into_iter().filter_map(|mut row| row.remove("id")).collect();
    if ids.is_empty() {
      return Ok(());
    }
    debug!(path = relative, count = ids.len(), "deleting stale chunks");
    self.store.delete(collection, &ids).await?;
    Ok(())
  }

  fn snapshot_root(&self) -> Result<PathBuf, IndexError> {
    if let Some(root) = &self.config.snapshot_root {
      return Ok(root.clone());
    }
    dirs::home_dir()
      .map(|home| home.join(".codeindexer").join("merkle"))
      .ok_or_else(|| IndexError::Path("cannot resolve home directory for snapshot root".to_string()))
  }
}

fn canonical_root(path: &Path) -> Result<PathBuf, IndexError> {
  let root = path.canonicalize().map_err(|e| IndexError::io(path, e))?;
  if !root.is_dir() {
    return Err(IndexError::Path(format!("{} is not a directory", root.display())));
  }
  Ok(root)
}

/// Filter expression selecting all chunks of one file.
fn path_filter(relative: &str) -> String {
  // The filter grammar has no escapes; pick whichever quote the path does
  // not contain.
  if relative.contains('"') {
    format!("relative_path == '{relative}'")
  } else {
    format!("relative_path == \"{relative}\"")
  }
}

fn relative_key(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

//! Content-addressed file synchronization.
//!
//! A snapshot is one JSON file per codebase mapping relative path to sha256
//! content hash. Comparing the current tree against it yields the
//! added/removed/modified delta that drives incremental re-indexing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use codectx_core::{content_hash, snapshot_file_name};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::IndexError;

const SNAPSHOT_VERSION: u32 = 1;

/// Relative paths that changed between the snapshot and the current tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
  pub added: Vec<String>,
  pub removed: Vec<String>,
  pub modified: Vec<String>,
}

impl Delta {
  pub fn is_empty(&self) -> bool {
    self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
  }

  pub fn total(&self) -> usize {
    self.added.len() + self.removed.len() + self.modified.len()
  }
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
  version: u32,
  paths: BTreeMap<String, String>,
}

/// Exclusive advisory lock over a snapshot file.
///
/// Backed by `create_new` on a sibling `.lock` file; released on drop.
/// Concurrent deltas on the same codebase fail instead of racing.
struct SnapshotLock {
  path: PathBuf,
}

impl SnapshotLock {
  fn acquire(snapshot_path: &Path) -> Result<Self, IndexError> {
    let path = snapshot_path.with_extension("json.lock");
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
    }
    match std::fs::OpenOptions::new().write(true).create_new(true).open(&path) {
      Ok(_) => Ok(Self { path }),
      Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(IndexError::SnapshotLocked(path)),
      Err(e) => Err(IndexError::io(&path, e)),
    }
  }
}

impl Drop for SnapshotLock {
  fn drop(&mut self) {
    let _ = std::fs::remove_file(&self.path);
  }
}

/// Computes incremental deltas for one codebase.
pub struct FileSynchronizer {
  root: PathBuf,
  snapshot_path: PathBuf,
}

impl FileSynchronizer {
  /// `root` must already be canonicalized; `snapshot_root` is the directory
  /// holding all per-codebase snapshots.
  pub fn new(root: &Path, snapshot_root: &Path) -> Self {
    Self {
      root: root.to_path_buf(),
      snapshot_path: snapshot_root.join(snapshot_file_name(root)),
    }
  }

  pub fn snapshot_path(&self) -> &Path {
    &self.snapshot_path
  }

  /// Compute the delta and persist the new snapshot before returning.
  ///
  /// One lock spans the whole compare-then-commit sequence, so a concurrent
  /// delta on the same codebase fails with [`IndexError::SnapshotLocked`]
  /// instead of clobbering this one's result.
  pub async fn delta(&self, files: &[PathBuf]) -> Result<Delta, IndexError> {
    let _lock = SnapshotLock::acquire(&self.snapshot_path)?;
    let (delta, current) = self.compare_inner(files).await?;
    self.commit_inner(current).await?;
    Ok(delta)
  }

  /// Compute the delta without touching the snapshot on disk.
  ///
  /// The returned map is the state `commit` should persist once the caller
  /// has finished acting on the delta; an aborted run simply never commits
  /// and the old snapshot stays authoritative.
  pub async fn compare(&self, files: &[PathBuf]) -> Result<(Delta, BTreeMap<String, String>), IndexError> {
    let _lock = SnapshotLock::acquire(&self.snapshot_path)?;
    self.compare_inner(files).await
  }

  async fn compare_inner(&self, files: &[PathBuf]) -> Result<(Delta, BTreeMap<String, String>), IndexError> {
    let previous = self.load().await?;
    let mut current = BTreeMap::new();

    for relative in files {
      let absolute = self.root.join(relative);
      match tokio::fs::read(&absolute).await {
        Ok(bytes) => {
          current.insert(relative_key(relative), content_hash(&bytes));
        }
        Err(err) => {
          // A file that vanished mid-scan is treated as absent; it will show
          // up as removed or simply never appear.
          warn!(path = %absolute.display(), error = %err, "failed to read file during sync");
        }
      }
    }

    let mut delta = Delta::default();
    for (path, hash) in &current {
      match previous.get(path) {
        None => delta.added.push(path.clone()),
        Some(old) if old != hash => delta.modified.push(path.clone()),
        Some(_) => {}
      }
    }
    for path in previous.keys() {
      if !current.contains_key(path) {
        delta.removed.push(path.clone());
      }
    }

    debug!(
      added = delta.added.len(),
      removed = delta.removed.len(),
      modified = delta.modified.len(),
      "computed file delta"
    );
    Ok((delta, current))
  }

  /// Atomically replace the snapshot: write to a temp file in the same
  /// directory, fsync, rename. A crash mid-write leaves the old snapshot
  /// authoritative.
  pub async fn commit(&self, paths: BTreeMap<String, String>) -> Result<(), IndexError> {
    let _lock = SnapshotLock::acquire(&self.snapshot_path)?;
    self.commit_inner(paths).await
  }

  async fn commit_inner(&self, paths: BTreeMap<String, String>) -> Result<(), IndexError> {
    let parent = self
      .snapshot_path
      .parent()
      .ok_or_else(|| IndexError::Path(format!("snapshot path {} has no parent", self.snapshot_path.display())))?;
    tokio::fs::create_dir_all(parent)
      .await
      .map_err(|e| IndexError::io(parent, e))?;

    let snapshot = SnapshotFile {
      version: SNAPSHOT_VERSION,
      paths,
    };
    let body = serde_json::to_vec_pretty(&snapshot)
      .map_err(|e| IndexError::Path(format!("snapshot serialization failed: {e}")))?;

    let tmp_path = self.snapshot_path.with_extension("json.tmp");
    {
      use tokio::io::AsyncWriteExt;
      let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| IndexError::io(&tmp_path, e))?;
      file.write_all(&body).await.map_err(|e| IndexError::io(&tmp_path, e))?;
      file.sync_all().await.map_err(|e| IndexError::io(&tmp_path, e))?;
    }
    tokio::fs::rename(&tmp_path, &self.snapshot_path)
      .await
      .map_err(|e| IndexError::io(&self.snapshot_path, e))?;

    debug!(path = %self.snapshot_path.display(), "snapshot committed");
    Ok(())
  }

  /// Load the persisted path map; tolerant of missing, corrupt, or
  /// unknown-version snapshots (all read as empty, forcing a full pass).
  async fn load(&self) -> Result<BTreeMap<String, String>, IndexError> {
    let bytes = match tokio::fs::read(&self.snapshot_path).await {
      Ok(bytes) => bytes,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
      Err(err) => return Err(IndexError::io(&self.snapshot_path, err)),
    };

    match serde_json::from_slice::<SnapshotFile>(&bytes) {
      Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION => Ok(snapshot.paths),
      Ok(snapshot) => {
        warn!(version = snapshot.version, "unknown snapshot version, treating as absent");
        Ok(BTreeMap::new())
      }
      Err(err) => {
        warn!(error = %err, "corrupt snapshot, treating as absent");
        Ok(BTreeMap::new())
      }
    }
  }

  pub async fn delete_snapshot(&self) -> Result<(), IndexError> {
    match tokio::fs::remove_file(&self.snapshot_path).await {
      Ok(()) => Ok(()),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(err) => Err(IndexError::io(&self.snapshot_path, err)),
    }
  }
}

fn relative_key(path: &Path) -> String {
  // Snapshot keys always use forward slashes, whatever the platform.
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

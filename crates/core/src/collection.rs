use std::path::Path;

/// Derive the collection name for a codebase path.
///
/// `code_chunks_` + first 8 hex chars of md5 over the canonical path string.
/// 8 hex chars is 32 bits, so by the birthday bound two distinct codebases
/// collide with ~50% probability only once a single user indexes on the
/// order of 2^16 (~77k) codebases. Collisions are tolerated, not detected.
pub fn collection_name(canonical_path: &Path) -> String {
  format!("code_chunks_{}", path_hash8(canonical_path))
}

/// File name of the synchronizer snapshot for a codebase path.
///
/// Shares the collection's 8-hex prefix so a collection and its snapshot can
/// be correlated on disk.
pub fn snapshot_file_name(canonical_path: &Path) -> String {
  format!("code_chunks_{}.json", path_hash8(canonical_path))
}

fn path_hash8(path: &Path) -> String {
  let digest = md5::compute(path.to_string_lossy().as_bytes());
  format!("{digest:x}")[..8].to_string()
}

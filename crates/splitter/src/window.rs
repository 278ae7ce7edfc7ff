//! Character-window line splitting, the fallback when no AST is available.

/// Split `lines` into windows of at most `chunk_size` characters that
/// overlap the previous window by up to `chunk_overlap` characters.
///
/// Windows never split inside a line, so a single line longer than
/// `chunk_size` becomes its own window. Returned ranges are 0-based
/// inclusive `(start, end)` index pairs into `lines`.
pub fn window_ranges(lines: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<(usize, usize)> {
  if lines.is_empty() {
    return Vec::new();
  }

  let mut ranges = Vec::new();
  let mut start = 0usize;

  loop {
    let mut end = start;
    let mut chars = lines[start].len();
    while end + 1 < lines.len() {
      let added = lines[end + 1].len() + 1;
      if chars + added > chunk_size {
        break;
      }
      chars += added;
      end += 1;
    }

    ranges.push((start, end));

    if end + 1 >= lines.len() {
      break;
    }

    // Walk whole lines back from the window edge until the overlap budget is
    // spent, always advancing at least one line past the previous start.
    let mut next = end + 1;
    let mut overlap = 0usize;
    while next > start + 1 {
      let candidate = lines[next - 1].len() + 1;
      if overlap + candidate > chunk_overlap {
        break;
      }
      overlap += candidate;
      next -= 1;
    }
    start = next;
  }

  ranges
}

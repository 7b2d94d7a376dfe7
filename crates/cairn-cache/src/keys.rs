//! Name sanitizing and canonical path ordering.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Sanitize a key for use in filenames.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            _ => c,
        })
        .collect()
}

/// Byte-wise order of the paths' encoded bytes.
///
/// This is UTF-8 code unit order for UTF-8 paths. It differs from the
/// component-wise order of `Path::cmp`: `out/a-b` sorts before `out/a/b`.
pub fn compare_paths(a: &Path, b: &Path) -> Ordering {
    a.as_os_str()
        .as_encoded_bytes()
        .cmp(b.as_os_str().as_encoded_bytes())
}

/// Sort and deduplicate paths in canonical order.
pub fn canonical_sort(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let mut sorted: Vec<PathBuf> = paths.into_iter().collect();
    sorted.sort_by(|a, b| compare_paths(a, b));
    sorted.dedup();
    sorted
}

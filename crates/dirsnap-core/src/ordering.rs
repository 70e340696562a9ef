//! Deterministic ordering of directory paths.
//!
//! The sorted position of a directory is its array index in the snapshot,
//! so the order must be total and identical across runs over the same tree.
//!
//! Spaces and periods are remapped to two-character sentinels before a plain
//! code-point comparison. Both sentinels start with `:`, which sorts above
//! `/` and the digits and below all letters. This keeps `My Folder`,
//! `My.Folder` and `MyFolder` adjacent and, with `/` separators, keeps a
//! directory's children ahead of siblings whose names extend it with a
//! space or period. The originals are restored simply by sorting
//! `(key, original)` pairs and keeping the originals.

use std::path::Path;

use crate::text::path_text;

const SPACE_SENTINEL: &str = ":\u{1}";
const PERIOD_SENTINEL: &str = ":\u{2}";

/// Comparison key for a single path string.
pub fn ordering_key(path: &str) -> String {
    let mut key = String::with_capacity(path.len() + 8);
    for ch in path.chars() {
        match ch {
            ' ' => key.push_str(SPACE_SENTINEL),
            '.' => key.push_str(PERIOD_SENTINEL),
            other => key.push(other),
        }
    }
    key
}

/// Sort paths in place using the snapshot ordering.
///
/// Case-sensitive. Keys are built from [`path_text`], which never maps two
/// distinct paths to the same text; that text breaks ties between keys, so
/// the order stays total.
pub fn sort_paths<P: AsRef<Path>>(paths: &mut [P]) {
    paths.sort_by_cached_key(|p| {
        let text = path_text(p.as_ref()).into_owned();
        (ordering_key(&text), text)
    });
}

//! Folder rule resolution and change planning.

mod changes;
mod resolver;

pub use changes::plan_rule_changes;
pub use resolver::{resolve_watch_set, ResolvedWatchSet, WatchRoot};

use std::path::Path;

/// Normalizes a path for rule comparison and catalog keys.
///
/// Lossy conversion, with trailing separators stripped so `/a/b/` and
/// `/a/b` compare equal. A bare root keeps its separator.
pub fn normalize_path(path: &Path) -> String {
    normalize_str(path.to_string_lossy().as_ref())
}

pub(crate) fn normalize_str(raw: &str) -> String {
    let trimmed = raw.trim_end_matches(['/', '\\']);
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Whether `prefix` covers `path` on whole-segment boundaries.
///
/// `/a/b` covers `/a/b` and `/a/b/c.jpg` but not `/a/bc`, which shares
/// a string prefix without sharing a path segment.
pub(crate) fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    if path.len() == prefix.len() || prefix.ends_with(['/', '\\']) {
        return true;
    }
    matches!(path.as_bytes()[prefix.len()], b'/' | b'\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn normalization_strips_trailing_separators() {
        assert_eq!(normalize_path(&PathBuf::from("/photos/2024/")), "/photos/2024");
        assert_eq!(normalize_path(&PathBuf::from("/photos/2024")), "/photos/2024");
        assert_eq!(normalize_path(&PathBuf::from("/")), "/");
    }

    #[test]
    fn segment_prefix_rejects_sibling_with_shared_string_prefix() {
        assert!(is_segment_prefix("/a/b", "/a/b"));
        assert!(is_segment_prefix("/a/b", "/a/b/c.jpg"));
        assert!(!is_segment_prefix("/a/b", "/a/bc"));
        assert!(!is_segment_prefix("/a/b", "/a/bc/d.jpg"));
    }

    #[test]
    fn bare_root_prefix_covers_all_absolute_paths() {
        assert!(is_segment_prefix("/", "/photos/a.jpg"));
        assert!(is_segment_prefix("/", "/"));
    }
}

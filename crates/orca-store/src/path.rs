//! Helpers for slash-delimited node paths.

use crate::error::StoreError;

/// Path separator.
pub const SEPARATOR: char = '/';

/// Join a child name onto a parent path.
pub fn join(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches(SEPARATOR);
    if parent.is_empty() || parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent.trim_end_matches(SEPARATOR), child)
    }
}

/// Parent of `path`, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind(SEPARATOR) {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of `path`.
pub fn basename(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Check that `path` is absolute, has no empty segments and no trailing separator.
pub fn validate(path: &str) -> Result<(), StoreError> {
    let reason = if !path.starts_with(SEPARATOR) {
        Some("must start with '/'")
    } else if path.len() > 1 && path.ends_with(SEPARATOR) {
        Some("must not end with '/'")
    } else if path.contains("//") {
        Some("empty path segment")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Every ancestor of `path` (excluding the root) followed by `path` itself.
pub fn ancestors_inclusive(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in path.split(SEPARATOR).filter(|s| !s.is_empty()) {
        current.push(SEPARATOR);
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

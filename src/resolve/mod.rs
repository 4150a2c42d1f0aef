//! Snapshot resolution: request path to file under the mirror root
//!
//! The candidate rule is a pure function of the request path and an
//! existing-file predicate. The Localizer calls it with a predicate over the
//! set of mirrored files; the server calls it through [`SnapshotResolver`]
//! with a predicate over the real file system.

mod content_type;

pub use content_type::{content_type_for, DEFAULT_CONTENT_TYPE};

use crate::url::path_extension;
use percent_encoding::percent_decode_str;
use std::path::{Path, PathBuf};

/// Upper bound on decoding rounds; deeper nesting is rejected
const MAX_DECODE_ROUNDS: usize = 8;

/// Resolves a mirror-relative request path to an existing file
///
/// Candidates, first existing wins:
/// 1. the path unmodified
/// 2. `path + ".html"`, only if the last segment has no extension
///    (a path ending in `/` has no last segment, so this is skipped)
/// 3. `path + "/index.html"`, only if the last segment has no extension
/// 4. `"index.html"` for an empty path
///
/// `path` must already be sanitized (see [`sanitize_request_path`]).
///
/// # Examples
///
/// ```
/// use site_mirror::resolve_candidate;
///
/// let files = ["a/b.html", "a/c/index.html", "index.html"];
/// let exists = |p: &str| files.contains(&p);
///
/// assert_eq!(resolve_candidate("a/b", exists), Some("a/b.html".to_string()));
/// assert_eq!(resolve_candidate("a/c/", exists), Some("a/c/index.html".to_string()));
/// assert_eq!(resolve_candidate("", exists), Some("index.html".to_string()));
/// assert_eq!(resolve_candidate("a/b/", exists), None);
/// ```
pub fn resolve_candidate(path: &str, exists: impl Fn(&str) -> bool) -> Option<String> {
    if path.is_empty() || path == "/" {
        return exists("index.html").then(|| "index.html".to_string());
    }

    if !path.ends_with('/') && exists(path) {
        return Some(path.to_string());
    }

    let has_extension = !path.ends_with('/') && path_extension(path).is_some();
    if has_extension {
        return None;
    }

    if !path.ends_with('/') {
        let html = format!("{}.html", path);
        if exists(&html) {
            return Some(html);
        }
    }

    let index = format!("{}/index.html", path.trim_end_matches('/'));
    exists(&index).then_some(index)
}

/// Turns a raw request path into a safe mirror-relative path
///
/// The path is percent-decoded once for lookup. For the safety check it is
/// decoded repeatedly until stable, and rejected if any layer contains a
/// `..` segment, a NUL byte or a backslash. Leading slashes are removed.
///
/// Returns None for rejected input.
pub fn sanitize_request_path(raw: &str) -> Option<String> {
    let mut layer = raw.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        if !is_safe_layer(&layer) {
            return None;
        }
        let decoded = percent_decode_str(&layer).decode_utf8().ok()?.into_owned();
        if decoded == layer {
            let once = percent_decode_str(raw).decode_utf8().ok()?.into_owned();
            return Some(once.trim_start_matches('/').to_string());
        }
        layer = decoded;
    }
    None
}

fn is_safe_layer(layer: &str) -> bool {
    !layer.contains('\0')
        && !layer.contains('\\')
        && !layer.split('/').any(|segment| segment == "..")
}

/// A resolved file and its declared content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Canonical absolute location, guaranteed inside the mirror root
    pub path: PathBuf,
    pub content_type: &'static str,
    /// Matched through the `index.html` fallback of a path without a
    /// trailing slash; relative links in the file need the slash form
    pub directory_index: bool,
}

/// File-system resolver over a fixed mirror root
#[derive(Debug, Clone)]
pub struct SnapshotResolver {
    root: PathBuf,
}

impl SnapshotResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a request path (relative to the route prefix)
    ///
    /// Returns None when the input is rejected, nothing matches, or the
    /// match lies outside the canonical root (e.g. through a symlink).
    pub fn resolve(&self, request_path: &str) -> Option<Resolved> {
        let relative = sanitize_request_path(request_path)?;
        let found = resolve_candidate(&relative, |candidate| {
            join_relative(&self.root, candidate).is_file()
        })?;

        let canonical_root = self.root.canonicalize().ok()?;
        let canonical = join_relative(&self.root, &found).canonicalize().ok()?;
        if !canonical.starts_with(&canonical_root) {
            tracing::warn!("Refusing {} (resolves outside the mirror root)", request_path);
            return None;
        }

        let directory_index = !relative.is_empty()
            && !relative.ends_with('/')
            && found != relative
            && found.ends_with("index.html")
            && found != format!("{}.html", relative);

        Some(Resolved {
            content_type: content_type_for(&found),
            path: canonical,
            directory_index,
        })
    }
}

/// Joins `/`-separated relative segments onto a root
fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

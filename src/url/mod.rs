//! URL handling module for Site-Mirror
//!
//! This module provides URL normalization, host extraction, allowlist
//! matching and the page/resource classification of a URL.

mod domain;
mod matcher;
mod normalize;

use crate::state::Category;
use crate::UrlError;
use url::Url;

// Re-export main functions
pub use domain::{extract_domain, host_key};
pub use matcher::matches_wildcard;
pub use normalize::{canonical_page_url, normalize_parsed, normalize_url};

/// Extensions of files that are never HTML documents
const ASSET_EXTENSIONS: &[&str] = &[
    "avif", "bmp", "css", "csv", "eot", "gif", "ico", "jpeg", "jpg", "js", "json", "m3u8", "map",
    "mjs", "mp3", "mp4", "otf", "pdf", "png", "svg", "ttf", "txt", "wav", "webm", "webp", "woff",
    "woff2", "xml", "zip", "7z", "bz2", "doc", "docx", "epub", "gz", "ppt", "pptx", "rar", "tar",
    "xls", "xlsx", "xz", "wasm",
];

/// Path prefixes that serve data rather than documents
const NON_PAGE_PREFIXES: &[&str] = &["/api/", "/cdn-cgi/"];

/// The set of hosts whose URLs are mirrored
///
/// The start URL's host is always a member; additional members come from
/// `allowed-hosts` patterns (exact host or `*.suffix`).
#[derive(Debug, Clone)]
pub struct HostScope {
    primary: String,
    patterns: Vec<String>,
}

impl HostScope {
    /// Creates a scope around a primary host plus allowlist patterns
    pub fn new(primary: impl Into<String>, patterns: &[String]) -> Self {
        Self {
            primary: primary.into().to_lowercase(),
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Builds the scope for a start URL
    pub fn for_start_url(start_url: &Url, patterns: &[String]) -> Result<Self, UrlError> {
        let host = extract_domain(start_url).ok_or(UrlError::MissingDomain)?;
        Ok(Self::new(host, patterns))
    }

    /// The host the mirror is centered on
    pub fn primary_host(&self) -> &str {
        &self.primary
    }

    /// Returns true if the host belongs to the mirrored set
    pub fn contains_host(&self, host: &str) -> bool {
        let host = host.to_lowercase();
        host == self.primary || self.patterns.iter().any(|p| matches_wildcard(p, &host))
    }

    /// Returns true if the URL's host belongs to the mirrored set
    pub fn contains(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|h| self.contains_host(h))
    }
}

/// Returns the lowercase extension of the last path segment, if any
pub fn path_extension(path: &str) -> Option<String> {
    let last = path.rsplit('/').next().unwrap_or("");
    match last.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext.to_ascii_lowercase()),
        _ => None,
    }
}

/// Returns true if the URL looks like an HTML document
///
/// A URL looks like HTML when its last path segment has no extension or a
/// non-asset one (`.html`, `.php`, ...) and it does not live under a data
/// endpoint prefix.
pub fn looks_like_page(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    if NON_PAGE_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return false;
    }
    match path_extension(&path) {
        Some(ext) => !ASSET_EXTENSIONS.contains(&ext.as_str()),
        None => true,
    }
}

/// Classifies a navigational link target
///
/// Requisites (images, scripts, stylesheets) are always resources; only
/// navigational links are checked with [`looks_like_page`].
pub fn classify_link(url: &Url) -> Category {
    if looks_like_page(url) {
        Category::Page
    } else {
        Category::Resource
    }
}

/// Produces the frontier key of a URL for its category
///
/// Pages are identified by scheme, host and path; resources keep their
/// filtered query.
pub fn frontier_url(url: &Url, category: Category) -> Url {
    match category {
        Category::Page => canonical_page_url(url),
        Category::Resource => url.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_scope_contains_primary() {
        let scope = HostScope::new("www.example.com", &[]);
        assert!(scope.contains(&url("https://www.example.com/a")));
        assert!(scope.contains(&url("http://WWW.EXAMPLE.COM:8080/a")));
        assert!(!scope.contains(&url("https://example.com/a")));
    }

    #[test]
    fn test_scope_wildcard_patterns() {
        let scope = HostScope::new("www.example.com", &["*.example.com".to_string()]);
        assert!(scope.contains(&url("https://cdn.example.com/x.png")));
        assert!(scope.contains(&url("https://example.com/")));
        assert!(!scope.contains(&url("https://example.org/")));
    }

    #[test]
    fn test_scope_for_start_url() {
        let scope = HostScope::for_start_url(&url("https://Docs.Example.com/start"), &[]).unwrap();
        assert_eq!(scope.primary_host(), "docs.example.com");
    }

    #[test]
    fn test_path_extension() {
        assert_eq!(path_extension("/a/b.CSS"), Some("css".to_string()));
        assert_eq!(path_extension("/a/b"), None);
        assert_eq!(path_extension("/a.d/b"), None);
        assert_eq!(path_extension("/"), None);
        assert_eq!(path_extension("/archive.tar.gz"), Some("gz".to_string()));
    }

    #[test]
    fn test_looks_like_page() {
        assert!(looks_like_page(&url("https://example.com/")));
        assert!(looks_like_page(&url("https://example.com/pricing")));
        assert!(looks_like_page(&url("https://example.com/about.html")));
        assert!(looks_like_page(&url("https://example.com/index.php")));

        assert!(!looks_like_page(&url("https://example.com/logo.png")));
        assert!(!looks_like_page(&url("https://example.com/report.PDF")));
        assert!(!looks_like_page(&url("https://example.com/api/v1/items")));
        assert!(!looks_like_page(&url("https://example.com/cdn-cgi/l/email")));
    }

    #[test]
    fn test_frontier_url_by_category() {
        let u = url("https://example.com/img?w=640");
        assert_eq!(
            frontier_url(&u, Category::Page).as_str(),
            "https://example.com/img"
        );
        assert_eq!(
            frontier_url(&u, Category::Resource).as_str(),
            "https://example.com/img?w=640"
        );
    }
}

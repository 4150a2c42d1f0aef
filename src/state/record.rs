use crate::state::{Category, FailureReason, Source, UrlStatus};
use serde::Serialize;
use url::Url;

/// One normalized URL known to a mirror run
///
/// Records are created when a URL is admitted to the frontier and are only
/// mutated by settling them; they are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlRecord {
    /// Normalized URL; unique across the frontier
    pub url: Url,

    /// Link distance from the seed set
    pub depth: u32,

    pub source: Source,

    pub category: Category,

    pub status: UrlStatus,

    /// Set when `status` is `Failed`
    pub failure_reason: Option<FailureReason>,

    /// Human readable context for the failure (status code, error text)
    pub failure_detail: Option<String>,
}

impl UrlRecord {
    /// Creates a pending record
    pub fn new(url: Url, depth: u32, source: Source, category: Category) -> Self {
        Self {
            url,
            depth,
            source,
            category,
            status: UrlStatus::Pending,
            failure_reason: None,
            failure_detail: None,
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.status == UrlStatus::Fetched
    }

    pub fn is_failed(&self) -> bool {
        self.status == UrlStatus::Failed
    }
}

/// A file written to the mirror tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorEntry {
    /// URL whose body this file holds
    pub url: Url,

    /// Path relative to the mirror root, `/`-separated
    pub local_path: String,

    pub byte_size: u64,

    pub content_type: Option<String>,
}

impl MirrorEntry {
    /// Returns true if the entry was stored as an HTML document
    pub fn is_html(&self) -> bool {
        self.local_path.ends_with(".html")
            || self.local_path.ends_with(".htm")
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("text/html"))
    }

    /// Returns true if the entry was stored as a stylesheet
    pub fn is_css(&self) -> bool {
        self.local_path.ends_with(".css")
            || self
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("text/css"))
    }
}

//! The on-disk mirror tree
//!
//! Maps URLs to local paths under the mirror root and writes fetched bodies.
//! Every local path is built from sanitized segments only, so nothing a
//! remote server sends can place a file outside the root.

use crate::crawler::FetchResponse;
use crate::state::{Category, MirrorEntry};
use crate::url::{host_key, path_extension};
use percent_encoding::percent_decode_str;
use std::io;
use std::path::PathBuf;
use url::Url;

/// Writer and reader of the mirror tree
#[derive(Debug, Clone)]
pub struct MirrorStore {
    root: PathBuf,
}

impl MirrorStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of a root-relative local path
    pub fn absolute(&self, local_path: &str) -> PathBuf {
        local_path
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    pub async fn read(&self, local_path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.absolute(local_path)).await
    }

    /// Writes a fetched body and returns its mirror entry
    ///
    /// # Arguments
    ///
    /// * `url` - The frontier URL of the record
    /// * `category` - Page or resource (controls query handling)
    /// * `response` - The successful response
    pub async fn write(
        &self,
        url: &Url,
        category: Category,
        response: &FetchResponse,
    ) -> io::Result<MirrorEntry> {
        let local_path =
            local_path_for(url, category, response.is_html(), Some(&response.final_url))
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("URL {} has no host", url))
                })?;

        let target = self.absolute(&local_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &response.body).await?;

        Ok(MirrorEntry {
            url: url.clone(),
            local_path,
            byte_size: response.body.len() as u64,
            content_type: response.content_type.clone(),
        })
    }
}

/// Computes the mirror-relative path of a URL
///
/// Layout: `<host>[:<port>]/<path>` where
/// - the root path, or a redirect to `<path>/`, stores `index.html`
/// - an HTML response whose last segment has no extension stores `<path>.html`
/// - anything else is stored verbatim
/// - a resource's query is appended as `?<query>` with `/` written `%2F`
///
/// Segments are percent-decoded; `.`, `..`, empty and NUL-bearing segments
/// are dropped.
///
/// # Examples
///
/// ```
/// use site_mirror::download::local_path_for;
/// use site_mirror::Category;
/// use url::Url;
///
/// let url = Url::parse("https://example.com/docs/intro").unwrap();
/// assert_eq!(
///     local_path_for(&url, Category::Page, true, None).unwrap(),
///     "example.com/docs/intro.html"
/// );
/// ```
pub fn local_path_for(
    url: &Url,
    category: Category,
    is_html: bool,
    final_url: Option<&Url>,
) -> Option<String> {
    let host = host_key(url)?;
    let mut segments = sanitize_segments(url.path());

    let redirected_to_directory = final_url.is_some_and(|f| {
        f.path().ends_with('/') && f.path().trim_end_matches('/') == url.path().trim_end_matches('/')
    });

    if segments.is_empty() || url.path().ends_with('/') || (is_html && redirected_to_directory) {
        segments.push("index.html".to_string());
    } else if is_html {
        if let Some(last) = segments.last_mut() {
            if path_extension(last).is_none() {
                last.push_str(".html");
            }
        }
    }

    if category == Category::Resource {
        if let (Some(query), Some(last)) = (url.query().filter(|q| !q.is_empty()), segments.last_mut()) {
            last.push('?');
            last.push_str(&query.replace('/', "%2F"));
        }
    }

    Some(format!("{}/{}", host, segments.join("/")))
}

/// Percent-decodes a URL path into safe file-system segments
fn sanitize_segments(path: &str) -> Vec<String> {
    path.split('/')
        .flat_map(|raw| {
            let decoded = percent_decode_str(raw).decode_utf8_lossy().into_owned();
            decoded
                .split(['/', '\\'])
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
        })
        .filter(|s| !s.is_empty() && s != "." && s != ".." && !s.contains('\0'))
        .collect()
}

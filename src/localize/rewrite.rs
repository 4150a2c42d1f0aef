//! Per-document link rewriting

use crate::crawler::{embedded_url_regex, split_embedded_url};
use crate::resolve::{resolve_candidate, sanitize_request_path};
use crate::url::{host_key, normalize_parsed, HostScope};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

/// Characters escaped in a generated relative target segment
pub(crate) const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Attributes whose values carry link targets
const URL_ATTRIBUTES: &[&str] = &["href", "src", "poster", "action", "data-src"];

/// Attributes whose values are srcset candidate lists
const SRCSET_ATTRIBUTES: &[&str] = &["srcset", "imagesrcset", "data-srcset"];

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?i)(?P<lead>\s)(?P<name>href|src|srcset|imagesrcset|poster|action|data-src|data-srcset|content)(?P<eq>\s*=\s*)(?:"(?P<dq>[^"]*)"|'(?P<sq>[^']*)')"#,
        )
        .expect("attribute pattern is valid")
    })
}

fn script_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)(?P<open><script\b[^>]*>)(?P<body>.*?)(?P<close></script\s*>)")
            .expect("script pattern is valid")
    })
}

fn refresh_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)^(?P<head>\s*\d+(?:\.\d+)?\s*;\s*url\s*=\s*)(?P<target>.+?)\s*$")
            .expect("refresh pattern is valid")
    })
}

/// What happened to one link value
#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkRewrite {
    /// Not an internal absolute link
    Untouched,
    /// Rewritten to a relative mirror target
    Localized(String),
    /// Internal but never fetched; points at the live origin
    Degraded(String),
}

/// Counters for a single document
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DocumentStats {
    pub links_rewritten: usize,
    pub links_degraded: usize,
}

/// Rewrites the links of one HTML document
///
/// `local_path` is the document's mirror-relative location; its first
/// segment is the host directory, used as the host of root-relative links.
/// `files` is the set of mirror-relative file paths.
pub(crate) struct DocumentRewriter<'a> {
    scope: &'a HostScope,
    files: &'a HashSet<String>,
    page_host: &'a str,
    directory: Vec<&'a str>,
}

impl<'a> DocumentRewriter<'a> {
    pub(crate) fn new(
        scope: &'a HostScope,
        files: &'a HashSet<String>,
        local_path: &'a str,
    ) -> Option<Self> {
        let mut segments: Vec<&str> = local_path.split('/').collect();
        segments.pop();
        let page_host = *segments.first()?;
        Some(Self {
            scope,
            files,
            page_host,
            directory: segments,
        })
    }

    /// Rewrites the document; returns the new text and its counters
    pub(crate) fn rewrite(&self, html: &str) -> (String, DocumentStats) {
        let mut stats = DocumentStats::default();

        let output = attribute_pattern().replace_all(html, |caps: &Captures| {
            let (quote, value) = match (caps.name("dq"), caps.name("sq")) {
                (Some(v), _) => ('"', v.as_str()),
                (None, Some(v)) => ('\'', v.as_str()),
                (None, None) => return caps[0].to_string(),
            };
            let name = caps["name"].to_ascii_lowercase();

            let replaced = if name == "content" {
                self.rewrite_refresh(value, &mut stats)
            } else if SRCSET_ATTRIBUTES.contains(&name.as_str()) {
                self.rewrite_srcset(value, &mut stats)
            } else if URL_ATTRIBUTES.contains(&name.as_str()) {
                self.apply(value, &mut stats)
            } else {
                None
            };

            match replaced {
                Some(new_value) => format!(
                    "{}{}{}{}{}{}",
                    &caps["lead"], &caps["name"], &caps["eq"], quote, new_value, quote
                ),
                None => caps[0].to_string(),
            }
        });

        let output = script_pattern().replace_all(&output, |caps: &Captures| {
            let body = embedded_url_regex().replace_all(&caps["body"], |m: &Captures| {
                self.rewrite_embedded(&m[0], &mut stats)
            });
            format!("{}{}{}", &caps["open"], body, &caps["close"])
        });

        (output.into_owned(), stats)
    }

    /// Rewrites an absolute URL found in script text
    ///
    /// Only mirrored targets change; `\/` escaping is kept. Anything else is
    /// left as written and not counted.
    fn rewrite_embedded(&self, raw: &str, stats: &mut DocumentStats) -> String {
        let (url, tail) = split_embedded_url(raw);
        let escaped = url.contains("\\/");
        match self.rewrite_link(&url.replace("\\/", "/")) {
            LinkRewrite::Localized(target) => {
                stats.links_rewritten += 1;
                let target = if escaped {
                    target.replace('/', "\\/")
                } else {
                    target
                };
                format!("{}{}", target, tail)
            }
            _ => raw.to_string(),
        }
    }

    fn apply(&self, value: &str, stats: &mut DocumentStats) -> Option<String> {
        match self.rewrite_link(value) {
            LinkRewrite::Untouched => None,
            LinkRewrite::Localized(target) => {
                stats.links_rewritten += 1;
                Some(target)
            }
            LinkRewrite::Degraded(target) => {
                stats.links_degraded += 1;
                Some(target)
            }
        }
    }

    fn rewrite_refresh(&self, value: &str, stats: &mut DocumentStats) -> Option<String> {
        let caps = refresh_pattern().captures(value)?;
        let target = caps["target"].trim_matches(|c| c == '\'' || c == '"');
        let new_target = self.apply(target, stats)?;
        Some(format!("{}{}", &caps["head"], new_target))
    }

    fn rewrite_srcset(&self, value: &str, stats: &mut DocumentStats) -> Option<String> {
        let mut changed = false;
        let candidates: Vec<String> = value
            .split(',')
            .map(|candidate| {
                let trimmed = candidate.trim();
                let (url_part, descriptor) = match trimmed.split_once(char::is_whitespace) {
                    Some((u, d)) => (u, Some(d.trim())),
                    None => (trimmed, None),
                };
                match self.apply(url_part, stats) {
                    Some(new_url) => {
                        changed = true;
                        match descriptor {
                            Some(d) => format!("{} {}", new_url, d),
                            None => new_url,
                        }
                    }
                    None => trimmed.to_string(),
                }
            })
            .collect();

        changed.then(|| candidates.join(", "))
    }

    fn rewrite_link(&self, raw: &str) -> LinkRewrite {
        let value = raw.trim().replace("&amp;", "&");
        let root_relative = value.starts_with('/') && !value.starts_with("//");
        let absolute = value.starts_with("//")
            || value.get(..7).is_some_and(|p| p.eq_ignore_ascii_case("http://"))
            || value.get(..8).is_some_and(|p| p.eq_ignore_ascii_case("https://"));
        if !root_relative && !absolute {
            return LinkRewrite::Untouched;
        }

        let Some(url) = Url::parse(&format!("https://{}/", self.page_host))
            .ok()
            .and_then(|base| base.join(&value).ok())
        else {
            return LinkRewrite::Untouched;
        };
        if absolute && !self.scope.contains(&url) {
            return LinkRewrite::Untouched;
        }

        let fragment = url.fragment().map(|f| format!("#{}", f)).unwrap_or_default();
        let Ok(normalized) = normalize_parsed(url.clone()) else {
            return LinkRewrite::Untouched;
        };

        match self.locate(&normalized) {
            Some(found) => LinkRewrite::Localized(format!("{}{}", self.relative_to(&found), fragment)),
            None if root_relative => {
                let mut origin = url;
                let _ = origin.set_scheme("https");
                LinkRewrite::Degraded(origin.as_str().replace('&', "&amp;"))
            }
            None => LinkRewrite::Degraded(raw.to_string()),
        }
    }

    /// Finds the mirrored file for a normalized URL
    fn locate(&self, url: &Url) -> Option<String> {
        let host = host_key(url)?;
        let path = percent_decode_str(url.path()).decode_utf8().ok()?;
        let key = format!("{}/{}", host, path.trim_start_matches('/'));
        let exists = |candidate: &str| self.files.contains(candidate);

        if let Some(query) = url.query().filter(|q| !q.is_empty()) {
            let with_query = format!("{}?{}", key, query.replace('/', "%2F"));
            if let Some(found) = resolve_candidate(&with_query, exists) {
                return is_servable(&found).then_some(found);
            }
        }
        resolve_candidate(&key, exists).filter(|found| is_servable(found))
    }

    /// Path of a mirror-relative file as seen from this document's directory
    fn relative_to(&self, target: &str) -> String {
        relative_path(&self.directory, target)
    }
}

/// Encoded relative URL from a mirror directory to a mirror-relative file
pub(crate) fn relative_path(directory: &[&str], target: &str) -> String {
    let target_segments: Vec<&str> = target.split('/').collect();
    let (target_dir, file) = target_segments.split_at(target_segments.len() - 1);

    let common = directory
        .iter()
        .zip(target_dir)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = vec!["..".to_string(); directory.len() - common];
    parts.extend(
        target_dir[common..]
            .iter()
            .chain(file)
            .map(|s| utf8_percent_encode(s, SEGMENT).to_string()),
    );
    parts.join("/")
}

/// True if a request for the file's encoded path resolves back to it
fn is_servable(file: &str) -> bool {
    let encoded: Vec<String> = file
        .split('/')
        .map(|s| utf8_percent_encode(s, SEGMENT).to_string())
        .collect();
    sanitize_request_path(&encoded.join("/")).as_deref() == Some(file)
}

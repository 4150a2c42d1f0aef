//! HTML and CSS reference extraction
//!
//! This module handles parsing fetched documents to extract:
//! - Navigational links to follow (anchors, canonical/alternate, meta refresh)
//! - Page requisites (images, scripts, stylesheets, media)
//! - `url()` and `@import` references inside CSS
//! - Lazily loaded references (`data-src`, inline styles) for the second pass
//! - Absolute URLs written inside inline scripts, plain or JSON-escaped

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Navigational link targets (absolute URLs)
    pub links: Vec<Url>,

    /// Sub-resources needed to render the page (absolute URLs)
    pub requisites: Vec<Url>,
}

/// `link[rel]` values that name a navigational target
const NAV_RELS: &[&str] = &["canonical", "alternate"];

/// `link[rel]` values that name a page requisite
const REQUISITE_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "shortcut",
    "apple-touch-icon",
    "apple-touch-icon-precomposed",
    "mask-icon",
    "manifest",
    "preload",
    "modulepreload",
    "prefetch",
];

fn css_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]+))\s*\)"#)
            .expect("valid CSS url() regex")
    })
}

/// Absolute http(s) URL inside script text, with `/` optionally written `\/`
pub fn embedded_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)https?:(?:\\?/){2}[^\s"'<>()\\`]+(?:\\/[^\s"'<>()\\`]*)*"#)
            .expect("valid embedded URL regex")
    })
}

fn css_import_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)@import\s+(?:"([^"]+)"|'([^']+)')"#).expect("valid CSS @import regex")
    })
}

/// Parses HTML content and extracts links, requisites and the title
///
/// # Link Extraction Rules
///
/// **Navigational:**
/// - `<a href>` and `<area href>` (except `<a download>`)
/// - `<link rel="canonical|alternate" href>`
/// - `<meta http-equiv="refresh" content="N; url=...">`
///
/// **Requisites:**
/// - `<img src|srcset>`, `<source src|srcset>`, `<script src>`
/// - `<link rel="stylesheet|icon|preload|..." href>`, `<link imagesrcset>`
/// - `<video poster|src>`, `<audio src>`, `<track src>`, `<embed src>`
///
/// **Script text:** absolute URLs inside `<script>` bodies, including
/// JSON-escaped ones (`https:\/\/host\/path`), join the links; the admission
/// gate classifies them by shape.
///
/// **Never extracted:** `javascript:`, `mailto:`, `tel:`, `data:` and
/// fragment-only references.
///
/// Relative references resolve against `<base href>` when the document has
/// one, otherwise against `page_url`.
///
/// # Returns
///
/// * `Ok(ParsedPage)` - The extracted references
/// * `Err(String)` - The body is not a text document
///
/// # Example
///
/// ```
/// use site_mirror::crawler::parse_html;
/// use url::Url;
///
/// let html = br#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_html(html, &page_url).unwrap();
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(body: &[u8], page_url: &Url) -> Result<ParsedPage, String> {
    let html = decode_text(body)?;
    let document = Html::parse_document(&html);
    let base_url = document_base(&document, page_url);

    let mut parsed = ParsedPage {
        title: extract_title(&document),
        ..ParsedPage::default()
    };

    for element in select(&document, "a[href], area[href]") {
        if element.value().attr("download").is_some() {
            continue;
        }
        push_resolved(&mut parsed.links, element.value().attr("href"), &base_url);
    }

    for element in select(&document, "link[href]") {
        let href = element.value().attr("href");
        let rels = rel_tokens(&element);
        if rels.iter().any(|r| NAV_RELS.contains(&r.as_str())) {
            push_resolved(&mut parsed.links, href, &base_url);
        } else if rels.iter().any(|r| REQUISITE_RELS.contains(&r.as_str())) {
            push_resolved(&mut parsed.requisites, href, &base_url);
        }
    }

    for element in select(&document, "meta[http-equiv][content]") {
        let is_refresh = element
            .value()
            .attr("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("refresh"));
        if is_refresh {
            let target = element.value().attr("content").and_then(meta_refresh_target);
            push_resolved(&mut parsed.links, target, &base_url);
        }
    }

    for (selector, attr) in [
        ("img[src]", "src"),
        ("source[src]", "src"),
        ("script[src]", "src"),
        ("video[src]", "src"),
        ("video[poster]", "poster"),
        ("audio[src]", "src"),
        ("track[src]", "src"),
        ("embed[src]", "src"),
        ("input[type=image][src]", "src"),
    ] {
        for element in select(&document, selector) {
            push_resolved(&mut parsed.requisites, element.value().attr(attr), &base_url);
        }
    }

    for (selector, attr) in [
        ("img[srcset]", "srcset"),
        ("source[srcset]", "srcset"),
        ("link[imagesrcset]", "imagesrcset"),
    ] {
        for element in select(&document, selector) {
            if let Some(srcset) = element.value().attr(attr) {
                for candidate in srcset_urls(srcset) {
                    push_resolved(&mut parsed.requisites, Some(candidate), &base_url);
                }
            }
        }
    }

    for element in select(&document, "script") {
        let text: String = element.text().collect();
        parsed.links.extend(extract_script_urls(&text));
    }

    Ok(parsed)
}

/// Extracts absolute URLs from script text
///
/// # Example
///
/// ```
/// use site_mirror::crawler::extract_script_urls;
///
/// let urls = extract_script_urls(r#"{"logo":"https:\/\/example.com\/img\/logo.png"}"#);
/// assert_eq!(urls[0].as_str(), "https://example.com/img/logo.png");
/// ```
pub fn extract_script_urls(script: &str) -> Vec<Url> {
    embedded_url_regex()
        .find_iter(script)
        .filter_map(|m| {
            let (url, _) = split_embedded_url(m.as_str());
            Url::parse(&url.replace("\\/", "/")).ok()
        })
        .collect()
}

/// Splits an embedded URL match into the URL and trailing punctuation
pub fn split_embedded_url(raw: &str) -> (&str, &str) {
    let url = raw.trim_end_matches(|c| matches!(c, '.' | ',' | ';' | ':' | '!' | '?'));
    raw.split_at(url.len())
}

/// Extracts references that only become visible after the primary pass
///
/// Covers lazy-loading attributes (`data-src`, `data-srcset`, `data-bg`,
/// `data-background`), `url()` inside `style` attributes and inline
/// `<style>` blocks.
pub fn extract_deferred_references(body: &[u8], page_url: &Url) -> Result<Vec<Url>, String> {
    let html = decode_text(body)?;
    let document = Html::parse_document(&html);
    let base_url = document_base(&document, page_url);
    let mut found = Vec::new();

    for attr in ["data-src", "data-bg", "data-background"] {
        for element in select(&document, &format!("[{}]", attr)) {
            push_resolved(&mut found, element.value().attr(attr), &base_url);
        }
    }

    for element in select(&document, "[data-srcset]") {
        if let Some(srcset) = element.value().attr("data-srcset") {
            for candidate in srcset_urls(srcset) {
                push_resolved(&mut found, Some(candidate), &base_url);
            }
        }
    }

    for element in select(&document, "[style]") {
        if let Some(style) = element.value().attr("style") {
            found.extend(extract_css_urls(style, &base_url));
        }
    }

    for element in select(&document, "style") {
        let css: String = element.text().collect();
        found.extend(extract_css_urls(&css, &base_url));
    }

    Ok(found)
}

/// Extracts `url(...)` and `@import` targets from a stylesheet
///
/// References resolve against the stylesheet's own URL.
///
/// # Example
///
/// ```
/// use site_mirror::crawler::extract_css_urls;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/css/site.css").unwrap();
/// let urls = extract_css_urls("body { background: url('../img/logo.png') }", &base);
/// assert_eq!(urls[0].as_str(), "https://example.com/img/logo.png");
/// ```
pub fn extract_css_urls(css: &str, base_url: &Url) -> Vec<Url> {
    let mut found = Vec::new();

    for caps in css_url_regex().captures_iter(css) {
        let value = caps.get(1).or(caps.get(2)).or(caps.get(3)).map(|m| m.as_str());
        push_resolved(&mut found, value, base_url);
    }

    for caps in css_import_regex().captures_iter(css) {
        let value = caps.get(1).or(caps.get(2)).map(|m| m.as_str());
        push_resolved(&mut found, value, base_url);
    }

    found
}

/// Splits a `srcset` value into its candidate URLs
pub fn srcset_urls(srcset: &str) -> Vec<&str> {
    srcset
        .split(',')
        .filter_map(|candidate| candidate.split_whitespace().next())
        .collect()
}

/// Returns the `url=` target of a meta refresh `content` value
pub fn meta_refresh_target(content: &str) -> Option<&str> {
    let lower = content.to_ascii_lowercase();
    let idx = lower.find("url=")?;
    let target = content[idx + 4..].trim().trim_matches(|c| c == '\'' || c == '"');
    if target.is_empty() {
        None
    } else {
        Some(target)
    }
}

/// Resolves a reference to an absolute HTTP(S) URL
///
/// Returns None if the reference should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only references
/// - invalid URLs or non-HTTP(S) URLs after resolution
pub fn resolve_reference(reference: &str, base_url: &Url) -> Option<Url> {
    let reference = reference.trim();

    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lower = reference.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let absolute = base_url.join(reference).ok()?;
    match absolute.scheme() {
        "http" | "https" => Some(absolute),
        _ => None,
    }
}

fn push_resolved(out: &mut Vec<Url>, reference: Option<&str>, base_url: &Url) {
    if let Some(url) = reference.and_then(|r| resolve_reference(r, base_url)) {
        out.push(url);
    }
}

fn decode_text(body: &[u8]) -> Result<String, String> {
    let head = &body[..body.len().min(1024)];
    if head.contains(&0) {
        return Err("body is binary, not an HTML document".to_string());
    }
    Ok(String::from_utf8_lossy(body).into_owned())
}

fn select<'a>(document: &'a Html, selector: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(selector) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

/// Returns the effective base URL of a document
fn document_base(document: &Html, page_url: &Url) -> Url {
    select(document, "base[href]")
        .first()
        .and_then(|base| base.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

fn rel_tokens(element: &ElementRef<'_>) -> Vec<String> {
    element
        .value()
        .attr("rel")
        .unwrap_or("")
        .split_whitespace()
        .map(|t| t.to_ascii_lowercase())
        .collect()
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    select(document, "title")
        .first()
        .map(|element| element.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

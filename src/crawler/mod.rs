//! Crawler module: frontier expansion and fetching primitives
//!
//! This module contains the crawl side of a mirror run, including:
//! - The `Fetcher` capability and its reqwest implementation
//! - HTML and CSS reference extraction
//! - The frontier of URL records
//! - Per-host politeness scheduling
//! - The admission gate every discovered URL passes through

mod fetcher;
mod frontier;
mod parser;
mod scheduler;

pub use fetcher::{
    build_http_client, fetch_with_retry, FetchFailure, FetchOutcome, FetchResponse, Fetcher,
    HttpFetcher,
};
pub use frontier::{AddOutcome, Frontier};
pub use parser::{
    embedded_url_regex, extract_css_urls, extract_deferred_references, extract_script_urls,
    meta_refresh_target, parse_html, resolve_reference, split_embedded_url, srcset_urls,
    ParsedPage,
};
pub use scheduler::Scheduler;

use crate::robots::ParsedRobots;
use crate::state::{Category, Source, UrlRecord};
use crate::url::{classify_link, frontier_url, host_key, normalize_parsed, HostScope};
use std::sync::Arc;
use url::Url;

/// Result of offering a URL to the admission gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Already known to the frontier
    Duplicate,
    /// Not http(s) or not normalizable
    Invalid,
    /// Host outside the mirrored set
    External,
    /// Excluded by robots.txt
    Disallowed,
    /// Page beyond the maximum link depth
    TooDeep,
    /// The frontier reached its URL bound
    LimitReached,
}

/// The admission gate in front of the frontier
///
/// Every URL (seed, link, requisite, second-pass reference) is offered
/// here, so scope, robots and bounds are enforced in exactly one place.
#[derive(Debug)]
pub struct Crawler {
    scope: HostScope,
    robots: ParsedRobots,
    /// Host key the robots rules were fetched for
    robots_host: String,
    /// Product token matched against robots.txt groups
    product_token: String,
    max_depth: u32,
    frontier: Arc<Frontier>,
}

impl Crawler {
    pub fn new(
        scope: HostScope,
        robots: ParsedRobots,
        robots_host: impl Into<String>,
        product_token: impl Into<String>,
        max_depth: u32,
        frontier: Arc<Frontier>,
    ) -> Self {
        Self {
            scope,
            robots,
            robots_host: robots_host.into(),
            product_token: product_token.into(),
            max_depth,
            frontier,
        }
    }

    pub fn frontier(&self) -> &Arc<Frontier> {
        &self.frontier
    }

    /// Returns true if robots.txt permits fetching the URL
    ///
    /// Only the origin whose robots.txt was read during discovery carries
    /// rules; other allowlisted hosts are unrestricted.
    pub fn robots_allows(&self, url: &Url) -> bool {
        match host_key(url) {
            Some(host) if host == self.robots_host => {
                self.robots.is_allowed(url.as_str(), &self.product_token)
            }
            _ => true,
        }
    }

    /// Offers a URL to the frontier
    ///
    /// # Arguments
    ///
    /// * `url` - Absolute URL, not yet normalized
    /// * `depth` - Link distance from the seed set
    /// * `source` - How the URL was found
    /// * `category` - Page or resource
    pub fn admit(&self, url: &Url, depth: u32, source: Source, category: Category) -> Admission {
        let normalized = match normalize_parsed(url.clone()) {
            Ok(u) => u,
            Err(_) => return Admission::Invalid,
        };

        if !self.scope.contains(&normalized) {
            return Admission::External;
        }

        let key = frontier_url(&normalized, category);

        if self.frontier.contains(&key) {
            return Admission::Duplicate;
        }

        if !self.robots_allows(&key) {
            tracing::debug!("Skipping {} (disallowed by robots.txt)", key);
            return Admission::Disallowed;
        }

        // Requisites are admitted regardless of depth
        if category == Category::Page && depth > self.max_depth {
            return Admission::TooDeep;
        }

        match self
            .frontier
            .add(UrlRecord::new(key, depth, source, category))
        {
            AddOutcome::Added => Admission::Admitted,
            AddOutcome::Duplicate => Admission::Duplicate,
            AddOutcome::LimitReached => Admission::LimitReached,
        }
    }

    /// Admits the outgoing references of a fetched page
    ///
    /// Navigational links are classified as page or resource by their shape;
    /// requisites are always resources. Returns the number admitted.
    pub fn admit_page_references(&self, page: &UrlRecord, parsed: &ParsedPage) -> usize {
        let depth = page.depth + 1;
        let mut admitted = 0;

        for link in &parsed.links {
            if self.admit(link, depth, Source::Link, classify_link(link)) == Admission::Admitted {
                admitted += 1;
            }
        }

        for requisite in &parsed.requisites {
            if self.admit(requisite, depth, Source::Requisite, Category::Resource)
                == Admission::Admitted
            {
                admitted += 1;
            }
        }

        admitted
    }

    /// Admits a batch of resource references with a common source
    pub fn admit_resources(&self, urls: &[Url], depth: u32, source: Source) -> usize {
        urls.iter()
            .filter(|url| self.admit(url, depth, source, Category::Resource) == Admission::Admitted)
            .count()
    }
}

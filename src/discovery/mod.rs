//! URL discovery from site metadata
//!
//! Seeds a mirror run from the start URL, robots.txt and every sitemap it
//! can reach (conventional locations, robots `Sitemap:` lines and nested
//! sitemap indexes). Every failure here is logged and skipped; only an empty
//! seed set is fatal, and that is decided by the caller.

mod sitemap;

pub use sitemap::{parse_sitemap, SitemapDocument};

use crate::crawler::{Fetcher, Scheduler};
use crate::robots::{fetch_robots, ParsedRobots};
use crate::state::{Category, FailureReason, Source};
use crate::url::{classify_link, frontier_url, normalize_parsed, normalize_url, HostScope};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use url::Url;

/// Sitemap paths tried on the start URL's origin
const SITEMAP_CANDIDATES: &[&str] = &["/sitemap.xml", "/sitemap_index.xml", "/sitemaps.xml"];

/// A discovered seed URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    /// Normalized URL (page query dropped for pages)
    pub url: Url,
    pub source: Source,
    pub category: Category,
}

/// Output of the discovery phase
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Deduplicated seeds restricted to internal hosts and allowed by robots.txt
    pub seeds: Vec<Seed>,

    /// Rules of the start URL's origin (allow-all if unavailable)
    pub robots: ParsedRobots,

    /// Sitemap documents successfully read, in reading order
    pub sitemaps_read: Vec<String>,

    /// Human readable descriptions of every skipped source
    pub errors: Vec<String>,
}

/// Discovery settings
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Product token matched against robots.txt groups
    pub product_token: String,
    pub max_sitemap_files: usize,
    pub politeness_delay: Duration,
}

/// Runs discovery for a start URL
///
/// # Arguments
///
/// * `fetcher` - The fetch capability
/// * `start_url` - Entry URL of the site (already validated)
/// * `scope` - Internal host set
/// * `options` - Product token, sitemap bound and politeness delay
pub async fn discover(
    fetcher: &dyn Fetcher,
    start_url: &Url,
    scope: &HostScope,
    options: &DiscoveryOptions,
) -> Discovery {
    let scheduler = Scheduler::new(options.politeness_delay);
    let mut errors = Vec::new();

    scheduler.wait_turn(start_url).await;
    let robots = match fetch_robots(fetcher, start_url).await {
        Ok(robots) => robots,
        Err(failure) => {
            let message = format!(
                "robots.txt unavailable ({}: {}), assuming allow-all",
                failure.reason, failure.detail
            );
            tracing::warn!("{}", message);
            errors.push(message);
            ParsedRobots::allow_all()
        }
    };

    let mut seeds = SeedSet::new(scope, &robots, &options.product_token);
    seeds.offer(start_url, Source::Start);

    let mut queue: VecDeque<(Url, Source)> = VecDeque::new();
    let mut queued: HashSet<String> = HashSet::new();

    for path in SITEMAP_CANDIDATES {
        if let Ok(candidate) = start_url.join(path) {
            if queued.insert(candidate.as_str().to_string()) {
                queue.push_back((candidate, Source::Sitemap));
            }
        }
    }
    for advertised in robots.sitemaps() {
        match normalize_url(&advertised) {
            Ok(candidate) => {
                if queued.insert(candidate.as_str().to_string()) {
                    queue.push_back((candidate, Source::Robots));
                }
            }
            Err(e) => {
                let message = format!("Ignoring robots.txt sitemap '{}': {}", advertised, e);
                tracing::warn!("{}", message);
                errors.push(message);
            }
        }
    }

    let mut sitemaps_read = Vec::new();
    let mut attempts = 0;

    while let Some((sitemap_url, source)) = queue.pop_front() {
        if attempts >= options.max_sitemap_files {
            tracing::info!(
                "Sitemap limit of {} reached, {} sitemap(s) not read",
                options.max_sitemap_files,
                queue.len() + 1
            );
            break;
        }

        if !scope.contains(&sitemap_url) {
            tracing::debug!("Skipping external sitemap {}", sitemap_url);
            continue;
        }

        attempts += 1;
        scheduler.wait_turn(&sitemap_url).await;
        let response = match fetcher.fetch(&sitemap_url).await {
            Ok(response) => response,
            Err(failure) => {
                // Absent conventional sitemaps are the common case
                if source == Source::Sitemap && failure.reason == FailureReason::Http4xx {
                    tracing::debug!("No sitemap at {} ({})", sitemap_url, failure.detail);
                } else {
                    tracing::warn!("Failed to fetch sitemap {}: {}", sitemap_url, failure.detail);
                }
                errors.push(format!("{}: {}", sitemap_url, failure.detail));
                continue;
            }
        };

        let document = match parse_sitemap(&response.body) {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!("Malformed sitemap {}: {}", sitemap_url, e);
                errors.push(format!("{}: {}", sitemap_url, e));
                continue;
            }
        };

        tracing::debug!(
            "Sitemap {} lists {} URL(s) and {} nested sitemap(s)",
            sitemap_url,
            document.urls.len(),
            document.sitemaps.len()
        );
        sitemaps_read.push(sitemap_url.to_string());

        for nested in &document.sitemaps {
            match sitemap_url.join(nested.trim()) {
                Ok(nested_url) => {
                    if queued.insert(nested_url.as_str().to_string()) {
                        queue.push_back((nested_url, source));
                    }
                }
                Err(e) => errors.push(format!("{}: bad nested sitemap '{}': {}", sitemap_url, nested, e)),
            }
        }

        for loc in &document.urls {
            match sitemap_url.join(loc.trim()) {
                Ok(url) => seeds.offer(&url, source),
                Err(e) => errors.push(format!("{}: bad <loc> '{}': {}", sitemap_url, loc, e)),
            }
        }
    }

    let seeds = seeds.into_seeds();
    tracing::info!(
        "Discovery found {} seed(s) from {} sitemap(s), {} source(s) skipped",
        seeds.len(),
        sitemaps_read.len(),
        errors.len()
    );

    Discovery {
        seeds,
        robots,
        sitemaps_read,
        errors,
    }
}

/// Accumulates seeds in discovery order, applying scope, robots and dedup
struct SeedSet<'a> {
    scope: &'a HostScope,
    robots: &'a ParsedRobots,
    product_token: &'a str,
    seen: HashSet<String>,
    seeds: Vec<Seed>,
}

impl<'a> SeedSet<'a> {
    fn new(scope: &'a HostScope, robots: &'a ParsedRobots, product_token: &'a str) -> Self {
        Self {
            scope,
            robots,
            product_token,
            seen: HashSet::new(),
            seeds: Vec::new(),
        }
    }

    fn offer(&mut self, url: &Url, source: Source) {
        let Ok(normalized) = normalize_parsed(url.clone()) else {
            return;
        };
        if !self.scope.contains(&normalized) {
            return;
        }

        let category = classify_link(&normalized);
        let url = frontier_url(&normalized, category);

        if !self.robots.is_allowed(url.as_str(), self.product_token) {
            tracing::debug!("Seed {} disallowed by robots.txt", url);
            return;
        }

        if self.seen.insert(url.as_str().to_string()) {
            self.seeds.push(Seed {
                url,
                source,
                category,
            });
        }
    }

    fn into_seeds(self) -> Vec<Seed> {
        self.seeds
    }
}

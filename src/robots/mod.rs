//! Robots.txt handling module
//!
//! This module provides fetching and parsing of robots.txt files. The parsed
//! rules gate admission to the frontier; `Crawl-delay` feeds the politeness
//! scheduler and `Sitemap:` lines feed discovery.

mod parser;

pub use parser::ParsedRobots;

use crate::crawler::{FetchFailure, Fetcher};
use crate::state::FailureReason;
use url::Url;

/// Returns the robots.txt location for the origin of `url`
pub fn robots_url(url: &Url) -> Url {
    let mut robots = url.clone();
    robots.set_path("/robots.txt");
    robots.set_query(None);
    robots.set_fragment(None);
    robots
}

/// Fetches robots.txt for the origin of `url`
///
/// A 4xx response means the site publishes no rules and yields an allow-all
/// policy. Any other failure is returned so the caller can log it; callers
/// then proceed with [`ParsedRobots::allow_all`].
///
/// # Arguments
///
/// * `fetcher` - The fetch capability
/// * `url` - Any URL on the origin
pub async fn fetch_robots(fetcher: &dyn Fetcher, url: &Url) -> Result<ParsedRobots, FetchFailure> {
    let location = robots_url(url);
    match fetcher.fetch(&location).await {
        Ok(response) => {
            let content = String::from_utf8_lossy(&response.body);
            tracing::debug!("Fetched {} ({} bytes)", location, response.body.len());
            Ok(ParsedRobots::from_content(&content))
        }
        Err(failure) if failure.reason == FailureReason::Http4xx => {
            tracing::debug!("No robots.txt at {} ({})", location, failure.detail);
            Ok(ParsedRobots::allow_all())
        }
        Err(failure) => Err(failure),
    }
}

/// Checks if a URL is allowed by robots.txt
///
/// # Arguments
///
/// * `robots` - The parsed robots.txt data
/// * `url` - The URL to check
/// * `user_agent` - The crawler's product token
pub fn is_allowed(robots: &ParsedRobots, url: &Url, user_agent: &str) -> bool {
    robots.is_allowed(url.as_str(), user_agent)
}

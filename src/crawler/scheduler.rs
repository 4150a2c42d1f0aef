//! Per-host politeness scheduling
//!
//! Workers share one scheduler. Before every request a worker reserves the
//! next slot of the target `host[:port]` and sleeps until it starts, so two
//! requests to the same host are always at least the effective delay apart
//! no matter how many workers are running.

use crate::robots::ParsedRobots;
use crate::state::HostState;
use crate::url::host_key;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use url::Url;

/// Politeness scheduler shared by all workers of a run
#[derive(Debug)]
pub struct Scheduler {
    /// Per-host request timing
    hosts: Mutex<HashMap<String, HostState>>,

    /// Configured minimum spacing between requests to one host
    politeness_delay: Duration,

    /// Robots `Crawl-delay` values by host key
    crawl_delays: HashMap<String, Duration>,
}

impl Scheduler {
    /// Creates a scheduler with the configured politeness delay
    pub fn new(politeness_delay: Duration) -> Self {
        Self {
            hosts: Mutex::new(HashMap::new()),
            politeness_delay,
            crawl_delays: HashMap::new(),
        }
    }

    /// Registers the robots.txt of a host so its `Crawl-delay` is honoured
    pub fn with_robots(mut self, host: &str, robots: &ParsedRobots, user_agent: &str) -> Self {
        if let Some(seconds) = robots.crawl_delay(user_agent) {
            if seconds.is_finite() && seconds > 0.0 {
                tracing::info!("Honouring Crawl-delay of {}s for {}", seconds, host);
                self.crawl_delays
                    .insert(host.to_string(), Duration::from_secs_f64(seconds));
            }
        }
        self
    }

    /// Calculates the effective delay for a host
    ///
    /// This takes the maximum of the configured politeness delay and the
    /// robots.txt crawl delay (if specified).
    pub fn effective_delay(&self, host: &str) -> Duration {
        let robots_delay = self
            .crawl_delays
            .get(host)
            .copied()
            .unwrap_or(Duration::ZERO);
        std::cmp::max(self.politeness_delay, robots_delay)
    }

    /// Reserves the next request slot for the URL's host
    ///
    /// Returns the instant the request may start.
    pub fn reserve(&self, url: &Url) -> Instant {
        let host = host_key(url).unwrap_or_default();
        let delay = self.effective_delay(&host);
        let now = Instant::now();

        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        let state = hosts.entry(host).or_insert_with(HostState::new);
        state.reserve(now, delay)
    }

    /// Waits until a request to the URL's host is allowed
    pub async fn wait_turn(&self, url: &Url) {
        let start = self.reserve(url);
        let now = Instant::now();
        if start > now {
            tracing::trace!("Waiting {:?} before requesting {}", start - now, url);
            tokio::time::sleep_until(tokio::time::Instant::from_std(start)).await;
        }
    }

    /// Returns the number of requests reserved against a host
    pub fn request_count(&self, host: &str) -> u32 {
        let hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts.get(host).map_or(0, |s| s.request_count)
    }
}

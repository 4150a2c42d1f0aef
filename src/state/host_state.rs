use std::time::{Duration, Instant};

/// Tracks request timing for one `host[:port]`
///
/// Workers reserve slots instead of polling: each reservation returns the
/// instant the request may start and pushes the next free slot forward by
/// the host's delay, so concurrent workers on the same host queue up behind
/// each other.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Number of requests reserved against this host
    pub request_count: u32,

    /// Start time of the most recently reserved request
    pub last_request_time: Option<Instant>,

    /// Earliest instant the next request may start
    next_available: Option<Instant>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a request could start at `now`
    pub fn can_request(&self, now: Instant) -> bool {
        self.next_available.map_or(true, |at| now >= at)
    }

    /// Returns how long to wait before a request could start
    ///
    /// Returns None if a request can be made now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        match self.next_available {
            Some(at) if at > now => Some(at - now),
            _ => None,
        }
    }

    /// Reserves the next request slot
    ///
    /// # Arguments
    ///
    /// * `now` - The current time instant
    /// * `delay` - Minimum spacing between two requests to this host
    ///
    /// # Returns
    ///
    /// The instant at which the reserved request may start
    pub fn reserve(&mut self, now: Instant, delay: Duration) -> Instant {
        let start = match self.next_available {
            Some(at) if at > now => at,
            _ => now,
        };
        self.request_count += 1;
        self.last_request_time = Some(start);
        self.next_available = Some(start + delay);
        start
    }
}

//! The frontier: every URL record of a run and the queue of unclaimed ones
//!
//! All mutation goes through one mutex so that admission (dedup plus the
//! max-URL bound), claiming and settling are each atomic.

use crate::state::{FailureReason, UrlRecord, UrlStatus};
use crate::MirrorError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// Outcome of adding a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// A record with the same normalized URL already exists
    Duplicate,
    /// The frontier holds `max_urls` records already
    LimitReached,
}

#[derive(Debug, Default)]
struct FrontierInner {
    records: HashMap<String, UrlRecord>,
    queue: VecDeque<String>,
    in_flight: HashSet<String>,
}

/// Shared frontier of a mirror run
#[derive(Debug)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    max_urls: usize,
}

impl Frontier {
    /// Creates an empty frontier bounded to `max_urls` records
    pub fn new(max_urls: usize) -> Self {
        Self {
            inner: Mutex::new(FrontierInner::default()),
            max_urls,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a pending record unless its URL is already known
    pub fn add(&self, record: UrlRecord) -> AddOutcome {
        let key = record.url.as_str().to_string();
        let mut inner = self.lock();

        if inner.records.contains_key(&key) {
            return AddOutcome::Duplicate;
        }
        if inner.records.len() >= self.max_urls {
            return AddOutcome::LimitReached;
        }

        inner.queue.push_back(key.clone());
        inner.records.insert(key, record);
        AddOutcome::Added
    }

    /// Claims the next queued record, marking it in flight
    pub fn claim(&self) -> Option<UrlRecord> {
        let mut inner = self.lock();
        while let Some(key) = inner.queue.pop_front() {
            let Some(record) = inner.records.get(&key) else {
                continue;
            };
            if record.status != UrlStatus::Pending {
                continue;
            }
            let record = record.clone();
            inner.in_flight.insert(key);
            return Some(record);
        }
        None
    }

    /// Settles a record as fetched
    pub fn mark_fetched(&self, url: &Url) -> Result<(), MirrorError> {
        self.settle(url, UrlStatus::Fetched, None)
    }

    /// Settles a record as failed with a reason code
    pub fn mark_failed(
        &self,
        url: &Url,
        reason: FailureReason,
        detail: impl Into<String>,
    ) -> Result<(), MirrorError> {
        self.settle(url, UrlStatus::Failed, Some((reason, detail.into())))
    }

    fn settle(
        &self,
        url: &Url,
        to: UrlStatus,
        failure: Option<(FailureReason, String)>,
    ) -> Result<(), MirrorError> {
        let key = url.as_str();
        let mut inner = self.lock();

        let record = inner
            .records
            .get_mut(key)
            .ok_or_else(|| MirrorError::InvalidTransition {
                url: key.to_string(),
                from: UrlStatus::Pending,
                to,
            })?;

        if !record.status.can_transition_to(to) {
            return Err(MirrorError::InvalidTransition {
                url: key.to_string(),
                from: record.status,
                to,
            });
        }

        record.status = to;
        if let Some((reason, detail)) = failure {
            record.failure_reason = Some(reason);
            record.failure_detail = Some(detail);
        }
        inner.in_flight.remove(key);
        Ok(())
    }

    /// Fails every record that is still pending and unclaimed
    ///
    /// Used when the time budget expires; returns the number of records settled.
    pub fn settle_remaining(&self, reason: FailureReason, detail: &str) -> usize {
        let mut inner = self.lock();
        inner.queue.clear();

        let in_flight = inner.in_flight.clone();
        let mut settled = 0;
        for (key, record) in inner.records.iter_mut() {
            if record.status == UrlStatus::Pending && !in_flight.contains(key) {
                record.status = UrlStatus::Failed;
                record.failure_reason = Some(reason);
                record.failure_detail = Some(detail.to_string());
                settled += 1;
            }
        }
        settled
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.lock().records.contains_key(url.as_str())
    }

    pub fn get(&self, url: &Url) -> Option<UrlRecord> {
        self.lock().records.get(url.as_str()).cloned()
    }

    /// Number of records ever admitted
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of claimed, unsettled records
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Number of records waiting to be claimed
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns true if nothing is queued and nothing is in flight
    pub fn is_idle(&self) -> bool {
        let inner = self.lock();
        inner.queue.is_empty() && inner.in_flight.is_empty()
    }

    /// Snapshot of every record, sorted by URL
    pub fn records(&self) -> Vec<UrlRecord> {
        let mut records: Vec<UrlRecord> = self.lock().records.values().cloned().collect();
        records.sort_by(|a, b| a.url.as_str().cmp(b.url.as_str()));
        records
    }
}

//! Downloader: the worker pool that settles every frontier record
//!
//! The primary pass fetches each claimed URL once, writes the body into the
//! mirror tree and, for HTML, admits the page's links and requisites. After
//! the frontier drains, second-pass rounds scan the stored HTML and CSS for
//! references only visible there (CSS `url()`, lazy-loading attributes,
//! inline styles) and fetch whatever was missed.
//!
//! Every settled URL leaves a [`FetchEvent`] behind; the pipeline turns
//! those into the per-category fetch logs.

mod store;

pub use store::{local_path_for, MirrorStore};

use crate::crawler::{
    extract_css_urls, extract_deferred_references, fetch_with_retry, parse_html, Crawler,
    FetchResponse, Fetcher, Scheduler,
};
use crate::state::{Category, FailureReason, MirrorEntry, Source, UrlRecord, UrlStatus};
use crate::url::host_key;
use crate::MirrorError;
use chrono::{DateTime, Utc};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

/// How long an idle worker waits before polling the frontier again
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Host of the synthetic base used to resolve references of reused bodies
const LOCAL_TREE_HOST: &str = "mirror.invalid";

/// Characters escaped when a local path becomes a URL path
const LOCAL_PATH: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`');

/// Downloader settings
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub workers: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub second_pass_rounds: u32,
    /// Re-fetch URLs whose body is already in the mirror
    pub revalidate: bool,
}

/// Counters of one download phase
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    pub fetched: usize,
    pub failed: usize,
    /// Served from an earlier run's files instead of the network
    pub reused: usize,
    pub second_pass_rounds: u32,
    pub second_pass_admitted: usize,
    /// True if the time budget expired before the frontier drained
    pub timed_out: bool,
}

/// Download pass a URL was settled in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Pass {
    #[default]
    Primary,
    /// Second-pass round, counted from 1
    Second(u32),
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Second(round) => write!(f, "second-pass-{}", round),
        }
    }
}

/// How a claimed URL was settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Fetched { local_path: String, bytes: u64 },
    Reused { local_path: String },
    Failed { reason: FailureReason, detail: String },
}

/// One settled URL, in settlement order
#[derive(Debug, Clone)]
pub struct FetchEvent {
    pub at: DateTime<Utc>,
    pub pass: Pass,
    pub url: Url,
    pub category: Category,
    pub settlement: Settlement,
}

#[derive(Debug, Default)]
struct Progress {
    entries: BTreeMap<String, MirrorEntry>,
    scanned: HashSet<String>,
    /// URLs whose body was read back from an earlier run
    reused: HashSet<String>,
    pass: Pass,
    events: Vec<FetchEvent>,
    summary: DownloadSummary,
}

/// Worker pool over a shared frontier
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    crawler: Arc<Crawler>,
    scheduler: Arc<Scheduler>,
    store: MirrorStore,
    settings: DownloadSettings,
    deadline: Instant,
    /// Entries recorded as fetched by earlier runs, keyed by URL
    previous: HashMap<String, MirrorEntry>,
    /// URLs of earlier entries, keyed by local path
    previous_paths: HashMap<String, Url>,
    /// Host directories holding earlier entries
    previous_hosts: HashSet<String>,
    progress: Mutex<Progress>,
}

impl Downloader {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        crawler: Arc<Crawler>,
        scheduler: Arc<Scheduler>,
        store: MirrorStore,
        settings: DownloadSettings,
        deadline: Instant,
    ) -> Self {
        Self {
            fetcher,
            crawler,
            scheduler,
            store,
            settings,
            deadline,
            previous: HashMap::new(),
            previous_paths: HashMap::new(),
            previous_hosts: HashSet::new(),
            progress: Mutex::new(Progress::default()),
        }
    }

    /// Supplies mirror entries from earlier runs for reuse
    pub fn with_previous_entries(mut self, entries: Vec<MirrorEntry>) -> Self {
        self.previous_paths = entries
            .iter()
            .map(|e| (e.local_path.clone(), e.url.clone()))
            .collect();
        self.previous_hosts = self
            .previous_paths
            .keys()
            .filter_map(|p| p.split_once('/').map(|(host, _)| host.to_string()))
            .collect();
        self.previous = entries
            .into_iter()
            .map(|e| (e.url.as_str().to_string(), e))
            .collect();
        self
    }

    fn progress(&self) -> std::sync::MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn budget_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Settlement events recorded so far, in order
    pub fn events(&self) -> Vec<FetchEvent> {
        self.progress().events.clone()
    }

    fn record_event(&self, record: &UrlRecord, settlement: Settlement) {
        let mut progress = self.progress();
        let pass = progress.pass;
        progress.events.push(FetchEvent {
            at: Utc::now(),
            pass,
            url: record.url.clone(),
            category: record.category,
            settlement,
        });
    }

    /// Runs the primary pass and the second-pass rounds
    ///
    /// Returns every mirror entry written or reused, sorted by URL, and the
    /// counters. Records still unclaimed when the budget expires stay
    /// pending; settling them is the caller's decision.
    pub async fn run(self: &Arc<Self>) -> Result<(Vec<MirrorEntry>, DownloadSummary), MirrorError> {
        tracing::info!(
            "Starting primary pass with {} worker(s), {} URL(s) queued",
            self.settings.workers,
            self.crawler.frontier().queued()
        );
        self.run_pass().await?;

        let mut round = 0;
        while round < self.settings.second_pass_rounds && !self.budget_expired() {
            let admitted = self.scan_for_missed_references().await;
            round += 1;
            {
                let mut progress = self.progress();
                progress.pass = Pass::Second(round);
                progress.summary.second_pass_rounds = round;
                progress.summary.second_pass_admitted += admitted;
            }
            if admitted == 0 {
                tracing::debug!("Second pass round {} found nothing new", round);
                break;
            }
            tracing::info!("Second pass round {}: {} new resource(s)", round, admitted);
            self.run_pass().await?;
        }

        let mut progress = self.progress();
        progress.summary.timed_out = !self.crawler.frontier().is_idle() || self.budget_expired();
        if progress.summary.timed_out {
            tracing::warn!("Time budget exhausted, stopping downloads");
        }
        let entries = progress.entries.values().cloned().collect();
        Ok((entries, progress.summary.clone()))
    }

    /// Runs workers until the frontier is idle or the budget expires
    async fn run_pass(self: &Arc<Self>) -> Result<(), MirrorError> {
        let mut handles = Vec::with_capacity(self.settings.workers as usize);
        for worker_id in 0..self.settings.workers {
            let downloader = Arc::clone(self);
            handles.push(tokio::spawn(async move { downloader.worker(worker_id).await }));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) => tracing::error!("Download worker panicked: {}", e),
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn worker(self: &Arc<Self>, worker_id: u32) -> Result<(), MirrorError> {
        let frontier = self.crawler.frontier();
        loop {
            if self.budget_expired() {
                tracing::debug!("Worker {} stopping: time budget expired", worker_id);
                return Ok(());
            }
            match frontier.claim() {
                Some(record) => self.process_isolated(record).await?,
                None if frontier.in_flight() == 0 => return Ok(()),
                // Another worker may still admit new URLs
                None => tokio::time::sleep(IDLE_POLL).await,
            }
        }
    }

    /// Processes one claimed record in its own task
    ///
    /// A panic while processing settles the record as `internal` so it
    /// cannot stay in flight and keep the other workers polling.
    async fn process_isolated(self: &Arc<Self>, record: UrlRecord) -> Result<(), MirrorError> {
        let downloader = Arc::clone(self);
        let claimed = record.clone();
        let join_error = match tokio::spawn(async move { downloader.process(claimed).await }).await {
            Ok(result) => return result,
            Err(e) => e,
        };

        tracing::error!("Processing {} panicked: {}", record.url, join_error);
        let frontier = self.crawler.frontier();
        let still_pending = frontier
            .get(&record.url)
            .is_some_and(|r| r.status == UrlStatus::Pending);
        if still_pending {
            let detail = format!("processing panicked: {}", join_error);
            frontier.mark_failed(&record.url, FailureReason::Internal, detail.clone())?;
            self.progress().summary.failed += 1;
            self.record_event(
                &record,
                Settlement::Failed {
                    reason: FailureReason::Internal,
                    detail,
                },
            );
        }
        Ok(())
    }

    /// Settles one claimed record
    async fn process(&self, record: UrlRecord) -> Result<(), MirrorError> {
        if let Some((response, entry)) = self.try_reuse(&record).await {
            return self.after_fetch(&record, &response, entry, true).await;
        }

        self.scheduler.wait_turn(&record.url).await;
        let outcome = fetch_with_retry(
            self.fetcher.as_ref(),
            &record.url,
            self.settings.max_retries,
            self.settings.retry_delay,
        )
        .await;

        let response = match outcome {
            Ok(response) => response,
            Err(failure) => {
                tracing::debug!("Failed {} ({}: {})", record.url, failure.reason, failure.detail);
                self.crawler
                    .frontier()
                    .mark_failed(&record.url, failure.reason, failure.detail.clone())?;
                self.progress().summary.failed += 1;
                self.record_event(
                    &record,
                    Settlement::Failed {
                        reason: failure.reason,
                        detail: failure.detail,
                    },
                );
                return Ok(());
            }
        };

        let entry = match self.store.write(&record.url, record.category, &response).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Could not store {}: {}", record.url, e);
                self.crawler
                    .frontier()
                    .mark_failed(&record.url, FailureReason::WriteError, e.to_string())?;
                self.progress().summary.failed += 1;
                self.record_event(
                    &record,
                    Settlement::Failed {
                        reason: FailureReason::WriteError,
                        detail: e.to_string(),
                    },
                );
                return Ok(());
            }
        };

        tracing::debug!("Fetched {} -> {}", record.url, entry.local_path);
        self.progress().summary.fetched += 1;
        self.after_fetch(&record, &response, entry, false).await
    }

    /// Loads a body mirrored by an earlier run, if reuse applies
    async fn try_reuse(&self, record: &UrlRecord) -> Option<(FetchResponse, MirrorEntry)> {
        if self.settings.revalidate {
            return None;
        }
        let entry = self.previous.get(record.url.as_str())?;
        let body = self.store.read(&entry.local_path).await.ok()?;

        tracing::debug!("Reusing {} from {}", record.url, entry.local_path);
        {
            let mut progress = self.progress();
            progress.summary.reused += 1;
            progress.reused.insert(record.url.as_str().to_string());
        }

        let response = FetchResponse {
            final_url: record.url.clone(),
            status: 200,
            content_type: entry.content_type.clone(),
            body,
        };
        Some((response, entry.clone()))
    }

    /// Records the entry, expands the frontier and settles the record
    ///
    /// The record stays in flight until its references are admitted, so idle
    /// workers keep polling instead of seeing a drained frontier.
    async fn after_fetch(
        &self,
        record: &UrlRecord,
        response: &FetchResponse,
        entry: MirrorEntry,
        reused: bool,
    ) -> Result<(), MirrorError> {
        let is_html = response.is_html() || entry.is_html();
        let base = if reused {
            local_tree_base(&entry.local_path)
        } else {
            None
        };
        let settlement = if reused {
            Settlement::Reused {
                local_path: entry.local_path.clone(),
            }
        } else {
            Settlement::Fetched {
                local_path: entry.local_path.clone(),
                bytes: entry.byte_size,
            }
        };
        self.progress()
            .entries
            .insert(record.url.as_str().to_string(), entry);

        if is_html {
            match parse_html(&response.body, base.as_ref().unwrap_or(&response.final_url)) {
                Ok(mut parsed) => {
                    if base.is_some() {
                        parsed.links = self.restore_references(&record.url, parsed.links);
                        parsed.requisites =
                            self.restore_references(&record.url, parsed.requisites);
                    }
                    let admitted = self.crawler.admit_page_references(record, &parsed);
                    tracing::trace!("{} admitted {} new URL(s)", record.url, admitted);
                }
                Err(e) => tracing::warn!("Skipping links of {}: {}", record.url, e),
            }
        }

        self.crawler.frontier().mark_fetched(&record.url)?;
        self.record_event(record, settlement);
        Ok(())
    }

    /// Maps references resolved against the local tree back to their URLs
    ///
    /// A reused HTML body may already be localized, so its relative
    /// references name files of the mirror tree rather than origin paths.
    /// Files an earlier entry accounts for map to that entry's URL; any other
    /// local path is read as `<host>/<path>` when its first segment is a
    /// mirrored host directory, else as a path on the page's own host.
    fn restore_references(&self, page_url: &Url, urls: Vec<Url>) -> Vec<Url> {
        urls.into_iter()
            .filter_map(|url| {
                if url.host_str() != Some(LOCAL_TREE_HOST) {
                    return Some(url);
                }
                let raw_path = url.path().trim_start_matches('/');
                let local_path = percent_decode_str(raw_path).decode_utf8().ok()?;
                if let Some(original) = self.previous_paths.get(&*local_path) {
                    return Some(original.clone());
                }

                let (first, rest) = raw_path.split_once('/').unwrap_or((raw_path, ""));
                let origin = if self.previous_hosts.contains(first) {
                    format!("{}://{}/{}", page_url.scheme(), first, rest)
                } else {
                    format!("{}://{}/{}", page_url.scheme(), host_key(page_url)?, raw_path)
                };
                let mut restored = Url::parse(&origin).ok()?;
                restored.set_query(url.query());
                Some(restored)
            })
            .collect()
    }

    /// Scans stored HTML and CSS not yet scanned and admits missed references
    ///
    /// Returns the number of newly admitted resources.
    async fn scan_for_missed_references(&self) -> usize {
        let pending: Vec<MirrorEntry> = {
            let mut progress = self.progress();
            let fresh: Vec<MirrorEntry> = progress
                .entries
                .values()
                .filter(|e| (e.is_html() || e.is_css()) && !progress.scanned.contains(e.url.as_str()))
                .cloned()
                .collect();
            for entry in &fresh {
                progress.scanned.insert(entry.url.as_str().to_string());
            }
            fresh
        };

        let mut admitted = 0;
        for entry in pending {
            let body = match self.store.read(&entry.local_path).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("Cannot re-read {}: {}", entry.local_path, e);
                    continue;
                }
            };

            let reused = self.progress().reused.contains(entry.url.as_str());
            let base = if reused {
                local_tree_base(&entry.local_path)
            } else {
                None
            };

            let references = if entry.is_css() {
                Ok(extract_css_urls(&String::from_utf8_lossy(&body), &entry.url))
            } else {
                extract_deferred_references(&body, base.as_ref().unwrap_or(&entry.url))
                    .map(|urls| match base {
                        Some(_) => self.restore_references(&entry.url, urls),
                        None => urls,
                    })
            };

            let depth = self
                .crawler
                .frontier()
                .get(&entry.url)
                .map_or(0, |r| r.depth + 1);

            match references {
                Ok(urls) => {
                    admitted += self.crawler.admit_resources(&urls, depth, Source::SecondPass);
                }
                Err(e) => tracing::warn!("Skipping second pass of {}: {}", entry.url, e),
            }
        }
        admitted
    }
}

/// Base URL placing a local path inside the synthetic local-tree host
fn local_tree_base(local_path: &str) -> Option<Url> {
    let encoded = utf8_percent_encode(local_path, LOCAL_PATH).to_string();
    Url::parse(&format!("http://{}/{}", LOCAL_TREE_HOST, encoded)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::{FetchFailure, FetchOutcome, Frontier};
    use crate::robots::ParsedRobots;
    use crate::state::{Category, UrlStatus};
    use crate::url::HostScope;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Serves a fixed map of path -> (content type, body)
    struct MapFetcher {
        pages: HashMap<String, (&'static str, &'static str)>,
        delay: Duration,
    }

    #[async_trait]
    impl Fetcher for MapFetcher {
        async fn fetch(&self, url: &Url) -> FetchOutcome {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.pages.get(url.path()) {
                Some((content_type, body)) => Ok(FetchResponse {
                    final_url: url.clone(),
                    status: 200,
                    content_type: Some(content_type.to_string()),
                    body: body.as_bytes().to_vec(),
                }),
                None => Err(FetchFailure::new(FailureReason::Http4xx, "HTTP 404")),
            }
        }
    }

    /// Serves `/` linking to `/p0`..`/p{n}` and tracks overlapping fetches
    struct CountingFetcher {
        links: usize,
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &Url) -> FetchOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            let body = if url.path() == "/" {
                (0..self.links)
                    .map(|i| format!(r#"<a href="/p{}">p</a>"#, i))
                    .collect::<String>()
            } else {
                "<p>leaf</p>".to_string()
            };
            Ok(FetchResponse {
                final_url: url.clone(),
                status: 200,
                content_type: Some("text/html".to_string()),
                body: body.into_bytes(),
            })
        }
    }

    /// Panics for `/boom`, serves a small page everywhere else
    struct PanickingFetcher;

    #[async_trait]
    impl Fetcher for PanickingFetcher {
        async fn fetch(&self, url: &Url) -> FetchOutcome {
            let body = match url.path() {
                "/" => r#"<a href="/boom">b</a><a href="/ok">o</a>"#,
                "/boom" => panic!("fetcher blew up"),
                _ => "<p>ok</p>",
            };
            Ok(FetchResponse {
                final_url: url.clone(),
                status: 200,
                content_type: Some("text/html".to_string()),
                body: body.as_bytes().to_vec(),
            })
        }
    }

    fn settings() -> DownloadSettings {
        DownloadSettings {
            workers: 3,
            max_retries: 0,
            retry_delay: Duration::ZERO,
            second_pass_rounds: 3,
            revalidate: false,
        }
    }

    fn setup(
        pages: &[(&str, &'static str, &'static str)],
        delay: Duration,
        budget: Duration,
        dir: &TempDir,
    ) -> Downloader {
        let fetcher = MapFetcher {
            pages: pages
                .iter()
                .map(|(p, ct, body)| (p.to_string(), (*ct, *body)))
                .collect(),
            delay,
        };
        create_test_downloader(Arc::new(fetcher), settings(), budget, dir)
    }

    fn create_test_downloader(
        fetcher: Arc<dyn Fetcher>,
        settings: DownloadSettings,
        budget: Duration,
        dir: &TempDir,
    ) -> Downloader {
        let frontier = Arc::new(Frontier::new(1000));
        let crawler = Arc::new(Crawler::new(
            HostScope::new("example.com", &[]),
            ParsedRobots::allow_all(),
            "example.com",
            "site-mirror",
            10,
            frontier,
        ));
        let root = Url::parse("https://example.com/").unwrap();
        crawler.admit(&root, 0, Source::Start, Category::Page);

        Downloader::new(
            fetcher,
            crawler,
            Arc::new(Scheduler::new(Duration::ZERO)),
            MirrorStore::new(dir.path()),
            settings,
            Instant::now() + budget,
        )
    }

    #[tokio::test]
    async fn test_workers_fetch_concurrently() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(CountingFetcher {
            links: 40,
            delay: Duration::from_millis(30),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let settings = DownloadSettings {
            workers: 8,
            ..settings()
        };
        let downloader = Arc::new(create_test_downloader(
            fetcher.clone(),
            settings,
            Duration::from_secs(30),
            &dir,
        ));

        let (entries, summary) = downloader.run().await.unwrap();
        assert_eq!(summary.fetched, 41);
        assert_eq!(entries.len(), 41);
        assert!(
            fetcher.peak.load(Ordering::SeqCst) > 1,
            "fetches never overlapped"
        );
    }

    #[tokio::test]
    async fn test_panicking_fetch_settles_as_internal() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(create_test_downloader(
            Arc::new(PanickingFetcher),
            settings(),
            Duration::from_secs(30),
            &dir,
        ));

        let (_, summary) = tokio::time::timeout(Duration::from_secs(10), downloader.run())
            .await
            .expect("run did not finish")
            .unwrap();
        assert_eq!(summary.fetched, 2);
        assert_eq!(summary.failed, 1);

        let frontier = downloader.crawler.frontier();
        assert_eq!(frontier.in_flight(), 0);
        let boom = frontier
            .get(&Url::parse("https://example.com/boom").unwrap())
            .unwrap();
        assert_eq!(boom.status, UrlStatus::Failed);
        assert_eq!(boom.failure_reason, Some(FailureReason::Internal));
    }

    #[tokio::test]
    async fn test_events_record_pass_and_settlement() {
        let dir = TempDir::new().unwrap();
        let downloader = Arc::new(setup(
            &[
                ("/", "text/html", r#"<link rel="stylesheet" href="/site.css"><a href="/gone">g</a>"#),
                ("/site.css", "text/css", "body { background: url(/bg.png) }"),
                ("/bg.png", "image/png", "PNG"),
            ],
            Duration::ZERO,
            Duration::from_secs(30),
            &dir,
        ));
        downloader.run().await.unwrap();

        let events = downloader.events();
        assert_eq!(events.len(), 4);
        let event_for = |path: &str| {
            events
                .iter()
                .find(|e| e.url.path() == path)
                .unwrap()
                .clone()
        };

        assert_eq!(event_for("/").pass, Pass::Primary);
        assert!(matches!(
            event_for("/gone").settlement,
            Settlement::Failed { reason: FailureReason::Http4xx, .. }
        ));
        let background = event_for("/bg.png");
        assert_eq!(background.pass, Pass::Second(1));
        assert_eq!(background.category, Category::Resource);
        assert_eq!(
            background.settlement,
            Settlement::Fetched {
                local_path: "example.com/bg.png".to_string(),
                bytes: 3,
            }
        );
        assert_eq!(Pass::Second(1).to_string(), "second-pass-1");
    }

    #[tokio::test]
    async fn test_follows_links_and_requisites() {
        let dir = TempDir::new().unwrap();
        let downloader = setup(
            &[
                ("/", "text/html", r#"<a href="/a">a</a><img src="/logo.png"><a href="/missing">m</a>"#),
                ("/a", "text/html", "<p>a</p>"),
                ("/logo.png", "image/png", "PNG"),
            ],
            Duration::ZERO,
            Duration::from_secs(30),
            &dir,
        );

        let downloader = Arc::new(downloader);
        let (entries, summary) = downloader.run().await.unwrap();
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.failed, 1);
        assert!(!summary.timed_out);

        let paths: Vec<&str> = entries.iter().map(|e| e.local_path.as_str()).collect();
        assert!(paths.contains(&"example.com/index.html"));
        assert!(paths.contains(&"example.com/a.html"));
        assert!(paths.contains(&"example.com/logo.png"));

        let missing = downloader
            .crawler
            .frontier()
            .get(&Url::parse("https://example.com/missing").unwrap())
            .unwrap();
        assert_eq!(missing.status, UrlStatus::Failed);
        assert_eq!(missing.failure_reason, Some(FailureReason::Http4xx));
    }

    #[tokio::test]
    async fn test_second_pass_fetches_css_references() {
        let dir = TempDir::new().unwrap();
        let downloader = setup(
            &[
                ("/", "text/html", r#"<link rel="stylesheet" href="/css/site.css"><div data-src="/img/lazy.png"></div>"#),
                ("/css/site.css", "text/css", ".logo { background: url(../img/logo.png) }"),
                ("/img/logo.png", "image/png", "PNG"),
                ("/img/lazy.png", "image/png", "PNG"),
            ],
            Duration::ZERO,
            Duration::from_secs(30),
            &dir,
        );

        let downloader = Arc::new(downloader);
        let (entries, summary) = downloader.run().await.unwrap();
        assert!(summary.second_pass_admitted >= 2);
        assert!(entries.iter().any(|e| e.local_path == "example.com/img/logo.png"));
        assert!(entries.iter().any(|e| e.local_path == "example.com/img/lazy.png"));

        let logo = downloader
            .crawler
            .frontier()
            .get(&Url::parse("https://example.com/img/logo.png").unwrap())
            .unwrap();
        assert_eq!(logo.source, Source::SecondPass);
        assert_eq!(logo.status, UrlStatus::Fetched);
    }

    #[tokio::test]
    async fn test_budget_leaves_unclaimed_pending() {
        let dir = TempDir::new().unwrap();
        let downloader = setup(
            &[
                ("/", "text/html", r#"<a href="/1">1</a><a href="/2">2</a><a href="/3">3</a><a href="/4">4</a><a href="/5">5</a>"#),
                ("/1", "text/html", "1"),
                ("/2", "text/html", "2"),
                ("/3", "text/html", "3"),
                ("/4", "text/html", "4"),
                ("/5", "text/html", "5"),
            ],
            Duration::from_millis(150),
            Duration::from_millis(100),
            &dir,
        );

        let downloader = Arc::new(downloader);
        let (_, summary) = downloader.run().await.unwrap();
        assert!(summary.timed_out);

        let frontier = downloader.crawler.frontier();
        assert!(frontier.in_flight() == 0);
        let pending = frontier
            .records()
            .iter()
            .filter(|r| r.status == UrlStatus::Pending)
            .count();
        assert_eq!(pending, 5);
    }

    #[tokio::test]
    async fn test_reuses_previous_entries() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("example.com")).unwrap();
        std::fs::write(
            dir.path().join("example.com").join("index.html"),
            r#"<a href="/a">a</a>"#,
        )
        .unwrap();

        // "/" is not served, so it can only come from disk
        let downloader = setup(
            &[("/a", "text/html", "a")],
            Duration::ZERO,
            Duration::from_secs(30),
            &dir,
        );
        let downloader = Arc::new(downloader.with_previous_entries(vec![MirrorEntry {
            url: Url::parse("https://example.com/").unwrap(),
            local_path: "example.com/index.html".to_string(),
            byte_size: 18,
            content_type: Some("text/html".to_string()),
        }]));

        let (entries, summary) = downloader.run().await.unwrap();
        assert_eq!(summary.reused, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(entries.len(), 2);
    }

    #[tokio::test]
    async fn test_reused_localized_page_keeps_origin_links() {
        let dir = TempDir::new().unwrap();
        let site = dir.path().join("example.com");
        std::fs::create_dir_all(site.join("docs")).unwrap();
        std::fs::write(
            site.join("index.html"),
            r#"<a href="docs/index.html">docs</a><a href="pricing.html">p</a>"#,
        )
        .unwrap();
        std::fs::write(site.join("docs").join("index.html"), "<p>docs</p>").unwrap();

        let downloader = setup(
            &[("/pricing.html", "text/html", "p")],
            Duration::ZERO,
            Duration::from_secs(30),
            &dir,
        );
        let previous = vec![
            MirrorEntry {
                url: Url::parse("https://example.com/").unwrap(),
                local_path: "example.com/index.html".to_string(),
                byte_size: 10,
                content_type: Some("text/html".to_string()),
            },
            MirrorEntry {
                url: Url::parse("https://example.com/docs").unwrap(),
                local_path: "example.com/docs/index.html".to_string(),
                byte_size: 11,
                content_type: Some("text/html".to_string()),
            },
        ];
        let downloader = Arc::new(downloader.with_previous_entries(previous));

        let (_, summary) = downloader.run().await.unwrap();
        let frontier = downloader.crawler.frontier();

        assert_eq!(summary.reused, 2);
        assert!(frontier.contains(&Url::parse("https://example.com/docs").unwrap()));
        assert!(!frontier.contains(&Url::parse("https://example.com/docs/index.html").unwrap()));
        // Unknown local files map back through their host directory
        assert!(frontier.contains(&Url::parse("https://example.com/pricing.html").unwrap()));
    }
}

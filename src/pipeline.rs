//! End-to-end mirror run
//!
//! Wires discovery, the admission gate, the downloader, the ledger, the
//! report and (optionally) the localizer together. All crawl state is
//! created here and passed down explicitly.

use crate::config::{validate, Config};
use crate::crawler::{Crawler, Fetcher, Frontier, HttpFetcher, Scheduler};
use crate::discovery::{discover, Discovery, DiscoveryOptions};
use crate::download::{DownloadSettings, DownloadSummary, Downloader, MirrorStore};
use crate::localize::{localize_mirror, LocalizeSummary};
use crate::output::{
    write_discovery_artifacts, write_fetch_logs, write_report, Report, UNSETTLED_DETAIL,
};
use crate::state::{Category, FailureReason, UrlRecord};
use crate::storage::{open_storage, RunStatus, Storage};
use crate::url::{host_key, normalize_url, HostScope};
use crate::MirrorError;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Per-invocation switches of a mirror run
#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
    /// Ignore what earlier runs stored in the ledger
    pub fresh: bool,
    /// Run the localizer after the download
    pub localize: bool,
    /// Hash of the configuration file, recorded on the run row
    pub config_hash: String,
}

/// What a mirror run produced
#[derive(Debug, Clone)]
pub struct MirrorOutcome {
    pub report: Report,
    pub download: DownloadSummary,
    pub localize: Option<LocalizeSummary>,
    /// Non-fatal discovery problems (unreachable robots.txt, bad sitemaps)
    pub discovery_errors: Vec<String>,
}

/// What a dry run would crawl
#[derive(Debug, Clone)]
pub struct MirrorPlan {
    pub start_url: String,
    /// Records admitted from the seeds, all still pending
    pub records: Vec<UrlRecord>,
    pub sitemaps_read: Vec<String>,
    pub discovery_errors: Vec<String>,
}

impl MirrorPlan {
    pub fn count(&self, category: Category) -> usize {
        self.records.iter().filter(|r| r.category == category).count()
    }
}

/// Runs a mirror with the production HTTP fetcher
pub async fn run_mirror(config: &Config, options: &MirrorOptions) -> Result<MirrorOutcome, MirrorError> {
    validate(config)?;
    let fetcher = HttpFetcher::new(&config.user_agent, config.crawler.request_timeout())?;
    run_mirror_with(config, options, Arc::new(fetcher)).await
}

/// Runs a mirror with the given fetcher
///
/// # Arguments
///
/// * `config` - The run configuration
/// * `options` - Fresh/localize switches and the config hash
/// * `fetcher` - The fetch capability
///
/// # Returns
///
/// * `Ok(MirrorOutcome)` - The run finished (possibly with per-URL failures)
/// * `Err(MirrorError)` - A startup condition failed (invalid configuration,
///   unwritable directory, no seeds) or the ledger could not be written
pub async fn run_mirror_with(
    config: &Config,
    options: &MirrorOptions,
    fetcher: Arc<dyn Fetcher>,
) -> Result<MirrorOutcome, MirrorError> {
    validate(config)?;
    let deadline = Instant::now() + config.crawler.time_budget();

    let start_url = normalize_url(&config.mirror.start_url)?;
    let scope = HostScope::for_start_url(&start_url, &config.mirror.allowed_hosts)?;
    let start_host = host_key(&start_url).unwrap_or_else(|| scope.primary_host().to_string());
    let product_token = config.user_agent.crawler_name.clone();

    ensure_writable(&config.output.output_dir)?;
    ensure_writable(&config.output.work_dir)?;

    let mut storage = open_storage(&config.output.ledger_path())?;
    let previous = if options.fresh {
        tracing::info!("Fresh run: clearing the ledger");
        storage.clear()?;
        Vec::new()
    } else {
        storage.load_entries()?
    };
    let run_id = storage.create_run(&options.config_hash, start_url.as_str())?;
    tracing::info!("Mirror run {} for {}", run_id, start_url);

    let discovery = discover(
        fetcher.as_ref(),
        &start_url,
        &scope,
        &discovery_options(config),
    )
    .await;

    if discovery.seeds.is_empty() {
        storage.finish_run(run_id, RunStatus::Failed)?;
        return Err(MirrorError::NoSeeds {
            start_url: start_url.to_string(),
        });
    }

    let (frontier, crawler) = seeded_crawler(config, &scope, &start_host, &discovery);

    let scheduler = Arc::new(
        Scheduler::new(config.crawler.politeness_delay()).with_robots(
            &start_host,
            &discovery.robots,
            &product_token,
        ),
    );
    let downloader = Arc::new(
        Downloader::new(
            fetcher,
            crawler,
            scheduler,
            MirrorStore::new(&config.output.output_dir),
            DownloadSettings {
                workers: config.crawler.workers,
                max_retries: config.crawler.max_retries,
                retry_delay: config.crawler.retry_delay(),
                second_pass_rounds: config.crawler.second_pass_rounds,
                revalidate: config.crawler.revalidate,
            },
            deadline,
        )
        .with_previous_entries(previous),
    );
    let (entries, download) = downloader.run().await?;

    let unsettled = frontier.settle_remaining(FailureReason::BudgetExhausted, UNSETTLED_DETAIL);
    if unsettled > 0 {
        tracing::warn!("Time budget expired with {} URL(s) never fetched", unsettled);
    }

    let records = frontier.records();
    write_fetch_logs(
        &config.output.logs_dir(),
        &downloader.events(),
        &records,
        Utc::now(),
    )?;
    storage.save_records(run_id, &records)?;
    storage.save_entries(run_id, &entries)?;
    let status = if download.timed_out {
        RunStatus::BudgetExhausted
    } else {
        RunStatus::Completed
    };
    storage.finish_run(run_id, status)?;

    write_discovery_artifacts(
        &config.output.discovery_dir(),
        &records,
        &discovery.sitemaps_read,
    )?;

    let report = Report::from_records(start_url.as_str(), &records, &entries, Utc::now());
    write_report(&config.output.report_path(), &report)?;
    tracing::info!("Mirror finished: {}", report.summary_line());

    let localize = if options.localize {
        let primary = config
            .mirror
            .primary_host
            .clone()
            .unwrap_or_else(|| start_host.clone());
        let localize_scope = HostScope::new(primary, &config.mirror.allowed_hosts);
        Some(localize_mirror(&config.output.output_dir, &localize_scope)?)
    } else {
        None
    };

    Ok(MirrorOutcome {
        report,
        download,
        localize,
        discovery_errors: discovery.errors,
    })
}

/// Runs discovery only, with the production HTTP fetcher
pub async fn plan_mirror(config: &Config) -> Result<MirrorPlan, MirrorError> {
    validate(config)?;
    let fetcher = HttpFetcher::new(&config.user_agent, config.crawler.request_timeout())?;
    plan_mirror_with(config, Arc::new(fetcher)).await
}

/// Runs discovery and seed admission without downloading anything
///
/// Only robots.txt and sitemap documents are fetched. The discovery
/// artifacts are written to the work directory; the ledger and the mirror
/// tree are left alone.
///
/// # Returns
///
/// * `Ok(MirrorPlan)` - The admitted seeds and what discovery read
/// * `Err(MirrorError)` - Invalid configuration, unwritable work directory
///   or no seeds
pub async fn plan_mirror_with(
    config: &Config,
    fetcher: Arc<dyn Fetcher>,
) -> Result<MirrorPlan, MirrorError> {
    validate(config)?;
    let start_url = normalize_url(&config.mirror.start_url)?;
    let scope = HostScope::for_start_url(&start_url, &config.mirror.allowed_hosts)?;
    let start_host = host_key(&start_url).unwrap_or_else(|| scope.primary_host().to_string());
    ensure_writable(&config.output.work_dir)?;

    let discovery = discover(
        fetcher.as_ref(),
        &start_url,
        &scope,
        &discovery_options(config),
    )
    .await;
    if discovery.seeds.is_empty() {
        return Err(MirrorError::NoSeeds {
            start_url: start_url.to_string(),
        });
    }

    let (frontier, _) = seeded_crawler(config, &scope, &start_host, &discovery);
    let records = frontier.records();
    write_discovery_artifacts(
        &config.output.discovery_dir(),
        &records,
        &discovery.sitemaps_read,
    )?;

    Ok(MirrorPlan {
        start_url: start_url.to_string(),
        records,
        sitemaps_read: discovery.sitemaps_read,
        discovery_errors: discovery.errors,
    })
}

fn discovery_options(config: &Config) -> DiscoveryOptions {
    DiscoveryOptions {
        product_token: config.user_agent.crawler_name.clone(),
        max_sitemap_files: config.crawler.max_sitemap_files,
        politeness_delay: config.crawler.politeness_delay(),
    }
}

/// Builds the frontier and admission gate and admits the discovery seeds
fn seeded_crawler(
    config: &Config,
    scope: &HostScope,
    start_host: &str,
    discovery: &Discovery,
) -> (Arc<Frontier>, Arc<Crawler>) {
    let frontier = Arc::new(Frontier::new(config.crawler.max_urls));
    let crawler = Arc::new(Crawler::new(
        scope.clone(),
        discovery.robots.clone(),
        start_host.to_string(),
        config.user_agent.crawler_name.clone(),
        config.crawler.max_depth,
        Arc::clone(&frontier),
    ));
    for seed in &discovery.seeds {
        crawler.admit(&seed.url, 0, seed.source, seed.category);
    }
    tracing::info!(
        "{} seed(s) admitted from {} sitemap(s)",
        frontier.len(),
        discovery.sitemaps_read.len()
    );
    (frontier, crawler)
}

/// Creates a directory and proves it accepts writes
fn ensure_writable(dir: &Path) -> Result<(), MirrorError> {
    let unwritable = |source| MirrorError::Unwritable {
        path: dir.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(unwritable)?;
    let marker = dir.join(".site-mirror-write-test");
    std::fs::write(&marker, b"").map_err(unwritable)?;
    std::fs::remove_file(&marker).map_err(unwritable)?;
    Ok(())
}

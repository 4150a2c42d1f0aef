use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Site-Mirror
///
/// Every section has defaults so a run can be driven entirely from the
/// command line; a TOML file only overrides what it names.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mirror: MirrorConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// What to mirror
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MirrorConfig {
    /// Entry URL of the site
    #[serde(rename = "start-url", default)]
    pub start_url: String,

    /// Host patterns treated as internal (e.g., "example.com" or "*.example.com").
    /// The start URL's host is always internal.
    #[serde(rename = "allowed-hosts", default)]
    pub allowed_hosts: Vec<String>,

    /// Host whose directory the mirror root redirects to; defaults to the start URL's host
    #[serde(rename = "primary-host", default)]
    pub primary_host: Option<String>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum link depth from the seed set
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Maximum number of URL records a run may discover
    #[serde(rename = "max-urls", default = "default_max_urls")]
    pub max_urls: usize,

    /// Wall-clock budget for the whole run (seconds)
    #[serde(rename = "time-budget-secs", default = "default_time_budget")]
    pub time_budget_secs: u64,

    /// Number of concurrent fetch workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "politeness-delay-ms", default = "default_politeness_delay")]
    pub politeness_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Extra attempts for transient failures (network, timeout, 5xx)
    #[serde(rename = "max-retries", default)]
    pub max_retries: u32,

    /// Delay before a retry (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Maximum number of sitemap documents read during discovery
    #[serde(rename = "max-sitemap-files", default = "default_max_sitemap_files")]
    pub max_sitemap_files: usize,

    /// Maximum number of gap-closing passes after the primary pass
    #[serde(rename = "second-pass-rounds", default = "default_second_pass_rounds")]
    pub second_pass_rounds: u32,

    /// Re-fetch URLs the ledger already records as fetched
    #[serde(default)]
    pub revalidate: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler, also the robots.txt product token
    #[serde(rename = "crawler-name", default = "default_crawler_name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version", default = "default_crawler_version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url", default)]
    pub contact_url: Option<String>,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email", default)]
    pub contact_email: Option<String>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory the mirror tree is written to (the mirror root)
    #[serde(rename = "output-dir", default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory for the ledger, discovery artifacts and the report
    #[serde(rename = "work-dir", default = "default_work_dir")]
    pub work_dir: PathBuf,
}

fn default_max_depth() -> u32 {
    10
}

fn default_max_urls() -> usize {
    5000
}

fn default_time_budget() -> u64 {
    3600
}

fn default_workers() -> u32 {
    8
}

fn default_politeness_delay() -> u64 {
    150
}

fn default_request_timeout() -> u64 {
    30
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_max_sitemap_files() -> usize {
    50
}

fn default_second_pass_rounds() -> u32 {
    3
}

fn default_crawler_name() -> String {
    "site-mirror".to_string()
}

fn default_crawler_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("mirror")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("work/mirror")
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_urls: default_max_urls(),
            time_budget_secs: default_time_budget(),
            workers: default_workers(),
            politeness_delay_ms: default_politeness_delay(),
            request_timeout_secs: default_request_timeout(),
            max_retries: 0,
            retry_delay_ms: default_retry_delay(),
            max_sitemap_files: default_max_sitemap_files(),
            second_pass_rounds: default_second_pass_rounds(),
            revalidate: false,
        }
    }
}

impl CrawlerConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.politeness_delay_ms)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.time_budget_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: default_crawler_name(),
            crawler_version: default_crawler_version(),
            contact_url: None,
            contact_email: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        let contact: Vec<String> = [
            self.contact_url.as_ref().map(|u| format!("+{}", u)),
            self.contact_email.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        if contact.is_empty() {
            format!("{}/{}", self.crawler_name, self.crawler_version)
        } else {
            format!(
                "{}/{} ({})",
                self.crawler_name,
                self.crawler_version,
                contact.join("; ")
            )
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            work_dir: default_work_dir(),
        }
    }
}

impl OutputConfig {
    pub fn ledger_path(&self) -> PathBuf {
        self.work_dir.join("ledger.db")
    }

    pub fn discovery_dir(&self) -> PathBuf {
        self.work_dir.join("discovery")
    }

    pub fn report_path(&self) -> PathBuf {
        self.work_dir.join("mirror_report.json")
    }

    /// Directory of `pages.log` and `resources.log`
    pub fn logs_dir(&self) -> PathBuf {
        self.work_dir.join("logs")
    }
}

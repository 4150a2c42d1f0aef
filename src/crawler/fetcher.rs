//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests of a mirror run:
//! - The `Fetcher` capability the orchestration code is written against
//! - Building the reqwest client with the configured user agent
//! - Classifying responses and errors into failure reason codes
//! - Retry of transient failures

use crate::config::UserAgentConfig;
use crate::state::FailureReason;
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client};
use std::time::Duration;
use url::Url;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// A successful (2xx) response
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value
    pub content_type: Option<String>,

    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Returns true if the response declares an HTML document
    pub fn is_html(&self) -> bool {
        self.content_type.as_deref().is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/html") || ct.starts_with("application/xhtml+xml")
        })
    }

    /// Returns true if the response declares a stylesheet
    pub fn is_css(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/css"))
    }
}

/// A classified fetch failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub reason: FailureReason,
    pub detail: String,
}

impl FetchFailure {
    pub fn new(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

/// Result of a fetch operation
pub type FetchOutcome = Result<FetchResponse, FetchFailure>;

/// Capability to retrieve one URL
///
/// Implementations must classify every outcome; they never panic or return
/// a transport error to the caller.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> FetchOutcome;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Example
///
/// ```no_run
/// use site_mirror::config::UserAgentConfig;
/// use site_mirror::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client(&UserAgentConfig::default(), Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Production fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &UserAgentConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config, timeout)?,
        })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetches a URL and classifies the outcome
    ///
    /// | Condition | Outcome |
    /// |-----------|---------|
    /// | 2xx | `FetchResponse` |
    /// | 4xx | `http_4xx` |
    /// | 5xx and other statuses | `http_5xx` |
    /// | Timeout (request or body) | `timeout` |
    /// | Connect, TLS, DNS, redirect loop, body error | `network` |
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(FetchFailure::new(
                FailureReason::from_status(status.as_u16()),
                format!("HTTP {}", status.as_u16()),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await.map_err(classify_error)?;

        Ok(FetchResponse {
            final_url,
            status: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Maps a reqwest error to a failure reason
fn classify_error(e: reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::new(FailureReason::Timeout, "Request timeout")
    } else if e.is_connect() {
        FetchFailure::new(FailureReason::Network, format!("Connection failed: {}", e))
    } else if e.is_redirect() {
        FetchFailure::new(FailureReason::Network, format!("Redirect error: {}", e))
    } else {
        FetchFailure::new(FailureReason::Network, e.to_string())
    }
}

/// Fetches a URL, re-attempting transient failures
///
/// # Arguments
///
/// * `fetcher` - The fetch capability
/// * `url` - The URL to fetch
/// * `max_retries` - Extra attempts after the first one (0 = no retry)
/// * `retry_delay` - Pause before each retry
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    url: &Url,
    max_retries: u32,
    retry_delay: Duration,
) -> FetchOutcome {
    let mut attempt = 0;
    loop {
        match fetcher.fetch(url).await {
            Err(failure) if failure.reason.is_transient() && attempt < max_retries => {
                attempt += 1;
                tracing::debug!(
                    "Retrying {} after {} (attempt {}/{})",
                    url,
                    failure.reason,
                    attempt,
                    max_retries
                );
                tokio::time::sleep(retry_delay).await;
            }
            outcome => return outcome,
        }
    }
}

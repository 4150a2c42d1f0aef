//! Shared fixtures for the integration tests

use async_trait::async_trait;
use site_mirror::config::Config;
use site_mirror::crawler::{FetchFailure, FetchOutcome, FetchResponse, Fetcher};
use site_mirror::FailureReason;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

/// An origin served from memory, keyed by path
#[derive(Default)]
pub struct MapFetcher {
    routes: HashMap<String, (String, Vec<u8>)>,
    slow: Option<(String, Duration)>,
    requests: Mutex<Vec<String>>,
}

impl MapFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, path: &str, content_type: &str, body: &str) -> Self {
        self.routes.insert(
            path.to_string(),
            (content_type.to_string(), body.as_bytes().to_vec()),
        );
        self
    }

    /// Delays every request whose path starts with `prefix`
    pub fn slow(mut self, prefix: &str, delay: Duration) -> Self {
        self.slow = Some((prefix.to_string(), delay));
        self
    }

    /// Paths requested so far, in order
    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for MapFetcher {
    async fn fetch(&self, url: &Url) -> FetchOutcome {
        self.requests.lock().unwrap().push(url.path().to_string());

        if let Some((prefix, delay)) = &self.slow {
            if url.path().starts_with(prefix.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }

        match self.routes.get(url.path()) {
            Some((content_type, body)) => Ok(FetchResponse {
                final_url: url.clone(),
                status: 200,
                content_type: Some(content_type.clone()),
                body: body.clone(),
            }),
            None => Err(FetchFailure::new(FailureReason::Http4xx, "HTTP 404")),
        }
    }
}

/// Creates a fast test configuration rooted in `dir`
pub fn create_test_config(start_url: &str, dir: &Path) -> Config {
    let mut config = Config::default();
    config.mirror.start_url = start_url.to_string();
    config.crawler.workers = 4;
    config.crawler.politeness_delay_ms = 0;
    config.crawler.time_budget_secs = 30;
    config.crawler.request_timeout_secs = 5;
    config.user_agent.crawler_name = "TestBot".to_string();
    config.output.output_dir = dir.join("mirror");
    config.output.work_dir = dir.join("work");
    config
}

/// The sample site: robots excludes /private/, the sitemap lists /a and /b
pub fn sample_site() -> MapFetcher {
    MapFetcher::new()
        .route(
            "/robots.txt",
            "text/plain",
            "User-agent: *\nDisallow: /private/\nSitemap: https://example.com/sitemap.xml\n",
        )
        .route(
            "/sitemap.xml",
            "application/xml",
            r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/a</loc></url>
  <url><loc>https://example.com/b</loc></url>
</urlset>"#,
        )
        .route(
            "/",
            "text/html; charset=utf-8",
            r#"<html><head><title>Home</title><link rel="stylesheet" href="/site.css"></head>
<body><a href="/a">A</a></body></html>"#,
        )
        .route(
            "/a",
            "text/html; charset=utf-8",
            r#"<html><body><a href="/c">C</a><a href="/private/x">secret</a></body></html>"#,
        )
        .route("/b", "text/html; charset=utf-8", "<html><body>B</body></html>")
        .route("/c", "text/html; charset=utf-8", r#"<html><body><a href="/">home</a></body></html>"#)
        .route(
            "/site.css",
            "text/css",
            "body { background: url('/img/logo.png') no-repeat; }",
        )
        .route("/img/logo.png", "image/png", "PNG")
}

//! End-to-end mirror runs

use crate::common::{create_test_config, sample_site, MapFetcher};
use site_mirror::output::report_from_storage;
use site_mirror::pipeline::{plan_mirror_with, run_mirror, run_mirror_with, MirrorOptions};
use site_mirror::storage::{open_storage, RunStatus, Storage};
use site_mirror::{Category, FailureReason, MirrorError, UrlStatus};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pages_with_status(records: &[site_mirror::UrlRecord], status: UrlStatus) -> BTreeSet<String> {
    records
        .iter()
        .filter(|r| r.category == Category::Page && r.status == status)
        .map(|r| r.url.path().to_string())
        .collect()
}

#[tokio::test]
async fn test_robots_and_sitemap_shape_the_crawl() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());
    let fetcher = Arc::new(sample_site());

    let outcome = run_mirror_with(&config, &MirrorOptions::default(), fetcher.clone())
        .await
        .unwrap();

    let storage = open_storage(&config.output.ledger_path()).unwrap();
    let records = storage.load_records().unwrap();

    let fetched = pages_with_status(&records, UrlStatus::Fetched);
    let expected: BTreeSet<String> = ["/", "/a", "/b", "/c"].iter().map(|s| s.to_string()).collect();
    assert_eq!(fetched, expected);

    assert!(records.iter().all(|r| !r.url.path().starts_with("/private")));
    assert!(!fetcher.requested().iter().any(|p| p.starts_with("/private")));

    assert_eq!(outcome.report.pages.fetched, 4);
    assert_eq!(outcome.report.fetched_failed, 0);
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}

#[tokio::test]
async fn test_css_url_reference_is_mirrored() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());

    run_mirror_with(&config, &MirrorOptions::default(), Arc::new(sample_site()))
        .await
        .unwrap();

    let storage = open_storage(&config.output.ledger_path()).unwrap();
    let entries = storage.load_entries().unwrap();
    let logo = entries
        .iter()
        .find(|e| e.url.as_str() == "https://example.com/img/logo.png")
        .expect("logo referenced from CSS must be mirrored");

    assert_eq!(logo.local_path, "example.com/img/logo.png");
    assert!(config.output.output_dir.join("example.com/img/logo.png").is_file());
    assert!(config.output.output_dir.join("example.com/a.html").is_file());
    assert!(config.output.output_dir.join("example.com/index.html").is_file());
}

#[tokio::test]
async fn test_report_balances_when_budget_expires() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config("https://example.com/", dir.path());
    config.crawler.time_budget_secs = 1;
    config.crawler.workers = 1;

    let mut links = String::new();
    let mut fetcher = MapFetcher::new();
    for i in 0..20 {
        links.push_str(&format!(r#"<a href="/page-{}">p</a>"#, i));
        fetcher = fetcher.route(&format!("/page-{}", i), "text/html", "<p>page</p>");
    }
    let fetcher = fetcher
        .route("/", "text/html", &links)
        .slow("/page-", Duration::from_millis(200));

    let outcome = run_mirror_with(&config, &MirrorOptions::default(), Arc::new(fetcher))
        .await
        .unwrap();
    let report = outcome.report;

    assert!(outcome.download.timed_out);
    assert_eq!(report.discovered, 21);
    assert_eq!(report.discovered, report.fetched_success + report.fetched_failed);
    assert!(report.failure_reasons[&FailureReason::BudgetExhausted] > 0);

    let storage = open_storage(&config.output.ledger_path()).unwrap();
    assert!(storage
        .load_records()
        .unwrap()
        .iter()
        .all(|r| r.status != UrlStatus::Pending));
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::BudgetExhausted
    );
}

#[tokio::test]
async fn test_artifacts_and_report_written() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());

    let outcome = run_mirror_with(&config, &MirrorOptions::default(), Arc::new(sample_site()))
        .await
        .unwrap();

    let discovery = config.output.discovery_dir();
    let pages = std::fs::read_to_string(discovery.join("pages.txt")).unwrap();
    assert_eq!(
        pages,
        "https://example.com/\nhttps://example.com/a\nhttps://example.com/b\nhttps://example.com/c\n"
    );
    let sitemaps = std::fs::read_to_string(discovery.join("sitemaps.txt")).unwrap();
    assert_eq!(sitemaps, "https://example.com/sitemap.xml\n");
    let domains = std::fs::read_to_string(discovery.join("domains.txt")).unwrap();
    assert_eq!(domains, "example.com\n");

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(config.output.report_path()).unwrap())
            .unwrap();
    assert_eq!(json["start_url"], "https://example.com/");
    assert_eq!(json["discovered"], outcome.report.discovered);

    let storage = open_storage(&config.output.ledger_path()).unwrap();
    let regenerated = report_from_storage(&storage).unwrap();
    assert_eq!(regenerated.discovered, outcome.report.discovered);
    assert_eq!(regenerated.pages, outcome.report.pages);
    assert_eq!(regenerated.resources, outcome.report.resources);
    assert_eq!(regenerated.mirror, outcome.report.mirror);
}

#[tokio::test]
async fn test_rerun_reuses_mirror_without_duplicates() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());

    let first = run_mirror_with(&config, &MirrorOptions::default(), Arc::new(sample_site()))
        .await
        .unwrap();

    let fetcher = Arc::new(sample_site());
    let second = run_mirror_with(&config, &MirrorOptions::default(), fetcher.clone())
        .await
        .unwrap();

    assert_eq!(second.download.reused, first.report.fetched_success);
    assert_eq!(second.download.fetched, 0);
    assert_eq!(second.report.mirror, first.report.mirror);
    assert!(!fetcher.requested().contains(&"/a".to_string()));

    let storage = open_storage(&config.output.ledger_path()).unwrap();
    assert_eq!(storage.load_entries().unwrap().len(), first.report.mirror.files);
}

#[tokio::test]
async fn test_rerun_after_localize_keeps_record_set() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());
    let options = MirrorOptions {
        localize: true,
        ..MirrorOptions::default()
    };

    let first = run_mirror_with(&config, &options, Arc::new(sample_site()))
        .await
        .unwrap();
    assert!(first.localize.unwrap().links_rewritten > 0);

    let second = run_mirror_with(&config, &options, Arc::new(sample_site()))
        .await
        .unwrap();

    assert_eq!(second.report.discovered, first.report.discovered);
    assert_eq!(second.report.fetched_failed, first.report.fetched_failed);
    assert_eq!(second.localize.unwrap().files_rewritten, 0);
}

#[tokio::test]
async fn test_fresh_run_fetches_again() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());

    run_mirror_with(&config, &MirrorOptions::default(), Arc::new(sample_site()))
        .await
        .unwrap();
    let fresh = MirrorOptions {
        fresh: true,
        ..MirrorOptions::default()
    };
    let outcome = run_mirror_with(&config, &fresh, Arc::new(sample_site()))
        .await
        .unwrap();

    assert_eq!(outcome.download.reused, 0);
    assert!(outcome.download.fetched > 0);
}

#[tokio::test]
async fn test_disallowed_start_means_no_seeds() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());
    let fetcher = MapFetcher::new()
        .route("/robots.txt", "text/plain", "User-agent: *\nDisallow: /\n")
        .route("/", "text/html", "<p>home</p>");

    let result = run_mirror_with(&config, &MirrorOptions::default(), Arc::new(fetcher)).await;

    assert!(matches!(result, Err(MirrorError::NoSeeds { .. })));
}

#[tokio::test]
async fn test_unwritable_output_is_fatal() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();

    let mut config = create_test_config("https://example.com/", dir.path());
    config.output.output_dir = blocker.join("mirror");

    let result = run_mirror_with(&config, &MirrorOptions::default(), Arc::new(sample_site())).await;

    assert!(matches!(result, Err(MirrorError::Unwritable { .. })));
}

#[tokio::test]
async fn test_invalid_start_url_is_fatal() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("ftp://example.com/", dir.path());

    let result = run_mirror_with(&config, &MirrorOptions::default(), Arc::new(sample_site())).await;

    assert!(matches!(result, Err(MirrorError::Config(_))));
}

#[tokio::test]
async fn test_mirror_over_http() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(r#"<a href="/about">About</a><a href="/gone">Gone</a>"#),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string("<h1>About</h1>"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = create_test_config(&format!("{}/", mock_server.uri()), dir.path());

    let outcome = run_mirror(&config, &MirrorOptions::default()).await.unwrap();

    assert_eq!(outcome.report.pages.fetched, 2);
    assert_eq!(outcome.report.failure_reasons[&FailureReason::Http5xx], 1);
    assert_eq!(outcome.report.failures[0].failure_reason, FailureReason::Http5xx);

    let host = url::Url::parse(&mock_server.uri()).unwrap();
    let host_dir = format!("{}:{}", host.host_str().unwrap(), host.port().unwrap());
    assert!(config
        .output
        .output_dir
        .join(&host_dir)
        .join("about.html")
        .is_file());
}

#[tokio::test]
async fn test_fetch_logs_record_every_settlement() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());
    let fetcher = sample_site().route(
        "/c",
        "text/html; charset=utf-8",
        r#"<html><body><a href="/gone">gone</a></body></html>"#,
    );

    run_mirror_with(&config, &MirrorOptions::default(), Arc::new(fetcher))
        .await
        .unwrap();

    let logs = config.output.logs_dir();
    let pages = std::fs::read_to_string(logs.join("pages.log")).unwrap();
    let resources = std::fs::read_to_string(logs.join("resources.log")).unwrap();

    assert_eq!(pages.lines().count(), 5);
    assert!(pages.contains("primary OK https://example.com/a -> example.com/a.html"));
    assert!(pages.contains("ERROR http_4xx https://example.com/gone: HTTP 404"));
    assert!(resources.contains("primary OK https://example.com/site.css -> example.com/site.css"));
    assert!(resources.contains("second-pass-1 OK https://example.com/img/logo.png"));
}

#[tokio::test]
async fn test_dry_run_discovers_without_downloading() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());
    let fetcher = Arc::new(sample_site());

    let plan = plan_mirror_with(&config, fetcher.clone()).await.unwrap();

    let planned: BTreeSet<String> = plan.records.iter().map(|r| r.url.path().to_string()).collect();
    let expected: BTreeSet<String> = ["/", "/a", "/b"].iter().map(|s| s.to_string()).collect();
    assert_eq!(planned, expected);
    assert!(plan.records.iter().all(|r| r.status == UrlStatus::Pending));
    assert_eq!(plan.count(Category::Page), 3);
    assert_eq!(plan.sitemaps_read, vec!["https://example.com/sitemap.xml".to_string()]);

    let discovery_only = ["/robots.txt", "/sitemap.xml", "/sitemap_index.xml", "/sitemaps.xml"];
    assert!(fetcher
        .requested()
        .iter()
        .all(|p| discovery_only.contains(&p.as_str())));

    assert!(!config.output.output_dir.exists());
    assert!(!config.output.ledger_path().exists());
    let pages_txt = std::fs::read_to_string(config.output.discovery_dir().join("pages.txt")).unwrap();
    assert_eq!(pages_txt.lines().count(), 3);
}

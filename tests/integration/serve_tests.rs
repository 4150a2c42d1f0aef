//! Serving a mirror tree over HTTP

use reqwest::redirect::Policy;
use reqwest::StatusCode;
use site_mirror::server::router;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn start_server(root: &std::path::Path, prefix: &str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(root.to_path_buf(), prefix);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap()
}

fn create_test_mirror() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("example.com/a/b")).unwrap();
    std::fs::create_dir_all(root.join("example.com/docs")).unwrap();
    std::fs::write(root.join("index.html"), "<p>root</p>").unwrap();
    std::fs::write(root.join("example.com/index.html"), "<p>home</p>").unwrap();
    std::fs::write(root.join("example.com/a/b.html"), "<p>b</p>").unwrap();
    std::fs::write(root.join("example.com/a/b/index.html"), "<p>b index</p>").unwrap();
    std::fs::write(root.join("example.com/site.css"), "body{}").unwrap();
    std::fs::write(root.join("example.com/docs/index.html"), "<p>docs</p>").unwrap();
    dir
}

#[tokio::test]
async fn test_get_resolves_candidates() {
    let mirror = create_test_mirror();
    let addr = start_server(mirror.path(), "/site").await;
    let client = client();

    let response = client
        .get(format!("http://{}/site/example.com/a/b", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    assert_eq!(response.headers()["cache-control"], "public, max-age=0");
    assert_eq!(response.text().await.unwrap(), "<p>b</p>");

    let index = client
        .get(format!("http://{}/site/example.com/a/b/", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(index.text().await.unwrap(), "<p>b index</p>");

    let root = client
        .get(format!("http://{}/site/", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(root.text().await.unwrap(), "<p>root</p>");

    let css = client
        .get(format!("http://{}/site/example.com/site.css", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(css.headers()["content-type"], "text/css; charset=utf-8");
}

#[tokio::test]
async fn test_head_has_headers_and_no_body() {
    let mirror = create_test_mirror();
    let addr = start_server(mirror.path(), "/site").await;

    let response = client()
        .head(format!("http://{}/site/example.com/a/b", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["cache-control"], "public, max-age=0");
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=utf-8"
    );
    assert_eq!(response.headers()["content-length"], "8");
    assert!(response.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unresolved_is_plain_404() {
    let mirror = create_test_mirror();
    let addr = start_server(mirror.path(), "/site").await;
    let client = client();

    for path in [
        "/site/example.com/missing",
        "/site/%2e%2e/etc/passwd",
        "/site/example.com/%252e%252e/%252e%252e/secret",
        "/site/..%5c..%5csecret",
        "/other/example.com/a/b",
    ] {
        let response = client
            .get(format!("http://{}{}", addr, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", path);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        assert_eq!(response.text().await.unwrap(), "Not Found");
    }
}

#[tokio::test]
async fn test_bare_prefix_redirects() {
    let mirror = create_test_mirror();
    let addr = start_server(mirror.path(), "/site").await;

    let response = client()
        .get(format!("http://{}/site", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "/site/");
}

#[tokio::test]
async fn test_directory_without_slash_redirects() {
    let mirror = create_test_mirror();
    let addr = start_server(mirror.path(), "/site").await;
    let client = client();

    let response = client
        .get(format!("http://{}/site/example.com/docs?tab=2", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers()["location"], "/site/example.com/docs/?tab=2");

    let host = client
        .get(format!("http://{}/site/example.com", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(host.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(host.headers()["location"], "/site/example.com/");

    let docs = client
        .get(format!("http://{}/site/example.com/docs/", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(docs.status(), StatusCode::OK);
    assert_eq!(docs.headers()["content-length"], "11");
    assert_eq!(docs.text().await.unwrap(), "<p>docs</p>");
}

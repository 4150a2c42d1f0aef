//! Localization of a mirrored site

use crate::common::{create_test_config, sample_site};
use site_mirror::localize::{list_files, localize_mirror};
use site_mirror::pipeline::{run_mirror_with, MirrorOptions};
use site_mirror::HostScope;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    list_files(root)
        .unwrap()
        .into_iter()
        .map(|p| {
            let bytes = std::fs::read(root.join(&p)).unwrap();
            (p, bytes)
        })
        .collect()
}

#[tokio::test]
async fn test_localized_links_point_at_mirrored_files() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());
    let options = MirrorOptions {
        localize: true,
        ..MirrorOptions::default()
    };

    let outcome = run_mirror_with(&config, &options, Arc::new(sample_site()))
        .await
        .unwrap();
    let summary = outcome.localize.unwrap();
    let root = &config.output.output_dir;

    let index = std::fs::read_to_string(root.join("example.com/index.html")).unwrap();
    assert!(index.contains(r#"href="site.css""#));
    assert!(index.contains(r#"href="a.html""#));

    let a = std::fs::read_to_string(root.join("example.com/a.html")).unwrap();
    assert!(a.contains(r#"href="c.html""#));
    assert!(a.contains(r#"href="https://example.com/private/x""#));

    // Stylesheets are left alone
    let css = std::fs::read_to_string(root.join("example.com/site.css")).unwrap();
    assert!(css.contains("url('/img/logo.png')"));

    assert!(root.join("index.html").is_file());
    assert_eq!(summary.links_degraded, 1);
    assert_eq!(summary.files_skipped, 0);
}

#[tokio::test]
async fn test_localize_twice_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config("https://example.com/", dir.path());
    run_mirror_with(&config, &MirrorOptions::default(), Arc::new(sample_site()))
        .await
        .unwrap();

    let root = &config.output.output_dir;
    let scope = HostScope::new("example.com", &[]);

    localize_mirror(root, &scope).unwrap();
    let once = snapshot(root);
    let second = localize_mirror(root, &scope).unwrap();
    let twice = snapshot(root);

    assert_eq!(once, twice);
    assert_eq!(second.files_rewritten, 0);
}

#[test]
fn test_allowlisted_host_links_are_localized() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    std::fs::create_dir_all(root.join("www.example.com")).unwrap();
    std::fs::create_dir_all(root.join("cdn.example.com/img")).unwrap();
    std::fs::write(
        root.join("www.example.com/index.html"),
        r#"<img src="https://cdn.example.com/img/hero.webp"><a href="https://other.org/">x</a>"#,
    )
    .unwrap();
    std::fs::write(root.join("cdn.example.com/img/hero.webp"), b"RIFF").unwrap();

    let scope = HostScope::new("www.example.com", &["*.example.com".to_string()]);
    let summary = localize_mirror(root, &scope).unwrap();

    let index = std::fs::read_to_string(root.join("www.example.com/index.html")).unwrap();
    assert_eq!(
        index,
        r#"<img src="../cdn.example.com/img/hero.webp"><a href="https://other.org/">x</a>"#
    );
    assert_eq!(summary.links_rewritten, 1);

    let redirect = std::fs::read_to_string(root.join("index.html")).unwrap();
    assert!(redirect.contains("www.example.com/index.html"));
}

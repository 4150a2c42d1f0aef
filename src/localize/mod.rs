//! Localizer: rewrites internal links in mirrored HTML
//!
//! Runs after all fetches settle. Each HTML file is rewritten in place,
//! independently of the others, so files are processed in parallel.
//! Targets are resolved with the same candidate rule the server uses.
//!
//! After rewriting, redirect stubs are added for routes a browser may ask
//! for that have no file of their own (`/docs/intro/` when only
//! `docs/intro.html` exists, or routes requested at the mirror root), and
//! well-known asset directories of the primary host are linked at the root.
//! Nothing that already exists is overwritten.

mod rewrite;

use crate::url::HostScope;
use crate::MirrorError;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rewrite::{relative_path, DocumentRewriter};

/// Entries of the primary host directory exposed at the mirror root
const ROOT_ASSETS: &[&str] = &[
    "_next",
    "static",
    "assets",
    "images",
    "favicon.ico",
    "robots.txt",
];

/// Outcome of a localization pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LocalizeSummary {
    pub files_scanned: usize,
    pub files_rewritten: usize,
    pub links_rewritten: usize,
    pub links_degraded: usize,
    /// Files left unmodified because they could not be read, decoded or written
    pub files_skipped: usize,
    /// Redirect stubs written for routes without a file of their own
    pub aliases_written: usize,
    /// Primary host assets linked (or copied) to the mirror root
    pub root_assets_linked: usize,
}

enum FileOutcome {
    Unchanged { rewritten: usize, degraded: usize },
    Rewritten { rewritten: usize, degraded: usize },
    Skipped,
}

/// Rewrites every HTML file under the mirror root
///
/// # Arguments
///
/// * `root` - The mirror root (contains one directory per host)
/// * `scope` - Hosts whose links count as internal
///
/// # Returns
///
/// Counters for the pass. Per-file problems are logged and counted as
/// skipped; only failing to list the mirror root is an error.
pub fn localize_mirror(root: &Path, scope: &HostScope) -> Result<LocalizeSummary, MirrorError> {
    let files = list_files(root)?;
    let known: HashSet<String> = files.iter().cloned().collect();

    let html_files: Vec<&String> = files
        .iter()
        .filter(|p| p.contains('/') && is_html_path(p))
        .collect();

    tracing::info!(
        "Localizing {} HTML files under {}",
        html_files.len(),
        root.display()
    );

    let outcomes: Vec<FileOutcome> = html_files
        .par_iter()
        .map(|local_path| localize_file(root, local_path, scope, &known))
        .collect();

    let mut summary = LocalizeSummary {
        files_scanned: html_files.len(),
        ..LocalizeSummary::default()
    };
    for outcome in outcomes {
        match outcome {
            FileOutcome::Unchanged { rewritten, degraded } => {
                summary.links_rewritten += rewritten;
                summary.links_degraded += degraded;
            }
            FileOutcome::Rewritten { rewritten, degraded } => {
                summary.files_rewritten += 1;
                summary.links_rewritten += rewritten;
                summary.links_degraded += degraded;
            }
            FileOutcome::Skipped => summary.files_skipped += 1,
        }
    }

    write_root_redirect(root, scope.primary_host(), &known)?;
    summary.aliases_written = write_alias_stubs(root, &alias_stubs(scope, &known));
    summary.root_assets_linked = link_root_assets(root, scope.primary_host());

    tracing::info!(
        "Localized: {} scanned, {} rewritten, {} links rewritten, {} degraded, {} skipped",
        summary.files_scanned,
        summary.files_rewritten,
        summary.links_rewritten,
        summary.links_degraded,
        summary.files_skipped
    );
    if summary.aliases_written > 0 || summary.root_assets_linked > 0 {
        tracing::info!(
            "Added {} redirect stub(s) and {} root asset link(s)",
            summary.aliases_written,
            summary.root_assets_linked
        );
    }

    Ok(summary)
}

fn localize_file(
    root: &Path,
    local_path: &str,
    scope: &HostScope,
    known: &HashSet<String>,
) -> FileOutcome {
    let path = absolute(root, local_path);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Cannot read {}: {}", path.display(), e);
            return FileOutcome::Skipped;
        }
    };
    let html = match String::from_utf8(bytes) {
        Ok(html) => html,
        Err(_) => {
            tracing::warn!("Skipping {} (not valid UTF-8)", local_path);
            return FileOutcome::Skipped;
        }
    };

    let Some(rewriter) = DocumentRewriter::new(scope, known, local_path) else {
        return FileOutcome::Skipped;
    };
    let (output, stats) = rewriter.rewrite(&html);

    if output == html {
        return FileOutcome::Unchanged {
            rewritten: stats.links_rewritten,
            degraded: stats.links_degraded,
        };
    }

    if let Err(e) = fs::write(&path, output) {
        tracing::warn!("Cannot write {}: {}", path.display(), e);
        return FileOutcome::Skipped;
    }
    tracing::debug!("Rewrote {} ({} links)", local_path, stats.links_rewritten);

    FileOutcome::Rewritten {
        rewritten: stats.links_rewritten,
        degraded: stats.links_degraded,
    }
}

/// Writes `index.html` at the mirror root pointing at the primary host
fn write_root_redirect(root: &Path, primary_host: &str, known: &HashSet<String>) -> io::Result<()> {
    if known.contains("index.html") {
        return Ok(());
    }
    let target = format!("{}/index.html", primary_host);
    if !known.contains(&target) {
        return Ok(());
    }

    fs::write(root.join("index.html"), redirect_page(&relative_path(&[], &target)))?;
    tracing::info!("Wrote root redirect to {}", target);
    Ok(())
}

/// Small HTML document redirecting to an already encoded relative URL
fn redirect_page(href: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
         <meta http-equiv=\"refresh\" content=\"0; url={0}\">\
         <title>Redirecting</title></head>\
         <body><a href=\"{0}\">{0}</a></body></html>\n",
        href
    )
}

/// Redirect stubs for routes of the primary host, as `(stub, target)` pairs
///
/// For every `<primary>/R.html` page, `<primary>/R/index.html` points back
/// at it so `R/` resolves. Every page route (including `R/index.html`
/// pages) also gets `R.html` and `R/index.html` at the mirror root unless
/// R starts with a host directory. Stubs that already exist are omitted.
fn alias_stubs(scope: &HostScope, known: &HashSet<String>) -> Vec<(String, String)> {
    let prefix = format!("{}/", scope.primary_host());
    let mut pages: Vec<&String> = known
        .iter()
        .filter(|p| p.starts_with(&prefix) && p.ends_with(".html") && !p.contains('?'))
        .collect();
    pages.sort();

    let mut stubs: BTreeMap<String, String> = BTreeMap::new();
    let mut add = |stub: String, target: &str| {
        if !known.contains(&stub) {
            stubs.entry(stub).or_insert_with(|| target.to_string());
        }
    };

    for page in pages {
        let inside = &page[prefix.len()..];
        let route = match inside.strip_suffix("/index.html") {
            Some(route) => route,
            None if inside == "index.html" => continue,
            None => {
                let route = &inside[..inside.len() - ".html".len()];
                if !known.contains(&format!("{}{}", prefix, route)) {
                    add(format!("{}{}/index.html", prefix, route), page.as_str());
                }
                route
            }
        };

        let first = route.split('/').next().unwrap_or(route);
        if first.is_empty()
            || first.contains(':')
            || scope.contains_host(first)
            || known.contains(route)
        {
            continue;
        }
        add(format!("{}.html", route), page.as_str());
        add(format!("{}/index.html", route), page.as_str());
    }

    stubs.into_iter().collect()
}

/// Writes redirect stubs that do not exist yet; returns how many were written
fn write_alias_stubs(root: &Path, stubs: &[(String, String)]) -> usize {
    let mut written = 0;
    for (stub, target) in stubs {
        let path = absolute(root, stub);
        if fs::symlink_metadata(&path).is_ok() {
            continue;
        }
        let mut directory: Vec<&str> = stub.split('/').collect();
        directory.pop();
        let page = redirect_page(&relative_path(&directory, target));

        let result = match path.parent() {
            Some(parent) => fs::create_dir_all(parent).and_then(|_| fs::write(&path, page)),
            None => fs::write(&path, page),
        };
        match result {
            Ok(()) => {
                tracing::debug!("Alias {} -> {}", stub, target);
                written += 1;
            }
            Err(e) => tracing::warn!("Cannot write alias {}: {}", stub, e),
        }
    }
    written
}

/// Exposes well-known asset entries of the primary host at the mirror root
fn link_root_assets(root: &Path, primary_host: &str) -> usize {
    let mut linked = 0;
    for name in ROOT_ASSETS {
        if !root.join(primary_host).join(name).exists() {
            continue;
        }
        if fs::symlink_metadata(root.join(name)).is_ok() {
            continue;
        }
        match link_asset(root, primary_host, name) {
            Ok(()) => {
                tracing::debug!("Linked {}/{} at the mirror root", primary_host, name);
                linked += 1;
            }
            Err(e) => tracing::warn!("Cannot link {} at the mirror root: {}", name, e),
        }
    }
    linked
}

#[cfg(unix)]
fn link_asset(root: &Path, primary_host: &str, name: &str) -> io::Result<()> {
    std::os::unix::fs::symlink(Path::new(primary_host).join(name), root.join(name))
}

#[cfg(not(unix))]
fn link_asset(root: &Path, primary_host: &str, name: &str) -> io::Result<()> {
    copy_tree(&root.join(primary_host).join(name), &root.join(name))
}

#[cfg(not(unix))]
fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    if from.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_tree(&entry.path(), &to.join(entry.file_name()))?;
        }
        Ok(())
    } else {
        fs::copy(from, to).map(|_| ())
    }
}

fn is_html_path(local_path: &str) -> bool {
    let name = local_path.rsplit('/').next().unwrap_or(local_path);
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".html") || lower.ends_with(".htm")
}

fn absolute(root: &Path, local_path: &str) -> PathBuf {
    local_path
        .split('/')
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Lists every file under `root` as a sorted `/`-separated relative path
pub fn list_files(root: &Path) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!("Ignoring non-UTF-8 name in {}", dir.display());
                continue;
            };
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push((entry.path(), relative));
            } else if file_type.is_file() {
                files.push(relative);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, local_path: &str, content: &[u8]) {
        let path = absolute(root, local_path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn read(root: &Path, local_path: &str) -> String {
        fs::read_to_string(absolute(root, local_path)).unwrap()
    }

    #[test]
    fn test_localize_mirror_rewrites_and_redirects() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "example.com/index.html", br#"<a href="/about">About</a><a href="/nope">x</a>"#);
        write(root, "example.com/about.html", br#"<a href="https://example.com/">Home</a>"#);
        write(root, "example.com/style.css", b"body{background:url(/img/bg.png)}");

        let scope = HostScope::new("example.com", &[]);
        let summary = localize_mirror(root, &scope).unwrap();

        assert_eq!(summary.files_scanned, 2);
        assert_eq!(summary.files_rewritten, 2);
        assert_eq!(summary.links_rewritten, 2);
        assert_eq!(summary.links_degraded, 1);
        assert_eq!(
            read(root, "example.com/index.html"),
            r#"<a href="about.html">About</a><a href="https://example.com/nope">x</a>"#
        );
        assert_eq!(
            read(root, "example.com/style.css"),
            "body{background:url(/img/bg.png)}"
        );
        assert!(read(root, "index.html").contains("example.com/index.html"));
    }

    #[test]
    fn test_second_pass_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "example.com/index.html", br#"<a href="/a">a</a><img src="/gone.png">"#);
        write(root, "example.com/a.html", br#"<a href="/">home</a>"#);
        let scope = HostScope::new("example.com", &[]);

        localize_mirror(root, &scope).unwrap();
        let first = read(root, "example.com/index.html");
        let second_summary = localize_mirror(root, &scope).unwrap();

        assert_eq!(read(root, "example.com/index.html"), first);
        assert_eq!(second_summary.files_rewritten, 0);
    }

    #[test]
    fn test_invalid_utf8_is_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let bytes = b"<a href=\"/a\">\xff\xfe</a>";
        write(root, "example.com/index.html", bytes);

        let scope = HostScope::new("example.com", &[]);
        let summary = localize_mirror(root, &scope).unwrap();

        assert_eq!(summary.files_skipped, 1);
        assert_eq!(fs::read(absolute(root, "example.com/index.html")).unwrap(), bytes);
    }

    #[test]
    fn test_alias_stubs_and_root_assets() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "example.com/index.html", b"<p>home</p>");
        write(root, "example.com/docs/intro.html", b"<p>intro</p>");
        write(root, "example.com/guide/index.html", b"<p>guide</p>");
        write(root, "example.com/_next/static/app.js", b"js");
        let scope = HostScope::new("example.com", &[]);

        let summary = localize_mirror(root, &scope).unwrap();
        assert_eq!(summary.aliases_written, 5);

        assert!(read(root, "example.com/docs/intro/index.html").contains("url=../intro.html"));
        assert!(read(root, "docs/intro.html").contains("url=../example.com/docs/intro.html"));
        assert!(read(root, "docs/intro/index.html")
            .contains("url=../../example.com/docs/intro.html"));
        assert!(read(root, "guide.html").contains("url=example.com/guide/index.html"));
        assert!(read(root, "guide/index.html").contains("url=../example.com/guide/index.html"));
        assert!(!root.join("example.com/guide/index/index.html").exists());

        #[cfg(unix)]
        {
            assert_eq!(summary.root_assets_linked, 1);
            let meta = fs::symlink_metadata(root.join("_next")).unwrap();
            assert!(meta.file_type().is_symlink());
            assert!(root.join("_next/static/app.js").is_file());
        }

        let again = localize_mirror(root, &scope).unwrap();
        assert_eq!(again.aliases_written, 0);
        assert_eq!(again.root_assets_linked, 0);
        assert_eq!(again.files_rewritten, 0);
    }

    #[test]
    fn test_existing_files_never_replaced_by_stubs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "example.com/pricing.html", b"<p>pricing</p>");
        write(root, "pricing.html", b"mine");
        write(root, "example.com/pricing/index.html", b"real");
        let scope = HostScope::new("example.com", &[]);

        let summary = localize_mirror(root, &scope).unwrap();

        assert_eq!(summary.aliases_written, 1);
        assert_eq!(read(root, "pricing.html"), "mine");
        assert_eq!(read(root, "example.com/pricing/index.html"), "real");
        assert!(read(root, "pricing/index.html").contains("url=../example.com/pricing.html"));
    }

    #[test]
    fn test_list_files_sorted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "b.com/x.html", b"");
        write(dir.path(), "a.com/deep/y.css", b"");
        assert_eq!(
            list_files(dir.path()).unwrap(),
            vec!["a.com/deep/y.css".to_string(), "b.com/x.html".to_string()]
        );
    }
}

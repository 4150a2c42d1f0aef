//! Plain-text discovery artifacts

use crate::state::{Category, UrlRecord};
use crate::url::host_key;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

/// Writes the discovery artifacts into `dir`
///
/// Files, one sorted URL (or host) per line:
/// - `pages.txt` - page records
/// - `resources.txt` - resource records
/// - `internal_urls.txt` - every record
/// - `sitemaps.txt` - sitemap documents read during discovery
/// - `domains.txt` - distinct hosts of all records
pub fn write_discovery_artifacts(
    dir: &Path,
    records: &[UrlRecord],
    sitemaps: &[String],
) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let urls_of = |category: Option<Category>| -> BTreeSet<String> {
        records
            .iter()
            .filter(|r| category.map_or(true, |c| r.category == c))
            .map(|r| r.url.to_string())
            .collect()
    };

    write_lines(&dir.join("pages.txt"), urls_of(Some(Category::Page)))?;
    write_lines(&dir.join("resources.txt"), urls_of(Some(Category::Resource)))?;
    write_lines(&dir.join("internal_urls.txt"), urls_of(None))?;
    write_lines(
        &dir.join("sitemaps.txt"),
        sitemaps.iter().cloned().collect::<BTreeSet<_>>(),
    )?;
    write_lines(
        &dir.join("domains.txt"),
        records.iter().filter_map(|r| host_key(&r.url)).collect::<BTreeSet<_>>(),
    )?;

    tracing::debug!("Wrote discovery artifacts to {}", dir.display());
    Ok(())
}

fn write_lines(path: &Path, lines: BTreeSet<String>) -> io::Result<()> {
    let mut content = String::new();
    for line in lines {
        content.push_str(&line);
        content.push('\n');
    }
    fs::write(path, content)
}

//! Per-category fetch logs
//!
//! `pages.log` and `resources.log` hold one line per settled URL in
//! settlement order. Records the budget settled without a claim come last.

use crate::download::{FetchEvent, Settlement};
use crate::state::{Category, UrlRecord, UrlStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// Writes `pages.log` and `resources.log` into `dir`
///
/// # Arguments
///
/// * `dir` - Log directory, created if missing
/// * `events` - Settlement events of the download phase
/// * `records` - Every record of the run, after budget settlement
/// * `written_at` - Timestamp used for records settled without an event
pub fn write_fetch_logs(
    dir: &Path,
    events: &[FetchEvent],
    records: &[UrlRecord],
    written_at: DateTime<Utc>,
) -> io::Result<()> {
    fs::create_dir_all(dir)?;

    let logged: HashSet<&str> = events.iter().map(|e| e.url.as_str()).collect();
    let mut pages = String::new();
    let mut resources = String::new();

    let mut push = |category: Category, line: String| {
        let target = match category {
            Category::Page => &mut pages,
            Category::Resource => &mut resources,
        };
        target.push_str(&line);
        target.push('\n');
    };

    for event in events {
        push(event.category, event_line(event));
    }
    for record in records {
        if record.status != UrlStatus::Failed || logged.contains(record.url.as_str()) {
            continue;
        }
        let reason = record
            .failure_reason
            .map_or_else(|| "unknown".to_string(), |r| r.to_string());
        push(
            record.category,
            format!(
                "{} unclaimed ERROR {} {}: {}",
                timestamp(written_at),
                reason,
                record.url,
                record.failure_detail.as_deref().unwrap_or("")
            ),
        );
    }

    fs::write(dir.join("pages.log"), pages)?;
    fs::write(dir.join("resources.log"), resources)?;
    tracing::debug!("Wrote fetch logs to {}", dir.display());
    Ok(())
}

fn event_line(event: &FetchEvent) -> String {
    let prefix = format!("{} {}", timestamp(event.at), event.pass);
    match &event.settlement {
        Settlement::Fetched { local_path, bytes } => {
            format!("{} OK {} -> {} ({} bytes)", prefix, event.url, local_path, bytes)
        }
        Settlement::Reused { local_path } => {
            format!("{} REUSED {} -> {}", prefix, event.url, local_path)
        }
        Settlement::Failed { reason, detail } => {
            format!("{} ERROR {} {}: {}", prefix, reason, event.url, detail)
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

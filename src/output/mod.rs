//! Output module for mirror reports
//!
//! This module handles:
//! - Aggregating per-URL outcomes into a coverage report
//! - Writing the report as JSON
//! - Writing the plain-text discovery artifacts
//! - Writing the per-category fetch logs

mod artifacts;
mod fetch_log;
mod report;

pub use artifacts::write_discovery_artifacts;
pub use fetch_log::write_fetch_logs;
pub use report::{CategoryCounts, FailureLine, MirrorTotals, Report, UNSETTLED_DETAIL};

use crate::storage::Storage;
use crate::MirrorError;
use chrono::Utc;
use std::path::Path;

/// Writes a report as pretty-printed JSON
pub fn write_report(path: &Path, report: &Report) -> Result<(), MirrorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json + "\n")?;
    tracing::info!("Report written to {}", path.display());
    Ok(())
}

/// Re-derives the report of the latest run from the ledger
///
/// # Arguments
///
/// * `storage` - The ledger
///
/// # Returns
///
/// * `Ok(Report)` - Report over the stored records and entries
/// * `Err(MirrorError)` - The ledger could not be read
pub fn report_from_storage(storage: &dyn Storage) -> Result<Report, MirrorError> {
    let start_url = storage
        .get_latest_run()?
        .map(|run| run.start_url)
        .unwrap_or_default();
    let records = storage.load_records()?;
    let entries = storage.load_entries()?;

    Ok(Report::from_records(&start_url, &records, &entries, Utc::now()))
}

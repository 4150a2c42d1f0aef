//! Coverage report derived from per-URL outcomes

use crate::state::{Category, FailureReason, MirrorEntry, UrlRecord, UrlStatus};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Detail recorded for records the run never settled
pub const UNSETTLED_DETAIL: &str = "not fetched before the time budget expired";

/// Discovered/fetched/failed counts of one category
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    pub discovered: usize,
    pub fetched: usize,
    pub failed: usize,
}

/// Size of the mirror tree as recorded by its entries
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MirrorTotals {
    pub files: usize,
    pub bytes: u64,
}

/// One failed URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureLine {
    pub url: String,
    pub category: Category,
    pub failure_reason: FailureReason,
    pub detail: Option<String>,
}

/// Summary of a mirror run
///
/// Built only from records and entries, so it can be re-derived from the
/// ledger at any time. `discovered == fetched_success + fetched_failed`
/// holds for every report: a record still pending counts as a
/// `budget_exhausted` failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report {
    pub start_url: String,
    pub generated_at: String,
    pub discovered: usize,
    pub fetched_success: usize,
    pub fetched_failed: usize,
    pub pages: CategoryCounts,
    pub resources: CategoryCounts,
    pub failure_reasons: BTreeMap<FailureReason, usize>,
    pub mirror: MirrorTotals,
    pub failures: Vec<FailureLine>,
}

impl Report {
    /// Aggregates records and entries into a report
    ///
    /// # Arguments
    ///
    /// * `start_url` - The run's start URL, copied into the report
    /// * `records` - Every record of the run (any order)
    /// * `entries` - Every mirror entry of the run
    /// * `generated_at` - Timestamp stamped on the report
    pub fn from_records(
        start_url: &str,
        records: &[UrlRecord],
        entries: &[MirrorEntry],
        generated_at: DateTime<Utc>,
    ) -> Self {
        let mut pages = CategoryCounts::default();
        let mut resources = CategoryCounts::default();
        let mut failure_reasons = BTreeMap::new();
        let mut failures = Vec::new();

        for record in records {
            let counts = match record.category {
                Category::Page => &mut pages,
                Category::Resource => &mut resources,
            };
            counts.discovered += 1;

            let (reason, detail) = match record.status {
                UrlStatus::Fetched => {
                    counts.fetched += 1;
                    continue;
                }
                UrlStatus::Failed => (
                    record.failure_reason.unwrap_or(FailureReason::Network),
                    record.failure_detail.clone(),
                ),
                UrlStatus::Pending => (
                    FailureReason::BudgetExhausted,
                    Some(UNSETTLED_DETAIL.to_string()),
                ),
            };

            counts.failed += 1;
            *failure_reasons.entry(reason).or_insert(0) += 1;
            failures.push(FailureLine {
                url: record.url.to_string(),
                category: record.category,
                failure_reason: reason,
                detail,
            });
        }

        failures.sort_by(|a, b| a.url.cmp(&b.url));

        Self {
            start_url: start_url.to_string(),
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            discovered: pages.discovered + resources.discovered,
            fetched_success: pages.fetched + resources.fetched,
            fetched_failed: pages.failed + resources.failed,
            pages,
            resources,
            failure_reasons,
            mirror: MirrorTotals {
                files: entries.len(),
                bytes: entries.iter().map(|e| e.byte_size).sum(),
            },
            failures,
        }
    }

    /// One-line summary for the log
    pub fn summary_line(&self) -> String {
        format!(
            "{} discovered, {} fetched, {} failed ({} pages, {} resources), {} files / {} bytes",
            self.discovered,
            self.fetched_success,
            self.fetched_failed,
            self.pages.discovered,
            self.resources.discovered,
            self.mirror.files,
            self.mirror.bytes
        )
    }
}

//! Storage traits and error types
//!
//! This module defines the trait interface for ledger backends and
//! associated error types.

use crate::state::{MirrorEntry, UrlRecord};
use crate::storage::{RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt row for {url}: {detail}")]
    CorruptRow { url: String, detail: String },

    #[error("Unsupported ledger schema version {found} (expected {expected})")]
    SchemaVersion { found: u32, expected: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for ledger backend implementations
///
/// The ledger holds the records and entries of the latest run; saving a run
/// replaces what the previous run stored.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new mirror run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    /// * `start_url` - The run's normalized start URL
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str, start_url: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run as finished with the given status and a timestamp
    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    // ===== Records and Entries =====

    /// Replaces the stored URL records with those of `run_id`
    fn save_records(&mut self, run_id: i64, records: &[UrlRecord]) -> StorageResult<()>;

    /// Loads every stored URL record, sorted by URL
    fn load_records(&self) -> StorageResult<Vec<UrlRecord>>;

    /// Replaces the stored mirror entries with those of `run_id`
    fn save_entries(&mut self, run_id: i64, entries: &[MirrorEntry]) -> StorageResult<()>;

    /// Loads every stored mirror entry, sorted by URL
    fn load_entries(&self) -> StorageResult<Vec<MirrorEntry>>;

    /// Removes all records and entries (runs are kept)
    fn clear(&mut self) -> StorageResult<()>;
}

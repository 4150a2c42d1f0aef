//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::state::{Category, FailureReason, MirrorEntry, Source, UrlRecord, UrlStatus};
use crate::storage::schema::{initialize_schema, SCHEMA_VERSION};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use url::Url;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database, or it was written by
    ///   a newer schema
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        Self::with_connection(conn)
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let version = initialize_schema(&conn)?;
        if version > SCHEMA_VERSION {
            return Err(StorageError::SchemaVersion {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(Self { conn })
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        start_url: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?).unwrap_or(RunStatus::Failed),
    })
}

/// Raw url_records row, decoded after the query so errors carry the URL
struct RecordRow {
    url: String,
    depth: u32,
    source: String,
    category: String,
    status: String,
    failure_reason: Option<String>,
    failure_detail: Option<String>,
}

impl RecordRow {
    fn into_record(self) -> StorageResult<UrlRecord> {
        let corrupt = |detail: String| StorageError::CorruptRow {
            url: self.url.clone(),
            detail,
        };

        let url = Url::parse(&self.url).map_err(|e| corrupt(e.to_string()))?;
        let source = Source::from_db_string(&self.source)
            .ok_or_else(|| corrupt(format!("unknown source '{}'", self.source)))?;
        let category = Category::from_db_string(&self.category)
            .ok_or_else(|| corrupt(format!("unknown category '{}'", self.category)))?;
        let status = UrlStatus::from_db_string(&self.status)
            .ok_or_else(|| corrupt(format!("unknown status '{}'", self.status)))?;
        let failure_reason = match &self.failure_reason {
            Some(code) => Some(
                FailureReason::from_db_string(code)
                    .ok_or_else(|| corrupt(format!("unknown failure reason '{}'", code)))?,
            ),
            None => None,
        };

        Ok(UrlRecord {
            url,
            depth: self.depth,
            source,
            category,
            status,
            failure_reason,
            failure_detail: self.failure_detail,
        })
    }
}

impl Storage for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, start_url: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, start_url, status) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, start_url, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, start_url, status FROM runs WHERE id = ?1",
                params![run_id],
                run_from_row,
            )
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, start_url, status FROM runs ORDER BY id DESC LIMIT 1",
                [],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    fn finish_run(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![status.to_db_string(), now, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Records and Entries =====

    fn save_records(&mut self, run_id: i64, records: &[UrlRecord]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM url_records", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO url_records
                 (url, run_id, depth, source, category, status, failure_reason, failure_detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.url.as_str(),
                    run_id,
                    record.depth,
                    record.source.to_db_string(),
                    record.category.to_db_string(),
                    record.status.to_db_string(),
                    record.failure_reason.map(|r| r.to_db_string()),
                    record.failure_detail,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_records(&self) -> StorageResult<Vec<UrlRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, depth, source, category, status, failure_reason, failure_detail
             FROM url_records ORDER BY url",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(RecordRow {
                    url: row.get(0)?,
                    depth: row.get(1)?,
                    source: row.get(2)?,
                    category: row.get(3)?,
                    status: row.get(4)?,
                    failure_reason: row.get(5)?,
                    failure_detail: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RecordRow::into_record).collect()
    }

    fn save_entries(&mut self, run_id: i64, entries: &[MirrorEntry]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM mirror_entries", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO mirror_entries (url, run_id, local_path, byte_size, content_type)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    entry.url.as_str(),
                    run_id,
                    entry.local_path,
                    entry.byte_size as i64,
                    entry.content_type,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_entries(&self) -> StorageResult<Vec<MirrorEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, local_path, byte_size, content_type FROM mirror_entries ORDER BY url",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(url, local_path, byte_size, content_type)| {
                let parsed = Url::parse(&url).map_err(|e| StorageError::CorruptRow {
                    url: url.clone(),
                    detail: e.to_string(),
                })?;
                Ok(MirrorEntry {
                    url: parsed,
                    local_path,
                    byte_size: byte_size.max(0) as u64,
                    content_type,
                })
            })
            .collect()
    }

    fn clear(&mut self) -> StorageResult<()> {
        self.conn
            .execute_batch("DELETE FROM url_records; DELETE FROM mirror_entries;")?;
        Ok(())
    }
}

//! Database schema definitions and migrations

use rusqlite::{params, Connection, OptionalExtension};

/// Version written by this build; bump together with a migration step
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the ledger
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

-- Track mirror runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    start_url TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Every URL of the latest run, keyed by normalized URL
CREATE TABLE IF NOT EXISTS url_records (
    url TEXT PRIMARY KEY,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    depth INTEGER NOT NULL,
    source TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    failure_reason TEXT,
    failure_detail TEXT
);

CREATE INDEX IF NOT EXISTS idx_url_records_status ON url_records(status);

-- Files written to the mirror tree
CREATE TABLE IF NOT EXISTS mirror_entries (
    url TEXT PRIMARY KEY,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    local_path TEXT NOT NULL,
    byte_size INTEGER NOT NULL,
    content_type TEXT
);
"#;

/// Initializes the database schema and records its version
///
/// # Returns
///
/// * `Ok(version)` - The schema version in the database
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &Connection) -> Result<u32, rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;

    let existing: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()?
        .flatten();

    match existing {
        Some(version) => Ok(version),
        None => {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            Ok(SCHEMA_VERSION)
        }
    }
}

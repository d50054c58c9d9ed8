//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Sumi-Harvest
//! metrics database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    sources INTEGER NOT NULL DEFAULT 0,
    articles_succeeded INTEGER NOT NULL DEFAULT 0,
    articles_failed INTEGER NOT NULL DEFAULT 0,
    articles_skipped INTEGER NOT NULL DEFAULT 0
);

-- One row per source, overwritten on every save
CREATE TABLE IF NOT EXISTS source_metrics (
    source_id TEXT PRIMARY KEY,
    total_requests INTEGER NOT NULL DEFAULT 0,
    successful_requests INTEGER NOT NULL DEFAULT 0,
    avg_response_time_ms REAL NOT NULL DEFAULT 0,
    articles_discovered INTEGER NOT NULL DEFAULT 0,
    content_success INTEGER NOT NULL DEFAULT 0,
    content_failure INTEGER NOT NULL DEFAULT 0,
    last_updated TEXT
);

-- Failure counts per source and error kind
CREATE TABLE IF NOT EXISTS source_errors (
    source_id TEXT NOT NULL,
    error_kind TEXT NOT NULL,
    count INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (source_id, error_kind)
);

CREATE INDEX IF NOT EXISTS idx_source_errors_source ON source_errors(source_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the MetricsStore trait.

use crate::monitor::MetricsRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{MetricsStore, StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus, RunTotals};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

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
    /// * `Err(StorageError)` - Failed to open database, or the file is not one
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn load_errors(&self) -> StorageResult<BTreeMap<String, BTreeMap<String, u64>>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_id, error_kind, count FROM source_errors")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut errors: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        for row in rows {
            match row {
                Ok((source_id, kind, count)) => {
                    errors
                        .entry(source_id)
                        .or_default()
                        .insert(kind, count.max(0) as u64);
                }
                Err(e) => tracing::warn!("Skipping unreadable error count row: {}", e),
            }
        }
        Ok(errors)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(RunStatus::Running),
        totals: RunTotals {
            sources: row.get::<_, i64>(5)?.max(0) as u64,
            succeeded: row.get::<_, i64>(6)?.max(0) as u64,
            failed: row.get::<_, i64>(7)?.max(0) as u64,
            skipped: row.get::<_, i64>(8)?.max(0) as u64,
        },
    })
}

const RUN_COLUMNS: &str = "id, started_at, finished_at, config_hash, status, sources, \
                           articles_succeeded, articles_failed, articles_skipped";

struct RawMetrics {
    source_id: String,
    total_requests: i64,
    successful_requests: i64,
    avg_response_time_ms: f64,
    articles_discovered: i64,
    content_success: i64,
    content_failure: i64,
    last_updated: Option<String>,
}

impl RawMetrics {
    fn into_record(self) -> StorageResult<MetricsRecord> {
        let corrupt = |message: String| StorageError::Corrupt {
            source_id: self.source_id.clone(),
            message,
        };

        let counts = [
            self.total_requests,
            self.successful_requests,
            self.articles_discovered,
            self.content_success,
            self.content_failure,
        ];
        if counts.iter().any(|&c| c < 0) {
            return Err(corrupt("negative counter".to_string()));
        }
        if self.successful_requests > self.total_requests {
            return Err(corrupt("more successes than requests".to_string()));
        }
        if !self.avg_response_time_ms.is_finite() || self.avg_response_time_ms < 0.0 {
            return Err(corrupt(format!(
                "invalid average response time {}",
                self.avg_response_time_ms
            )));
        }

        let last_updated = match &self.last_updated {
            None => None,
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(raw)
                    .map_err(|e| corrupt(format!("invalid timestamp '{}': {}", raw, e)))?
                    .with_timezone(&Utc),
            ),
        };

        Ok(MetricsRecord {
            source_id: self.source_id.clone(),
            total_requests: self.total_requests as u64,
            successful_requests: self.successful_requests as u64,
            avg_response_time_ms: self.avg_response_time_ms,
            articles_discovered: self.articles_discovered as u64,
            content_success: self.content_success as u64,
            content_failure: self.content_failure as u64,
            last_updated,
            errors: BTreeMap::new(),
        })
    }
}

impl MetricsStore for SqliteStorage {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .optional()?
            .ok_or(StorageError::RunNotFound(run_id))
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT 1", RUN_COLUMNS);
        let run = self.conn.query_row(&sql, [], run_from_row).optional()?;
        Ok(run)
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, sources = ?3,
                 articles_succeeded = ?4, articles_failed = ?5, articles_skipped = ?6
             WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                totals.sources as i64,
                totals.succeeded as i64,
                totals.failed as i64,
                totals.skipped as i64,
                run_id
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    // ===== Metrics =====

    fn save_metrics(&mut self, records: &[MetricsRecord]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT OR REPLACE INTO source_metrics
                    (source_id, total_requests, successful_requests, avg_response_time_ms,
                     articles_discovered, content_success, content_failure, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let mut clear_errors = tx.prepare("DELETE FROM source_errors WHERE source_id = ?1")?;
            let mut insert_error = tx.prepare(
                "INSERT INTO source_errors (source_id, error_kind, count) VALUES (?1, ?2, ?3)",
            )?;

            for record in records {
                upsert.execute(params![
                    record.source_id,
                    record.total_requests as i64,
                    record.successful_requests as i64,
                    record.avg_response_time_ms,
                    record.articles_discovered as i64,
                    record.content_success as i64,
                    record.content_failure as i64,
                    record.last_updated.map(|t| t.to_rfc3339()),
                ])?;

                clear_errors.execute(params![record.source_id])?;
                for (kind, count) in &record.errors {
                    insert_error.execute(params![record.source_id, kind, *count as i64])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load_metrics(&self) -> StorageResult<Vec<MetricsRecord>> {
        let mut errors = self.load_errors()?;

        let mut stmt = self.conn.prepare(
            "SELECT source_id, total_requests, successful_requests, avg_response_time_ms,
                    articles_discovered, content_success, content_failure, last_updated
             FROM source_metrics ORDER BY source_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawMetrics {
                source_id: row.get(0)?,
                total_requests: row.get(1)?,
                successful_requests: row.get(2)?,
                avg_response_time_ms: row.get(3)?,
                articles_discovered: row.get(4)?,
                content_success: row.get(5)?,
                content_failure: row.get(6)?,
                last_updated: row.get(7)?,
            })
        })?;

        let mut records = Vec::new();
        for row in rows {
            let decoded = row
                .map_err(StorageError::from)
                .and_then(RawMetrics::into_record);
            match decoded {
                Ok(mut record) => {
                    record.errors = errors.remove(&record.source_id).unwrap_or_default();
                    records.push(record);
                }
                Err(e) => tracing::warn!("Skipping stored metrics row: {}", e),
            }
        }

        Ok(records)
    }
}

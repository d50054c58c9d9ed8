//! Storage traits and error types
//!
//! This module defines the trait interface for metrics backends and
//! associated error types.

use crate::monitor::MetricsRecord;
use crate::storage::{RunRecord, RunStatus, RunTotals};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Corrupt record for source {source_id}: {message}")]
    Corrupt { source_id: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable store for run history and per-source metrics
///
/// Implementations must be `Send` so the monitor can keep one behind a mutex
/// shared by pool workers.
pub trait MetricsStore: Send {
    // ===== Run Management =====

    /// Creates a new harvest run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Marks a run finished with its final status and totals
    fn finish_run(&mut self, run_id: i64, status: RunStatus, totals: &RunTotals)
        -> StorageResult<()>;

    // ===== Metrics =====

    /// Replaces the stored metrics for every record given
    fn save_metrics(&mut self, records: &[MetricsRecord]) -> StorageResult<()>;

    /// Loads all stored metrics
    ///
    /// Rows that cannot be decoded are skipped with a warning.
    fn load_metrics(&self) -> StorageResult<Vec<MetricsRecord>>;
}

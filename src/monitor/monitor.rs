//! Performance and health tracking for sources
//!
//! Counters live in memory and are written to the metrics store on
//! [`PerformanceMonitor::save`]. Stored metrics are loaded when the monitor
//! is opened; an unreadable store leaves the counters empty.

use crate::config::MonitorConfig;
use crate::monitor::MetricsRecord;
use crate::storage::{
    open_storage, MetricsStore, RunRecord, RunStatus, RunTotals, StorageError, StorageResult,
};
use crate::ErrorKind;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Handle for an in-flight request, returned by [`PerformanceMonitor::start_request`]
#[derive(Debug)]
pub struct RequestToken {
    id: u64,
    source_id: String,
    started: Instant,
}

impl RequestToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

/// Health verdict for one source
#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub source_id: String,
    pub healthy: bool,
    pub success_rate: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Tracks request timing and success rates per source
pub struct PerformanceMonitor {
    metrics: Mutex<HashMap<String, MetricsRecord>>,
    store: Option<Mutex<Box<dyn MetricsStore>>>,
    health_threshold: f64,
    activity_window: Duration,
    next_token: AtomicU64,
}

impl PerformanceMonitor {
    /// Creates a monitor without durable storage
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            metrics: Mutex::new(HashMap::new()),
            store: None,
            health_threshold: config.health_threshold,
            activity_window: Duration::from_secs(config.activity_window_secs),
            next_token: AtomicU64::new(1),
        }
    }

    /// Creates a monitor backed by `store` and loads what it holds
    pub fn with_store(config: &MonitorConfig, store: Box<dyn MetricsStore>) -> Self {
        let mut monitor = Self::new(config);
        monitor.store = Some(Mutex::new(store));
        monitor.load();
        monitor
    }

    /// Opens the configured database and loads stored metrics
    ///
    /// If the database cannot be opened the monitor keeps working in memory.
    pub fn open(config: &MonitorConfig) -> Self {
        match open_storage(Path::new(&config.database_path)) {
            Ok(storage) => Self::with_store(config, Box::new(storage)),
            Err(e) => {
                tracing::warn!(
                    "Cannot open metrics database {}, starting with empty metrics: {}",
                    config.database_path,
                    e
                );
                Self::new(config)
            }
        }
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Starts timing a request for `source_id`
    pub fn start_request(&self, source_id: &str) -> RequestToken {
        RequestToken {
            id: self.next_token.fetch_add(1, Ordering::Relaxed),
            source_id: source_id.to_string(),
            started: Instant::now(),
        }
    }

    /// Finishes a request started with [`start_request`](Self::start_request)
    ///
    /// # Arguments
    ///
    /// * `token` - The token returned when the request started
    /// * `success` - Whether the request succeeded
    /// * `error` - Classification of the failure, if any
    pub fn end_request(&self, token: RequestToken, success: bool, error: Option<ErrorKind>) {
        let elapsed_ms = token.started.elapsed().as_secs_f64() * 1000.0;
        self.with_record(&token.source_id, |record| {
            record.record_request(success, elapsed_ms, Utc::now());
            if let Some(kind) = error {
                record.record_error(kind.as_str());
            }
        });
    }

    /// Adds `count` discovered articles to a source's tally
    pub fn record_article_discovery(&self, source_id: &str, count: usize) {
        self.with_record(source_id, |record| {
            record.articles_discovered += count as u64;
            record.last_updated = Some(Utc::now());
        });
    }

    /// Counts one content fetch outcome
    pub fn record_content_fetch(&self, source_id: &str, success: bool) {
        self.with_record(source_id, |record| {
            if success {
                record.content_success += 1;
            } else {
                record.content_failure += 1;
            }
            record.last_updated = Some(Utc::now());
        });
    }

    pub fn get_metrics(&self, source_id: &str) -> Option<MetricsRecord> {
        self.lock_metrics().get(source_id).cloned()
    }

    /// All records, sorted by source id
    pub fn all_metrics(&self) -> Vec<MetricsRecord> {
        let mut records: Vec<MetricsRecord> = self.lock_metrics().values().cloned().collect();
        records.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        records
    }

    /// Failure counts by error kind for one source
    pub fn error_breakdown(&self, source_id: &str) -> BTreeMap<String, u64> {
        self.lock_metrics()
            .get(source_id)
            .map(|r| r.errors.clone())
            .unwrap_or_default()
    }

    /// True if the source's success rate meets the threshold and it was
    /// active within the configured window
    pub fn health_check(&self, source_id: &str) -> bool {
        self.health_check_at(source_id, Utc::now())
    }

    /// [`health_check`](Self::health_check) evaluated at a given instant
    pub fn health_check_at(&self, source_id: &str, now: DateTime<Utc>) -> bool {
        self.lock_metrics()
            .get(source_id)
            .map(|record| self.is_healthy(record, now))
            .unwrap_or(false)
    }

    /// Health of every tracked source, sorted by source id
    pub fn health_report(&self) -> Vec<HealthStatus> {
        let now = Utc::now();
        self.all_metrics()
            .into_iter()
            .map(|record| HealthStatus {
                healthy: self.is_healthy(&record, now),
                success_rate: record.success_rate(),
                last_updated: record.last_updated,
                source_id: record.source_id,
            })
            .collect()
    }

    /// Writes all counters to the store
    pub fn save(&self) -> StorageResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let records = self.all_metrics();
        self.lock_store(store).save_metrics(&records)?;
        tracing::debug!("Saved metrics for {} sources", records.len());
        Ok(())
    }

    /// Replaces the in-memory counters with what the store holds
    ///
    /// Returns the number of records loaded. Errors are logged and leave the
    /// counters empty.
    pub fn load(&self) -> usize {
        let Some(store) = &self.store else {
            return 0;
        };

        let loaded = match self.lock_store(store).load_metrics() {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to load stored metrics, starting empty: {}", e);
                Vec::new()
            }
        };

        let count = loaded.len();
        let mut metrics = self.lock_metrics();
        metrics.clear();
        metrics.extend(loaded.into_iter().map(|r| (r.source_id.clone(), r)));
        tracing::info!("Loaded metrics for {} sources", count);
        count
    }

    /// Records the start of a run; None without a store
    pub fn start_run(&self, config_hash: &str) -> StorageResult<Option<i64>> {
        match &self.store {
            Some(store) => Ok(Some(self.lock_store(store).create_run(config_hash)?)),
            None => Ok(None),
        }
    }

    pub fn finish_run(
        &self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        match &self.store {
            Some(store) => self.lock_store(store).finish_run(run_id, status, totals),
            None => Err(StorageError::RunNotFound(run_id)),
        }
    }

    pub fn latest_run(&self) -> StorageResult<Option<RunRecord>> {
        match &self.store {
            Some(store) => self.lock_store(store).get_latest_run(),
            None => Ok(None),
        }
    }

    fn is_healthy(&self, record: &MetricsRecord, now: DateTime<Utc>) -> bool {
        let recent = record.last_updated.map_or(false, |at| {
            (now - at)
                .to_std()
                .map_or(true, |age| age <= self.activity_window)
        });
        recent && record.total_requests > 0 && record.success_rate() >= self.health_threshold
    }

    fn with_record(&self, source_id: &str, update: impl FnOnce(&mut MetricsRecord)) {
        let mut metrics = self.lock_metrics();
        let record = metrics
            .entry(source_id.to_string())
            .or_insert_with(|| MetricsRecord::new(source_id));
        update(record);
    }

    fn lock_metrics(&self) -> std::sync::MutexGuard<'_, HashMap<String, MetricsRecord>> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_store<'a>(
        &self,
        store: &'a Mutex<Box<dyn MetricsStore>>,
    ) -> std::sync::MutexGuard<'a, Box<dyn MetricsStore>> {
        store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteStorage;

    fn config() -> MonitorConfig {
        MonitorConfig {
            database_path: ":memory:".to_string(),
            health_threshold: 50.0,
            activity_window_secs: 3600,
        }
    }

    #[test]
    fn test_request_tracking() {
        let monitor = PerformanceMonitor::new(&config());
        let token = monitor.start_request("wire");
        assert_eq!(token.source_id(), "wire");
        monitor.end_request(token, true, None);
        let token = monitor.start_request("wire");
        monitor.end_request(token, false, Some(ErrorKind::NetworkTransient));

        let metrics = monitor.get_metrics("wire").unwrap();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.success_rate(), 50.0);
        assert_eq!(
            monitor.error_breakdown("wire").get("network_transient"),
            Some(&1)
        );
    }

    #[test]
    fn test_unknown_source() {
        let monitor = PerformanceMonitor::new(&config());
        assert!(monitor.get_metrics("nope").is_none());
        assert!(!monitor.health_check("nope"));
        assert!(monitor.error_breakdown("nope").is_empty());
    }

    #[test]
    fn test_discovery_and_content_counts() {
        let monitor = PerformanceMonitor::new(&config());
        monitor.record_article_discovery("wire", 7);
        monitor.record_content_fetch("wire", true);
        monitor.record_content_fetch("wire", false);

        let metrics = monitor.get_metrics("wire").unwrap();
        assert_eq!(metrics.articles_discovered, 7);
        assert_eq!(metrics.content_success, 1);
        assert_eq!(metrics.content_failure, 1);
        // Discovery alone is activity, but no requests means no success rate
        assert_eq!(metrics.success_rate(), 0.0);
        assert!(!monitor.health_check("wire"));
    }

    #[test]
    fn test_health_needs_rate_and_recent_activity() {
        let monitor = PerformanceMonitor::new(&config());
        for success in [true, true, false] {
            let token = monitor.start_request("wire");
            monitor.end_request(token, success, None);
        }
        assert!(monitor.health_check("wire"));

        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(!monitor.health_check_at("wire", later));

        for _ in 0..3 {
            let token = monitor.start_request("flaky");
            monitor.end_request(token, false, Some(ErrorKind::Http));
        }
        assert!(!monitor.health_check("flaky"));

        let report = monitor.health_report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].source_id, "flaky");
        assert!(!report[0].healthy);
        assert!(report[1].healthy);
    }

    #[test]
    fn test_save_and_reload_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.database_path = dir.path().join("metrics.db").display().to_string();

        {
            let monitor = PerformanceMonitor::open(&cfg);
            assert!(monitor.has_store());
            let token = monitor.start_request("wire");
            monitor.end_request(token, true, None);
            monitor.record_article_discovery("wire", 3);
            monitor.save().unwrap();
        }

        let monitor = PerformanceMonitor::open(&cfg);
        let metrics = monitor.get_metrics("wire").unwrap();
        assert_eq!(metrics.total_requests, 1);
        assert_eq!(metrics.articles_discovered, 3);
    }

    #[test]
    fn test_corrupt_database_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.db");
        std::fs::write(&path, b"this is not a sqlite database, just some bytes").unwrap();

        let mut cfg = config();
        cfg.database_path = path.display().to_string();
        let monitor = PerformanceMonitor::open(&cfg);

        assert!(monitor.all_metrics().is_empty());
        monitor.record_content_fetch("wire", true);
        assert!(monitor.save().is_ok() || !monitor.has_store());
    }

    #[test]
    fn test_runs_recorded() {
        let monitor =
            PerformanceMonitor::with_store(&config(), Box::new(SqliteStorage::new_in_memory().unwrap()));
        let run_id = monitor.start_run("abc").unwrap().unwrap();
        monitor
            .finish_run(run_id, RunStatus::Completed, &RunTotals::default())
            .unwrap();
        let latest = monitor.latest_run().unwrap().unwrap();
        assert_eq!(latest.id, run_id);
        assert_eq!(latest.status, RunStatus::Completed);
    }

    #[test]
    fn test_without_store_runs_are_absent() {
        let monitor = PerformanceMonitor::new(&config());
        assert_eq!(monitor.start_run("abc").unwrap(), None);
        assert!(monitor.save().is_ok());
        assert_eq!(monitor.load(), 0);
    }
}

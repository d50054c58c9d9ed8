//! Per-source request and content counters

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Per-source request and content counters
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRecord {
    pub source_id: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    /// Running mean over all completed requests
    pub avg_response_time_ms: f64,
    pub articles_discovered: u64,
    pub content_success: u64,
    pub content_failure: u64,
    pub last_updated: Option<DateTime<Utc>>,
    /// Failure counts keyed by error kind
    pub errors: BTreeMap<String, u64>,
}

impl MetricsRecord {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            total_requests: 0,
            successful_requests: 0,
            avg_response_time_ms: 0.0,
            articles_discovered: 0,
            content_success: 0,
            content_failure: 0,
            last_updated: None,
            errors: BTreeMap::new(),
        }
    }

    /// Percentage of successful requests, in `[0, 100]`
    ///
    /// Zero when no requests have been made.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        let rate = self.successful_requests as f64 / self.total_requests as f64 * 100.0;
        rate.clamp(0.0, 100.0)
    }

    /// Folds one completed request into the counters
    pub fn record_request(&mut self, success: bool, elapsed_ms: f64, now: DateTime<Utc>) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        }
        let elapsed_ms = if elapsed_ms.is_finite() { elapsed_ms.max(0.0) } else { 0.0 };
        self.avg_response_time_ms +=
            (elapsed_ms - self.avg_response_time_ms) / self.total_requests as f64;
        self.last_updated = Some(now);
    }

    pub fn record_error(&mut self, kind: &str) {
        *self.errors.entry(kind.to_string()).or_insert(0) += 1;
    }
}

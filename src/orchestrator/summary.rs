//! Run results

use crate::storage::{RunStatus, RunTotals};
use crate::ErrorKind;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// How one article ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    Succeeded,
    /// The source was skipped, before or during this article
    Skipped,
    Failed,
}

/// Result of one article task; failures are values, never errors
#[derive(Debug, Clone)]
pub struct ArticleOutcome {
    pub source_id: String,
    pub url: Url,
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// URL the content came from, when a fallback was used
    pub fetched_from: Option<Url>,
    pub output: Option<PathBuf>,
}

impl ArticleOutcome {
    pub fn success(&self) -> bool {
        self.status == OutcomeStatus::Succeeded
    }
}

/// Per-source article counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceTally {
    /// Articles returned by discovery
    pub discovered: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Source-level problem (not found, discovery failure)
    pub error: Option<String>,
}

impl SourceTally {
    pub fn record(&mut self, outcome: &ArticleOutcome) {
        self.attempted += 1;
        match outcome.status {
            OutcomeStatus::Succeeded => self.succeeded += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Failed => self.failed += 1,
        }
    }
}

/// Aggregated result of [`FetchOrchestrator::run`](crate::FetchOrchestrator::run)
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Option<i64>,
    pub config_hash: String,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Tallies keyed by source id
    pub sources: BTreeMap<String, SourceTally>,
    /// Sources skipped for the rest of the run
    pub skipped_sources: Vec<String>,
    pub cancelled: bool,
}

impl RunSummary {
    pub fn tally(&self, source_id: &str) -> Option<&SourceTally> {
        self.sources.get(source_id)
    }

    pub fn totals(&self) -> RunTotals {
        self.sources.values().fold(
            RunTotals {
                sources: self.sources.len() as u64,
                ..RunTotals::default()
            },
            |mut totals, tally| {
                totals.succeeded += tally.succeeded as u64;
                totals.failed += tally.failed as u64;
                totals.skipped += tally.skipped as u64;
                totals
            },
        )
    }

    pub fn status(&self) -> RunStatus {
        if self.cancelled {
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        }
    }

    /// Sources with a source-level error
    pub fn failed_sources(&self) -> Vec<(&str, &str)> {
        self.sources
            .iter()
            .filter_map(|(id, t)| t.error.as_deref().map(|e| (id.as_str(), e)))
            .collect()
    }
}

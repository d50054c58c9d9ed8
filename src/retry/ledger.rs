//! Per-run skip ledger

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Why and when a source was skipped
#[derive(Debug, Clone, PartialEq)]
pub struct SkipEntry {
    pub reason: String,
    /// Invocations spent before the skip
    pub attempts: u32,
    pub skipped_at: DateTime<Utc>,
}

/// Sources known to be failing in the current run
///
/// Safe for concurrent use from pool workers. Cleared once per run.
#[derive(Debug, Default)]
pub struct SkipLedger {
    entries: RwLock<HashMap<String, SkipEntry>>,
}

impl SkipLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a skip; returns false if the source was already skipped
    pub fn mark_skipped(&self, source_id: &str, reason: impl Into<String>, attempts: u32) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(source_id) {
            return false;
        }
        entries.insert(
            source_id.to_string(),
            SkipEntry {
                reason: reason.into(),
                attempts,
                skipped_at: Utc::now(),
            },
        );
        true
    }

    pub fn is_skipped(&self, source_id: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(source_id)
    }

    pub fn get(&self, source_id: &str) -> Option<SkipEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source_id)
            .cloned()
    }

    /// Skipped source ids, sorted
    pub fn skipped_sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reset(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

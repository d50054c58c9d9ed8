//! Per-request attempt tracking

use crate::{ErrorKind, FetchError};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Lifecycle of one request chain
///
/// States only move forward: `Pending`, then `Retrying(n)` with increasing
/// `n`, then exactly one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Retrying(u32),
    Success,
    /// Retry budget exhausted; the source was recorded in the skip ledger
    Skipped,
    /// A non-retryable error ended the chain
    Failed,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped | Self::Failed)
    }

    fn can_move_to(&self, next: AttemptState) -> bool {
        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (Self::Pending, _) => next != Self::Pending,
            (Self::Retrying(n), Self::Retrying(m)) => m > *n,
            (Self::Retrying(_), next) => next.is_terminal(),
            _ => false,
        }
    }
}

/// Ephemeral record of one (source, target) request chain
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub source_id: String,
    pub target: Option<Url>,
    attempts: u32,
    last_error: Option<ErrorKind>,
    next_eligible: Option<Instant>,
    state: AttemptState,
}

impl FetchAttempt {
    pub fn new(source_id: impl Into<String>, target: Option<Url>) -> Self {
        Self {
            source_id: source_id.into(),
            target,
            attempts: 0,
            last_error: None,
            next_eligible: None,
            state: AttemptState::Pending,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub fn next_eligible(&self) -> Option<Instant> {
        self.next_eligible
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Counts a new invocation and returns the running total
    pub fn begin(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Records a retryable failure and schedules the next attempt
    pub fn retrying(&mut self, error: &FetchError, delay: Duration) {
        self.last_error = Some(error.kind());
        self.next_eligible = Some(Instant::now() + delay);
        self.transition(AttemptState::Retrying(self.attempts));
    }

    pub fn succeed(&mut self) {
        self.next_eligible = None;
        self.transition(AttemptState::Success);
    }

    pub fn skip(&mut self, error: Option<&FetchError>) {
        if let Some(error) = error {
            self.last_error = Some(error.kind());
        }
        self.next_eligible = None;
        self.transition(AttemptState::Skipped);
    }

    pub fn fail(&mut self, error: &FetchError) {
        self.last_error = Some(error.kind());
        self.next_eligible = None;
        self.transition(AttemptState::Failed);
    }

    fn transition(&mut self, next: AttemptState) {
        if self.state.can_move_to(next) {
            self.state = next;
        } else {
            tracing::debug!(
                "Ignoring attempt transition {:?} -> {:?} for {}",
                self.state,
                next,
                self.source_id
            );
        }
    }
}

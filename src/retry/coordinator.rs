//! Bounded application-level retry with a per-run skip ledger

use crate::config::RetryConfig;
use crate::retry::attempt::FetchAttempt;
use crate::retry::ledger::SkipLedger;
use crate::FetchError;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Result of [`RetrySkipCoordinator::execute_with_url_fallbacks`]
#[derive(Debug, Clone, PartialEq)]
pub enum Fallback<T> {
    /// A candidate succeeded
    Success { value: T, url: Url },
    /// Every candidate failed, or the source was already skipped
    Skipped { reason: String },
}

impl<T> Fallback<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Why a retry loop stopped without a value
enum Stop {
    Cancelled,
    AlreadySkipped(String),
    /// Retry budget used up, or a rate limit surfaced from the gate
    Exhausted(FetchError),
    /// A non-retryable error
    Terminal(FetchError),
}

/// Retries transient failures and skips sources that keep failing
pub struct RetrySkipCoordinator {
    config: RetryConfig,
    ledger: SkipLedger,
    cancel: CancellationToken,
}

impl RetrySkipCoordinator {
    pub fn new(config: RetryConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            ledger: SkipLedger::new(),
            cancel,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SkipLedger {
        &self.ledger
    }

    /// Clears the skip ledger; call once at the start of every run
    pub fn reset(&self) {
        self.ledger.reset();
    }

    /// Runs `operation` with up to `max-retries` retries
    ///
    /// The operation is invoked at most `max_retries + 1` times. Retryable
    /// failures are retried after `retry-delay`; once the budget is spent, or
    /// the gate reports an exhausted rate limit, the source is recorded in
    /// the skip ledger and `FetchError::Skipped` is returned. Later calls for
    /// a skipped source return `Skipped` without invoking the operation.
    /// Non-retryable errors are returned unchanged.
    ///
    /// # Arguments
    ///
    /// * `source_id` - Ledger key for the source the operation belongs to
    /// * `operation` - Produces a fresh future for every attempt
    pub async fn execute<T, F, Fut>(&self, source_id: &str, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = FetchAttempt::new(source_id, None);

        match self
            .attempt_loop(&mut attempt, self.config.max_retries, &mut operation)
            .await
        {
            Ok(value) => Ok(value),
            Err(Stop::Cancelled) => Err(FetchError::Cancelled),
            Err(Stop::AlreadySkipped(reason)) => Err(FetchError::Skipped {
                source_id: source_id.to_string(),
                reason,
            }),
            Err(Stop::Exhausted(error)) => {
                let reason = format!("{} after {} attempts", error, attempt.attempts());
                self.skip_source(source_id, &reason, attempt.attempts());
                attempt.skip(Some(&error));
                Err(FetchError::Skipped {
                    source_id: source_id.to_string(),
                    reason,
                })
            }
            Err(Stop::Terminal(error)) => {
                attempt.fail(&error);
                Err(error)
            }
        }
    }

    /// Tries each candidate URL in order, returning the first success
    ///
    /// Each candidate gets `fallback-retries` retries of its own. When every
    /// candidate fails the source is recorded in the skip ledger and
    /// `Fallback::Skipped` is returned. Only cancellation is an error.
    pub async fn execute_with_url_fallbacks<T, F, Fut>(
        &self,
        source_id: &str,
        urls: &[Url],
        mut fetch: F,
    ) -> Result<Fallback<T>, FetchError>
    where
        F: FnMut(Url) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut last_error: Option<FetchError> = None;
        let mut total_attempts = 0;

        for url in urls {
            let mut attempt = FetchAttempt::new(source_id, Some(url.clone()));
            let mut operation = || fetch(url.clone());

            let result = self
                .attempt_loop(&mut attempt, self.config.fallback_retries, &mut operation)
                .await;
            total_attempts += attempt.attempts();

            match result {
                Ok(value) => {
                    return Ok(Fallback::Success {
                        value,
                        url: url.clone(),
                    })
                }
                Err(Stop::Cancelled) => return Err(FetchError::Cancelled),
                Err(Stop::AlreadySkipped(reason)) => return Ok(Fallback::Skipped { reason }),
                Err(Stop::Exhausted(error)) => {
                    attempt.skip(Some(&error));
                    tracing::debug!("Candidate {} for {} exhausted: {}", url, source_id, error);
                    last_error = Some(error);
                }
                Err(Stop::Terminal(error)) => {
                    attempt.fail(&error);
                    tracing::debug!("Candidate {} for {} failed: {}", url, source_id, error);
                    last_error = Some(error);
                }
            }
        }

        let reason = match last_error {
            Some(error) => format!("all {} candidate URLs failed, last: {}", urls.len(), error),
            None => "no candidate URLs".to_string(),
        };
        self.skip_source(source_id, &reason, total_attempts);
        Ok(Fallback::Skipped { reason })
    }

    async fn attempt_loop<T, F, Fut>(
        &self,
        attempt: &mut FetchAttempt,
        max_retries: u32,
        operation: &mut F,
    ) -> Result<T, Stop>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            if let Some(entry) = self.ledger.get(&attempt.source_id) {
                attempt.skip(None);
                return Err(Stop::AlreadySkipped(entry.reason));
            }

            let n = attempt.begin();
            let error = match operation().await {
                Ok(value) => {
                    attempt.succeed();
                    return Ok(value);
                }
                Err(error) => error,
            };

            match error {
                FetchError::Cancelled => return Err(Stop::Cancelled),
                FetchError::RateLimited { .. } => return Err(Stop::Exhausted(error)),
                FetchError::Skipped { reason, .. } => return Err(Stop::AlreadySkipped(reason)),
                e if !e.is_retryable() => return Err(Stop::Terminal(e)),
                e if n > max_retries => return Err(Stop::Exhausted(e)),
                e => {
                    let delay = self.config.retry_delay();
                    tracing::debug!(
                        "Attempt {} for {} failed, retrying in {:?}: {}",
                        n,
                        attempt.source_id,
                        delay,
                        e
                    );
                    attempt.retrying(&e, delay);
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Stop::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn skip_source(&self, source_id: &str, reason: &str, attempts: u32) {
        if self.ledger.mark_skipped(source_id, reason, attempts) {
            tracing::warn!("Skipping source {} for the rest of the run: {}", source_id, reason);
        }
    }
}

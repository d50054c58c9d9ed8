//! Backoff schedule and Retry-After parsing for 429/503 responses

use crate::config::GateConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Exponential backoff: `initial * base^attempt`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub base: f64,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &GateConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.initial_delay_ms),
            base: config.backoff_base,
            max: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.base.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let secs = self.initial.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs)
    }
}

/// Parses a `Retry-After` header value
///
/// Accepts delta-seconds (`"120"`) or an HTTP-date
/// (`"Wed, 21 Oct 2015 07:28:00 GMT"`). A date in the past yields zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&Utc) - now;
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

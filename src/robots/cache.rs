//! Robots.txt cache entries
//!
//! An entry records where its policy came from and when it was fetched, so the
//! gate can decide when to refresh it.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Default freshness window for a fetched robots.txt
pub const DEFAULT_ROBOTS_TTL: Duration = Duration::from_secs(15 * 60);

/// How the cached policy was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicySource {
    /// robots.txt was fetched and parsed
    Fetched,
    /// robots.txt returned a 4xx; treated as no restrictions
    Missing,
    /// robots.txt could not be retrieved; the configured fallback applies
    Unreachable,
}

/// Cached robots.txt data for one domain
#[derive(Debug, Clone)]
pub struct RobotsCacheEntry {
    pub domain: String,
    pub policy: ParsedRobots,
    /// Crawl-delay extracted for our user agent
    pub crawl_delay: Option<Duration>,
    pub source: PolicySource,
    /// Monotonic fetch time, used for expiry
    pub fetched_at: Instant,
    /// Wall-clock fetch time, for reporting
    pub fetched_at_wall: DateTime<Utc>,
    pub ttl: Duration,
}

impl RobotsCacheEntry {
    /// Creates a new entry stamped with the current time
    pub fn new(
        domain: &str,
        policy: ParsedRobots,
        source: PolicySource,
        user_agent: &str,
        ttl: Duration,
    ) -> Self {
        let crawl_delay = policy.crawl_delay(user_agent);
        Self {
            domain: domain.to_string(),
            policy,
            crawl_delay,
            source,
            fetched_at: Instant::now(),
            fetched_at_wall: Utc::now(),
            ttl,
        }
    }

    /// Checks whether the entry is older than its TTL
    pub fn is_stale(&self, now: Instant) -> bool {
        self.age(now) >= self.ttl
    }

    /// Returns the age of the entry
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    /// Checks if a URL is allowed according to the cached policy
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.policy.is_allowed(url, user_agent)
    }
}

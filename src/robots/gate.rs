//! The ethical fetch gate
//!
//! Every outbound request for source content passes through here. The gate
//! enforces, per domain:
//! - robots.txt Allow/Disallow, with a TTL cache refreshed by at most one
//!   request at a time
//! - a minimum interval between requests (crawl-delay, configured floor,
//!   per-source rate limit, whichever is largest)
//! - bounded backoff on 429/503, honoring `Retry-After`; a server that asks
//!   for more than `max-delay-ms` gets no retry at all
//!
//! Other HTTP statuses and network failures are returned as-is; retrying
//! those is the retry coordinator's job.

use crate::config::{GateConfig, UnreachablePolicy, MAX_DELAY};
use crate::pool::ConnectionPool;
use crate::robots::backoff::{parse_retry_after, BackoffPolicy};
use crate::robots::cache::{PolicySource, RobotsCacheEntry};
use crate::robots::ParsedRobots;
use crate::url::{extract_domain, robots_url};
use crate::FetchError;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Per-request knobs supplied by the caller (usually from a source descriptor)
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Whole-request timeout; the connection pool default applies when unset
    pub timeout: Option<Duration>,
    /// Source-specific minimum interval between requests to one domain
    pub min_delay: Duration,
}

/// Proof that a URL passed the robots check and its crawl-delay slot
#[derive(Debug, Clone)]
pub struct Permit {
    pub domain: String,
    /// Effective delay that was applied for this domain
    pub delay: Duration,
    /// Time spent waiting for the domain to become eligible
    pub waited: Duration,
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL that was requested
    pub url: Url,
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Per-domain state; each domain has its own locks
#[derive(Default)]
struct DomainSlot {
    /// Held across a robots.txt refresh, which makes the refresh single-flight
    robots: tokio::sync::Mutex<Option<Arc<RobotsCacheEntry>>>,
    /// Earliest instant the next request may start
    next_eligible: Mutex<Option<Instant>>,
}

impl DomainSlot {
    /// Claims the next request slot and returns how long to wait for it
    fn reserve(&self, delay: Duration) -> Duration {
        let mut next = self
            .next_eligible
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let start = match *next {
            Some(at) if at > now => at,
            _ => now,
        };
        *next = Some(start.checked_add(delay).unwrap_or(start));
        start - now
    }

    /// True when the slot holds nothing worth keeping at `now`
    ///
    /// A robots lock that is currently held counts as busy.
    fn is_idle(&self, now: Instant) -> bool {
        let robots_idle = match self.robots.try_lock() {
            Ok(cached) => cached.as_ref().map_or(true, |entry| entry.is_stale(now)),
            Err(_) => false,
        };
        let throttle_idle = self
            .next_eligible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(true, |at| at <= now);
        robots_idle && throttle_idle
    }

    /// Holds the domain back for `wait` from now
    fn defer_for(&self, wait: Duration) {
        if let Some(until) = Instant::now().checked_add(wait) {
            self.defer(until);
        }
    }

    /// Pushes the next eligible instant out to at least `until`
    fn defer(&self, until: Instant) {
        let mut next = self
            .next_eligible
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if next.map_or(true, |at| at < until) {
            *next = Some(until);
        }
    }
}

/// Robots-aware, rate-limited front door for HTTP fetches
pub struct EthicalFetchGate {
    connections: Arc<ConnectionPool>,
    config: GateConfig,
    backoff: BackoffPolicy,
    /// robots.txt product token
    user_agent: String,
    domains: Mutex<HashMap<String, Arc<DomainSlot>>>,
    robots_fetches: AtomicU64,
    cancel: CancellationToken,
}

impl EthicalFetchGate {
    pub fn new(
        connections: Arc<ConnectionPool>,
        config: GateConfig,
        user_agent: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        let backoff = BackoffPolicy::from_config(&config);
        Self {
            connections,
            config,
            backoff,
            user_agent: user_agent.into(),
            domains: Mutex::new(HashMap::new()),
            robots_fetches: AtomicU64::new(0),
            cancel,
        }
    }

    /// Number of robots.txt requests issued so far
    pub fn robots_fetch_count(&self) -> u64 {
        self.robots_fetches.load(Ordering::Relaxed)
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Checks robots.txt and waits for the domain's crawl-delay slot
    pub async fn authorize(&self, url: &Url) -> Result<Permit, FetchError> {
        self.authorize_with(url, &RequestOptions::default()).await
    }

    /// Like [`authorize`](Self::authorize), with caller-supplied options
    ///
    /// Returns [`FetchError::PolicyDenied`] when robots.txt disallows the
    /// path; that outcome is terminal for the URL.
    pub async fn authorize_with(
        &self,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<Permit, FetchError> {
        let domain = extract_domain(url).ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            message: "URL has no host".to_string(),
        })?;
        let slot = self.slot(&domain);

        let entry = self.policy_for(&slot, &domain, url, options).await?;
        if !entry.is_allowed(url.as_str(), &self.user_agent) {
            tracing::info!(domain = %domain, "URL {} disallowed by robots.txt", url);
            return Err(FetchError::PolicyDenied {
                url: url.to_string(),
            });
        }

        let delay = self.effective_delay(&entry, options);
        let waited = self.throttle(&slot, delay).await?;

        Ok(Permit {
            domain,
            delay,
            waited,
        })
    }

    /// Authorizes and fetches a URL
    ///
    /// 429 and 503 responses are retried up to `max_retries` times, waiting
    /// for `Retry-After` when present and for the backoff schedule otherwise.
    /// The wait also holds back every other request to the same domain. A
    /// `Retry-After` longer than `max-delay-ms` ends the request with
    /// [`FetchError::RateLimited`] rather than retrying before the server allows.
    pub async fn fetch(&self, url: &Url, options: &RequestOptions) -> Result<FetchedPage, FetchError> {
        let permit = self.authorize_with(url, options).await?;
        let slot = self.slot(&permit.domain);
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled);
            }

            let response = self.connections.get(url, options.timeout).await?;
            let status = response.status;

            if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
                if attempt >= self.config.max_retries {
                    tracing::warn!(
                        domain = %permit.domain,
                        "Giving up on {} after {} attempts (HTTP {})",
                        url,
                        attempt + 1,
                        status.as_u16()
                    );
                    return Err(FetchError::RateLimited {
                        url: url.to_string(),
                        status: status.as_u16(),
                        attempts: attempt + 1,
                    });
                }

                let retry_after = response
                    .headers
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| parse_retry_after(v, Utc::now()));
                let wait = match retry_after {
                    Some(wait) if wait > self.backoff.max => {
                        tracing::warn!(
                            domain = %permit.domain,
                            "HTTP {} from {} asks for {:?}, more than the {:?} limit; giving up",
                            status.as_u16(),
                            url,
                            wait,
                            self.backoff.max
                        );
                        slot.defer_for(wait.min(MAX_DELAY));
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                            status: status.as_u16(),
                            attempts: attempt + 1,
                        });
                    }
                    Some(wait) => wait,
                    None => self.backoff.delay(attempt),
                };

                tracing::warn!(
                    domain = %permit.domain,
                    "HTTP {} from {}, backing off for {:?} (retry {}/{})",
                    status.as_u16(),
                    url,
                    wait,
                    attempt + 1,
                    self.config.max_retries
                );

                slot.defer_for(wait);
                attempt += 1;
                self.throttle(&slot, permit.delay).await?;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let content_type = response.content_type();
            return Ok(FetchedPage {
                url: url.clone(),
                final_url: response.url,
                status: status.as_u16(),
                content_type,
                body: response.body,
            });
        }
    }

    /// Returns the cached policy for a domain, if one is present
    pub async fn cached_policy(&self, domain: &str) -> Option<Arc<RobotsCacheEntry>> {
        let slot = {
            let domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
            domains.get(domain).cloned()
        }?;
        let cached = slot.robots.lock().await;
        cached.clone()
    }

    /// Number of domains with per-domain state
    pub fn tracked_domains(&self) -> usize {
        self.domains
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops state for domains nobody is using
    ///
    /// A slot is removed when no caller holds it, its robots entry is absent
    /// or stale, and its next-eligible instant has passed. Returns how many
    /// slots were removed.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        let before = domains.len();
        domains.retain(|_, slot| Arc::strong_count(slot) > 1 || !slot.is_idle(now));
        before - domains.len()
    }

    fn slot(&self, domain: &str) -> Arc<DomainSlot> {
        let mut domains = self.domains.lock().unwrap_or_else(PoisonError::into_inner);
        domains
            .entry(domain.to_string())
            .or_insert_with(|| Arc::new(DomainSlot::default()))
            .clone()
    }

    /// Returns a fresh policy, refreshing it if absent or expired
    ///
    /// The domain's robots lock is held across the refresh, so concurrent
    /// callers for the same domain wait for that single request and then
    /// read its result. Other domains are unaffected.
    async fn policy_for(
        &self,
        slot: &DomainSlot,
        domain: &str,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<Arc<RobotsCacheEntry>, FetchError> {
        let mut cached = slot.robots.lock().await;

        if let Some(entry) = cached.as_ref() {
            if !entry.is_stale(Instant::now()) {
                return Ok(entry.clone());
            }
            tracing::debug!(domain = %domain, "robots.txt cache expired, refreshing");
        }

        let entry = Arc::new(self.fetch_robots(domain, url, options).await?);
        *cached = Some(entry.clone());
        Ok(entry)
    }

    async fn fetch_robots(
        &self,
        domain: &str,
        url: &Url,
        options: &RequestOptions,
    ) -> Result<RobotsCacheEntry, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let robots = robots_url(url).ok_or_else(|| FetchError::InvalidUrl {
            url: url.to_string(),
            message: "URL has no host".to_string(),
        })?;

        self.robots_fetches.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(domain = %domain, "Fetching {}", robots);

        let (policy, source) = match self.connections.get(&robots, options.timeout).await {
            Ok(response) if response.status.is_success() => (
                ParsedRobots::from_content(&response.body),
                PolicySource::Fetched,
            ),
            Ok(response)
                if response.status.is_client_error()
                    && response.status != StatusCode::TOO_MANY_REQUESTS =>
            {
                tracing::debug!(
                    domain = %domain,
                    "robots.txt returned HTTP {}, treating as unrestricted",
                    response.status.as_u16()
                );
                (ParsedRobots::allow_all(), PolicySource::Missing)
            }
            Ok(response) => {
                self.unreachable_policy(domain, &format!("HTTP {}", response.status.as_u16()))
            }
            Err(FetchError::PoolClosed) => return Err(FetchError::PoolClosed),
            Err(e) => self.unreachable_policy(domain, &e.to_string()),
        };

        Ok(RobotsCacheEntry::new(
            domain,
            policy,
            source,
            &self.user_agent,
            self.config.robots_ttl(),
        ))
    }

    fn unreachable_policy(&self, domain: &str, reason: &str) -> (ParsedRobots, PolicySource) {
        let policy = match self.config.robots_unreachable {
            UnreachablePolicy::Allow => ParsedRobots::allow_all(),
            UnreachablePolicy::Deny => ParsedRobots::deny_all(),
        };
        tracing::warn!(
            domain = %domain,
            "robots.txt unreachable ({}), applying {:?} policy",
            reason,
            self.config.robots_unreachable
        );
        (policy, PolicySource::Unreachable)
    }

    fn effective_delay(&self, entry: &RobotsCacheEntry, options: &RequestOptions) -> Duration {
        entry
            .crawl_delay
            .unwrap_or(Duration::ZERO)
            .max(self.config.min_crawl_delay())
            .max(options.min_delay)
    }

    /// Waits until the domain is eligible, then books the following slot
    async fn throttle(&self, slot: &DomainSlot, delay: Duration) -> Result<Duration, FetchError> {
        let wait = slot.reserve(delay);
        if !wait.is_zero() {
            tracing::trace!("Waiting {:?} for crawl-delay slot", wait);
            self.pause(wait).await?;
        }
        Ok(wait)
    }

    async fn pause(&self, wait: Duration) -> Result<(), FetchError> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
            _ = tokio::time::sleep(wait) => Ok(()),
        }
    }
}

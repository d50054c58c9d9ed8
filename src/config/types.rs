use serde::Deserialize;
use std::time::Duration;

/// Longest per-domain delay accepted from robots.txt, config or a source record
pub const MAX_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Converts fractional seconds to a [`Duration`] clamped to `0..=MAX_DELAY`
///
/// Negative and NaN inputs become zero. Values too large for a `Duration`
/// become `MAX_DELAY` instead of panicking.
pub fn bounded_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.max(0.0)).map_or(MAX_DELAY, |d| d.min(MAX_DELAY))
}

/// Main configuration structure for Sumi-Harvest
///
/// Every section except `[user-agent]` has defaults, so a minimal file only
/// needs to identify the harvester and list its sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub harvest: HarvestConfig,
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Declarative source records (`[[source]]` tables)
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceRecord>,
    /// Statically registered provider instances (`[[programmatic]]` tables)
    #[serde(default)]
    pub programmatic: Vec<ProgrammaticRecord>,
}

/// Run-level behaviour and worker pool sizing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct HarvestConfig {
    /// Number of top-level concurrent tasks
    pub workers: usize,

    /// Deepest level of nested submissions any task performs
    pub nesting_depth: usize,

    /// Articles requested from each source per run
    pub per_source_count: usize,

    /// How long a saturated submission waits before running on the caller
    pub submit_wait_ms: u64,

    /// Graceful drain limit when shutting the worker pool down
    pub shutdown_timeout_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            nesting_depth: 1,
            per_source_count: 10,
            submit_wait_ms: 250,
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl HarvestConfig {
    pub fn submit_wait(&self) -> Duration {
        Duration::from_millis(self.submit_wait_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the harvester, also the robots.txt product token
    pub crawler_name: String,

    /// Version of the harvester
    pub crawler_version: String,

    /// URL with information about the harvester
    pub contact_url: String,

    /// Email address for harvester-related contact
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the full header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Shared HTTP connection pool settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ConnectionConfig {
    /// Upper bound on simultaneously open requests
    pub max_connections: usize,

    pub connect_timeout_ms: u64,

    /// Default whole-request timeout when a source does not set its own
    pub request_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_connections: 20,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// What to do when robots.txt cannot be retrieved at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnreachablePolicy {
    /// Treat the site as having no restrictions
    Allow,
    /// Treat every path on the site as disallowed
    Deny,
}

/// Robots.txt, crawl-delay and 429/503 backoff settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GateConfig {
    /// How long a fetched robots.txt stays fresh
    pub robots_ttl_secs: u64,

    /// Floor applied to every per-domain delay, in seconds
    pub min_crawl_delay_secs: f64,

    /// 429/503 retries before giving up on a request
    pub max_retries: u32,

    pub initial_delay_ms: u64,
    pub backoff_base: f64,
    pub max_delay_ms: u64,

    /// Decision used when robots.txt is unreachable (network error or 5xx)
    pub robots_unreachable: UnreachablePolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            robots_ttl_secs: 15 * 60,
            min_crawl_delay_secs: 1.0,
            max_retries: 3,
            initial_delay_ms: 1_000,
            backoff_base: 2.0,
            max_delay_ms: 60_000,
            robots_unreachable: UnreachablePolicy::Allow,
        }
    }
}

impl GateConfig {
    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl_secs)
    }

    pub fn min_crawl_delay(&self) -> Duration {
        bounded_secs(self.min_crawl_delay_secs)
    }
}

/// Application-level retry and skip settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryConfig {
    /// Retries after the first attempt before a source is skipped
    pub max_retries: u32,

    /// Pause between attempts
    pub retry_delay_ms: u64,

    /// Retries per candidate when walking a URL fallback chain
    pub fallback_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 500,
            fallback_retries: 1,
        }
    }
}

impl RetryConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Performance monitor settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MonitorConfig {
    /// Path to the SQLite database holding metrics and run history
    pub database_path: String,

    /// Minimum success rate (percent) for a source to count as healthy
    pub health_threshold: f64,

    /// A source must have activity within this window to count as healthy
    pub activity_window_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_path: "./sumi-harvest.db".to_string(),
            health_threshold: 80.0,
            activity_window_secs: 24 * 60 * 60,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Directory that receives one markdown file per harvested article
    pub directory: Option<String>,
}

/// A declarative source record
///
/// Fields are optional at the TOML level so that an incomplete record is
/// reported by the catalog as a validation error instead of failing the load.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SourceRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub base_url: Option<String>,
    pub category: Option<String>,
    pub timeout_secs: Option<f64>,
    pub rate_limit_secs: Option<f64>,
    pub supports_comments: bool,
    /// CSS selector matching article links on the listing page
    pub article_selector: Option<String>,
    /// Regex that discovered article URLs must match
    pub url_pattern: Option<String>,
    /// Alternative listing pages tried when the base URL fails
    pub fallback_urls: Vec<String>,
}

/// A programmatic source instance
///
/// The remaining keys are passed to the provider factory, which may fill in
/// or override any of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProgrammaticRecord {
    /// Name of a factory registered in the provider registry
    pub provider: String,
    #[serde(flatten)]
    pub record: SourceRecord,
}

//! Sumi-Harvest: a polite concurrent content harvester
//!
//! This crate discovers pluggable news/RSS/HTML sources, fetches their articles
//! concurrently over one shared connection pool and one shared worker pool, and
//! respects robots.txt, crawl delays and 429/503 backoff while doing so.

pub mod config;
pub mod extract;
pub mod monitor;
pub mod orchestrator;
pub mod output;
pub mod pool;
pub mod retry;
pub mod robots;
pub mod source;
pub mod storage;
pub mod url;

use std::fmt;
use thiserror::Error;

/// Main error type for Sumi-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid value for environment variable {var}: {message}")]
    Env { var: String, message: String },
}

/// Per-descriptor validation failures, reported by the source catalog
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid base URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("unsupported URL scheme '{0}' (expected http or https)")]
    InvalidScheme(String),

    #[error("timeout must be greater than zero and at most one day, got {0}")]
    InvalidTimeout(f64),

    #[error("rate limit must be between zero and one day, got {0}")]
    InvalidRateLimit(f64),

    #[error("invalid CSS selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("invalid URL pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("duplicate source id '{0}'")]
    DuplicateId(String),

    #[error("no programmatic provider registered under '{0}'")]
    UnknownProvider(String),
}

/// Source catalog lookups and discovery failures
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Source not found: {0}")]
    NotFound(String),

    #[error("No valid sources survived discovery ({rejected} rejected)")]
    NoValidSources { rejected: usize },
}

/// Flavours of transient network failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientKind {
    Timeout,
    Connect,
    Other,
}

/// Errors produced while fetching a URL or running a source provider
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("URL disallowed by robots.txt: {url}")]
    PolicyDenied { url: String },

    #[error("Retries exhausted for {url} after {attempts} attempts (HTTP {status})")]
    RateLimited {
        url: String,
        status: u16,
        attempts: u32,
    },

    #[error("Transient network error for {url} ({kind:?}): {message}")]
    Transient {
        url: String,
        kind: TransientKind,
        message: String,
    },

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("Failed to read response body from {url}: {message}")]
    Body { url: String, message: String },

    #[error("Content extraction failed for {url}: {message}")]
    Extraction { url: String, message: String },

    #[error("Article discovery failed for source {source_id}: {message}")]
    Discovery { source_id: String, message: String },

    #[error("Source {source_id} skipped: {reason}")]
    Skipped { source_id: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Connection pool closed")]
    PoolClosed,
}

impl FetchError {
    /// Classifies an error for metrics and summaries
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PolicyDenied { .. } => ErrorKind::PolicyDenied,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Transient { .. } | Self::Body { .. } => ErrorKind::NetworkTransient,
            Self::Status { .. } => ErrorKind::Http,
            Self::InvalidUrl { .. } => ErrorKind::InvalidUrl,
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Discovery { .. } => ErrorKind::Discovery,
            Self::Skipped { .. } => ErrorKind::Skipped,
            Self::Cancelled | Self::PoolClosed => ErrorKind::Cancelled,
        }
    }

    /// Returns true if the application-level retry loop may try again
    ///
    /// Timeouts, connection failures and 5xx responses are transient. Robots
    /// denials, 4xx responses and exhausted 429/503 backoff are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transient { .. } | Self::Body { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Discovery { .. } => true,
            _ => false,
        }
    }

    /// Builds a transient or body error from a reqwest failure
    pub fn from_reqwest(url: &str, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransientKind::Timeout
        } else if err.is_connect() {
            TransientKind::Connect
        } else {
            TransientKind::Other
        };

        if err.is_body() || err.is_decode() {
            return Self::Body {
                url: url.to_string(),
                message: err.to_string(),
            };
        }

        Self::Transient {
            url: url.to_string(),
            kind,
            message: err.to_string(),
        }
    }
}

/// Flat classification of fetch failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    PolicyDenied,
    RateLimited,
    NetworkTransient,
    Http,
    InvalidUrl,
    Extraction,
    Discovery,
    Skipped,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyDenied => "policy_denied",
            Self::RateLimited => "rate_limited",
            Self::NetworkTransient => "network_transient",
            Self::Http => "http",
            Self::InvalidUrl => "invalid_url",
            Self::Extraction => "extraction",
            Self::Discovery => "discovery",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker pool lifecycle errors
#[derive(Debug, Clone, Error)]
pub enum PoolError {
    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Worker task {correlation_id} panicked: {message}")]
    TaskPanicked { correlation_id: u64, message: String },

    #[error("Shutdown drain timed out with {in_flight} tasks still running")]
    DrainTimeout { in_flight: usize },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Sumi-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

/// Result type alias for fetch operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use config::Config;
pub use monitor::PerformanceMonitor;
pub use orchestrator::{FetchOrchestrator, RunSummary};
pub use pool::{BoundedWorkerPool, ConnectionPool};
pub use retry::RetrySkipCoordinator;
pub use robots::EthicalFetchGate;
pub use source::{SourceCatalog, SourceDescriptor};

//! Shared HTTP connection pool
//!
//! One long-lived reqwest client reuses connections for every source. A
//! semaphore caps the number of requests in flight so the pool never opens
//! more than `max_connections` at once.

use crate::config::{ConnectionConfig, UserAgentConfig};
use crate::FetchError;
use once_cell::sync::OnceCell;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

static GLOBAL: OnceCell<Arc<ConnectionPool>> = OnceCell::new();

/// A fully read HTTP response
#[derive(Debug, Clone)]
pub struct PooledResponse {
    /// Final URL after redirects
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl PooledResponse {
    /// Returns the Content-Type header, if present
    pub fn content_type(&self) -> Option<String> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Bounded, connection-reusing HTTP client shared by all fetches
pub struct ConnectionPool {
    client: Client,
    permits: Arc<Semaphore>,
    max_connections: usize,
    request_timeout: Duration,
}

impl ConnectionPool {
    /// Builds a pool with its own client
    ///
    /// # Example
    ///
    /// ```no_run
    /// use sumi_harvest::config::{ConnectionConfig, UserAgentConfig};
    /// use sumi_harvest::pool::ConnectionPool;
    ///
    /// let user_agent = UserAgentConfig {
    ///     crawler_name: "SumiHarvest".to_string(),
    ///     crawler_version: "1.0".to_string(),
    ///     contact_url: "https://example.com/about".to_string(),
    ///     contact_email: "admin@example.com".to_string(),
    /// };
    ///
    /// let pool = ConnectionPool::new(&ConnectionConfig::default(), &user_agent).unwrap();
    /// assert_eq!(pool.max_connections(), 20);
    /// ```
    pub fn new(
        config: &ConnectionConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.header_value())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.max_connections)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            request_timeout: config.request_timeout(),
        })
    }

    /// Returns the process-wide pool, building it on first use
    ///
    /// Initialization is thread-safe and idempotent: concurrent first callers
    /// race to build a single instance and the first caller's settings win.
    pub fn global(
        config: &ConnectionConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Arc<Self>, reqwest::Error> {
        GLOBAL
            .get_or_try_init(|| Self::new(config, user_agent).map(Arc::new))
            .cloned()
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Connections currently free
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Issues a GET and reads the whole body while holding a connection slot
    ///
    /// `timeout` overrides the client default for this request. Network
    /// failures are classified into [`FetchError::Transient`]; HTTP status
    /// handling is left to the caller.
    pub async fn get(
        &self,
        url: &Url,
        timeout: Option<Duration>,
    ) -> Result<PooledResponse, FetchError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::PoolClosed)?;

        let response = self
            .client
            .get(url.clone())
            .timeout(timeout.unwrap_or(self.request_timeout))
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;

        let final_url = response.url().clone();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::from_reqwest(url.as_str(), &e))?;

        Ok(PooledResponse {
            url: final_url,
            status,
            headers,
            body,
        })
    }

    /// Stops handing out connections; requests already in flight complete
    ///
    /// Safe to call more than once.
    pub fn shutdown(&self) {
        if !self.permits.is_closed() {
            tracing::debug!("Closing connection pool");
            self.permits.close();
        }
    }
}

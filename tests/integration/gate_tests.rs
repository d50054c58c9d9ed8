//! Integration tests for the ethical fetch gate
//!
//! These tests use wiremock to serve robots.txt and pages and check caching,
//! denial, backoff and the unreachable-robots policy over real HTTP.

use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_harvest::config::{ConnectionConfig, GateConfig, UnreachablePolicy, UserAgentConfig};
use sumi_harvest::robots::RequestOptions;
use sumi_harvest::{ConnectionPool, EthicalFetchGate, FetchError};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn user_agent() -> UserAgentConfig {
    UserAgentConfig {
        crawler_name: "TestHarvester".to_string(),
        crawler_version: "1.0.0".to_string(),
        contact_url: "https://example.com/contact".to_string(),
        contact_email: "test@example.com".to_string(),
    }
}

fn gate_config() -> GateConfig {
    GateConfig {
        min_crawl_delay_secs: 0.0,
        initial_delay_ms: 10,
        max_delay_ms: 5_000,
        ..Default::default()
    }
}

fn create_gate(config: GateConfig) -> Arc<EthicalFetchGate> {
    let connections = ConnectionConfig {
        connect_timeout_ms: 1_000,
        request_timeout_ms: 5_000,
        ..Default::default()
    };
    let pool = Arc::new(ConnectionPool::new(&connections, &user_agent()).unwrap());
    Arc::new(EthicalFetchGate::new(
        pool,
        config,
        "TestHarvester",
        CancellationToken::new(),
    ))
}

fn page_url(server: &MockServer, page: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), page)).unwrap()
}

async fn mount_robots(server: &MockServer, body: &str, expected: u64) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(expected)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_concurrent_requests_fetch_robots_once() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /", 1).await;

    Mock::given(method("GET"))
        .and(path("/article"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<p>Hello</p>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let gate = create_gate(gate_config());
    let url = page_url(&server, "/article");

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let gate = Arc::clone(&gate);
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            gate.fetch(&url, &RequestOptions::default()).await
        }));
    }

    for task in tasks {
        let page = task.await.unwrap().unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.body, "<p>Hello</p>");
    }

    assert_eq!(gate.robots_fetch_count(), 1);
    // The robots mock's expect(1) is verified when the server drops
}

#[tokio::test]
async fn test_disallowed_path_is_denied() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nDisallow: /private/", 1).await;

    Mock::given(method("GET"))
        .and(path("/private/page"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let gate = create_gate(gate_config());
    let result = gate
        .fetch(&page_url(&server, "/private/page"), &RequestOptions::default())
        .await;

    assert!(matches!(result, Err(FetchError::PolicyDenied { .. })));
    assert!(!result.unwrap_err().is_retryable());

    // Public pages on the same site stay allowed, without a second robots fetch
    let permit = gate.authorize(&page_url(&server, "/public")).await.unwrap();
    assert_eq!(permit.delay, Duration::ZERO);
}

#[tokio::test]
async fn test_retry_after_is_honored() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /", 1).await;

    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ready"))
        .mount(&server)
        .await;

    let gate = create_gate(gate_config());
    let start = Instant::now();
    let page = gate
        .fetch(&page_url(&server, "/busy"), &RequestOptions::default())
        .await
        .unwrap();

    assert_eq!(page.body, "ready");
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn test_retry_after_beyond_limit_is_not_retried_early() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /", 1).await;

    Mock::given(method("GET"))
        .and(path("/busy"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
        .expect(1)
        .mount(&server)
        .await;

    let gate = create_gate(GateConfig {
        max_delay_ms: 500,
        ..gate_config()
    });
    let start = Instant::now();
    let result = gate
        .fetch(&page_url(&server, "/busy"), &RequestOptions::default())
        .await;

    // No second request inside the server's window: the gate gives up instead
    assert!(matches!(
        result,
        Err(FetchError::RateLimited {
            status: 429,
            attempts: 1,
            ..
        })
    ));
    assert!(start.elapsed() < Duration::from_secs(3));

    // The domain itself stays held back until Retry-After has passed
    let permit = gate.authorize(&page_url(&server, "/other")).await.unwrap();
    assert!(permit.waited >= Duration::from_millis(2500));
    assert!(start.elapsed() >= Duration::from_millis(2900));
}

#[tokio::test]
async fn test_persistent_rate_limit_is_exhausted() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /", 1).await;

    Mock::given(method("GET"))
        .and(path("/overloaded"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let gate = create_gate(GateConfig {
        max_retries: 2,
        ..gate_config()
    });
    let result = gate
        .fetch(&page_url(&server, "/overloaded"), &RequestOptions::default())
        .await;

    assert!(matches!(
        result,
        Err(FetchError::RateLimited {
            status: 503,
            attempts: 3,
            ..
        })
    ));
}

#[tokio::test]
async fn test_missing_robots_allows_everything() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let gate = create_gate(GateConfig {
        robots_unreachable: UnreachablePolicy::Deny,
        ..gate_config()
    });

    assert!(gate.authorize(&page_url(&server, "/anything")).await.is_ok());
}

#[tokio::test]
async fn test_unreachable_robots_follows_policy() {
    // Nothing listens on this port once the listener is dropped
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let url = Url::parse(&format!("http://127.0.0.1:{}/article", port)).unwrap();

    let allow = create_gate(GateConfig {
        robots_unreachable: UnreachablePolicy::Allow,
        ..gate_config()
    });
    assert!(allow.authorize(&url).await.is_ok());

    let deny = create_gate(GateConfig {
        robots_unreachable: UnreachablePolicy::Deny,
        ..gate_config()
    });
    let result = deny.authorize(&url).await;
    assert!(matches!(result, Err(FetchError::PolicyDenied { .. })));
}

#[tokio::test]
async fn test_server_error_robots_counts_as_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let deny = create_gate(GateConfig {
        robots_unreachable: UnreachablePolicy::Deny,
        ..gate_config()
    });
    let result = deny.authorize(&page_url(&server, "/article")).await;
    assert!(matches!(result, Err(FetchError::PolicyDenied { .. })));
}

#[tokio::test]
async fn test_crawl_delay_spaces_requests() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nCrawl-delay: 1\nAllow: /", 1).await;

    let gate = create_gate(gate_config());
    let start = Instant::now();
    gate.authorize(&page_url(&server, "/a")).await.unwrap();
    let second = gate.authorize(&page_url(&server, "/b")).await.unwrap();

    assert_eq!(second.delay, Duration::from_secs(1));
    assert!(start.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn test_cancelled_gate_stops_before_request() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /", 0).await;

    let gate = create_gate(gate_config());
    gate.cancel_token().cancel();

    let result = gate
        .fetch(&page_url(&server, "/article"), &RequestOptions::default())
        .await;
    assert!(matches!(result, Err(FetchError::Cancelled)));
}

#[tokio::test]
async fn test_idle_domains_are_pruned() {
    let server = MockServer::start().await;
    mount_robots(&server, "User-agent: *\nAllow: /", 1).await;

    let gate = create_gate(GateConfig {
        robots_ttl_secs: 0,
        ..gate_config()
    });
    gate.authorize(&page_url(&server, "/a")).await.unwrap();
    assert_eq!(gate.tracked_domains(), 1);

    assert_eq!(gate.prune_idle(), 1);
    assert_eq!(gate.tracked_domains(), 0);
    assert!(gate.cached_policy(&server.address().to_string()).await.is_none());
}

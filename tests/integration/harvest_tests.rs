//! Integration tests for full harvest runs
//!
//! These tests use wiremock to serve listing pages, feeds and articles, and
//! drive the catalog, gate, coordinator, pools and monitor together.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sumi_harvest::config::{parse_config, Config, MonitorConfig, RetryConfig};
use sumi_harvest::output::MarkdownWriter;
use sumi_harvest::source::ProviderRegistry;
use sumi_harvest::storage::RunStatus;
use sumi_harvest::{
    BoundedWorkerPool, ConnectionPool, FetchError, FetchOrchestrator, PerformanceMonitor,
    RetrySkipCoordinator, SourceCatalog, TransientKind,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

const USER_AGENT: &str = r#"
[user-agent]
crawler-name = "TestHarvester"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"
"#;

fn config_with(body: &str) -> Config {
    parse_config(&format!("{}\n{}", USER_AGENT, body)).unwrap()
}

/// Builds an orchestrator with its own pools and an on-disk monitor
fn create_orchestrator(config: &Config, dir: &TempDir) -> FetchOrchestrator {
    let catalog = Arc::new(SourceCatalog::from_config(
        config,
        ProviderRegistry::with_builtins(),
    ));
    catalog.discover();

    let connections =
        Arc::new(ConnectionPool::new(&config.connection, &config.user_agent).unwrap());
    let workers = Arc::new(BoundedWorkerPool::from_config(&config.harvest));
    let monitor = Arc::new(PerformanceMonitor::open(&MonitorConfig {
        database_path: dir.path().join("metrics.db").display().to_string(),
        ..config.monitor.clone()
    }));

    FetchOrchestrator::from_config(config, catalog, connections, workers, monitor)
        .with_config_hash("test-hash")
}

async fn mount_robots(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nAllow: /"))
        .mount(server)
        .await;
}

/// Serves a listing page at `/` linking to `/story/0` .. `/story/{count-1}`
async fn mount_listing(server: &MockServer, count: usize) {
    let links: String = (0..count)
        .map(|i| format!(r#"<li><a href="/story/{}">Story {}</a></li>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body><ul>{}</ul></body></html>", links))
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

fn article_response() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(
            "<html><head><title>A Story</title></head><body>\
             <article><p>Something newsworthy happened today.</p></article></body></html>",
        )
        .insert_header("content-type", "text/html")
}

#[test]
fn test_discovery_partitions_valid_and_invalid_records() {
    let config = config_with(
        r#"
[[source]]
id = "alpha"
name = "Alpha"
base-url = "https://alpha.example.com/"

[[source]]
id = "beta"
name = "Beta"
base-url = "https://beta.example.com/"
category = "Tech"

[[source]]
id = "gamma"
name = "Gamma"

[[source]]
id = "delta"
name = "Delta"
base-url = "https://delta.example.com/"

[[source]]
id = "epsilon"
name = "Epsilon"
base-url = "https://epsilon.example.com/"
category = "tech"
"#,
    );

    let catalog = SourceCatalog::from_config(&config, ProviderRegistry::with_builtins());
    let report = catalog.discover();

    assert_eq!(report.valid.len(), 4);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].source_id, "gamma");
    assert!(report.errors[0].error.to_string().contains("base-url"));

    assert!(catalog.get("gamma").is_err());
    assert_eq!(catalog.get("alpha").unwrap().name, "Alpha");
    assert_eq!(catalog.by_category("TECH").len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_source_is_skipped_while_healthy_source_completes() {
    let healthy = MockServer::start().await;
    mount_robots(&healthy).await;
    mount_listing(&healthy, 10).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/story/\d+$"))
        .respond_with(article_response())
        .mount(&healthy)
        .await;

    let failing = MockServer::start().await;
    mount_robots(&failing).await;
    mount_listing(&failing, 10).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/story/\d+$"))
        .respond_with(article_response().set_delay(Duration::from_secs(5)))
        .mount(&failing)
        .await;

    let config = config_with(&format!(
        r#"
[harvest]
workers = 4
per-source-count = 10

[gate]
min-crawl-delay-secs = 0.0

[retry]
max-retries = 1
retry-delay-ms = 10

[[source]]
id = "healthy"
name = "Healthy"
base-url = "{}/"
timeout-secs = 5.0

[[source]]
id = "failing"
name = "Failing"
base-url = "{}/"
timeout-secs = 0.2
"#,
        healthy.uri(),
        failing.uri()
    ));

    let dir = TempDir::new().unwrap();
    let orchestrator = create_orchestrator(&config, &dir);

    let start = Instant::now();
    let summary = orchestrator.run(&[], 10).await.unwrap();
    let elapsed = start.elapsed();

    let healthy_tally = summary.tally("healthy").unwrap();
    assert_eq!(healthy_tally.discovered, 10);
    assert_eq!(healthy_tally.succeeded, 10);

    let failing_tally = summary.tally("failing").unwrap();
    assert_eq!(failing_tally.discovered, 10);
    assert_eq!(failing_tally.skipped, 10);
    assert_eq!(failing_tally.succeeded, 0);

    assert_eq!(summary.skipped_sources, vec!["failing".to_string()]);
    assert!(elapsed < Duration::from_secs(20), "run took {:?}", elapsed);

    // Outcomes were recorded and the run persisted
    let monitor = orchestrator.monitor();
    let metrics = monitor.get_metrics("healthy").unwrap();
    assert_eq!(metrics.content_success, 10);
    assert_eq!(metrics.articles_discovered, 10);
    assert!(monitor.health_check("healthy"));
    assert!(!monitor.health_check("failing"));
    assert!(monitor.error_breakdown("failing").contains_key("skipped"));

    let run = monitor.latest_run().unwrap().unwrap();
    assert_eq!(Some(run.id), summary.run_id);
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.totals.succeeded, 10);
    assert_eq!(run.totals.skipped, 10);
}

#[tokio::test]
async fn test_feed_items_fall_back_to_permalink() {
    let server = MockServer::start().await;
    mount_robots(&server).await;

    let feed = format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Wire</title><link>{uri}/</link><description>Wire feed</description>
<item><title>Moved</title><link>{uri}/old/1</link><guid isPermaLink="true">{uri}/story/1</guid></item>
<item><title>Direct</title><link>{uri}/story/2</link></item>
</channel></rss>"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(feed)
                .insert_header("content-type", "application/rss+xml"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/old/1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/story/\d+$"))
        .respond_with(article_response())
        .mount(&server)
        .await;

    let config = config_with(&format!(
        r#"
[gate]
min-crawl-delay-secs = 0.0

[retry]
retry-delay-ms = 10
fallback-retries = 0

[[programmatic]]
provider = "rss"
id = "wire"
name = "Wire"
base-url = "{}/feed.xml"
"#,
        server.uri()
    ));

    let dir = TempDir::new().unwrap();
    let orchestrator = create_orchestrator(&config, &dir)
        .with_writer(Arc::new(MarkdownWriter::new(dir.path().join("articles"))));

    let summary = orchestrator.run(&["wire".to_string()], 5).await.unwrap();

    let wire = summary.tally("wire").unwrap();
    assert_eq!(wire.discovered, 2);
    assert_eq!(wire.succeeded, 2);
    assert!(summary.skipped_sources.is_empty());

    let written = std::fs::read_dir(dir.path().join("articles").join("wire"))
        .unwrap()
        .count();
    assert_eq!(written, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_listing_falls_back_when_base_times_out() {
    let server = MockServer::start().await;
    mount_robots(&server).await;

    // Base listing hangs past the source timeout: fallback-retries = 1 allows two tries
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .expect(2)
        .mount(&server)
        .await;

    let links: String = (0..3)
        .map(|i| format!(r#"<li><a href="/story/{}">Story {}</a></li>"#, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/mirror"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!("<html><body><ul>{}</ul></body></html>", links))
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/story/\d+$"))
        .respond_with(article_response())
        .mount(&server)
        .await;

    let config = config_with(&format!(
        r#"
[gate]
min-crawl-delay-secs = 0.0

[retry]
max-retries = 3
retry-delay-ms = 10
fallback-retries = 1

[[source]]
id = "mirrored"
name = "Mirrored"
base-url = "{uri}/"
timeout-secs = 0.3
fallback-urls = ["{uri}/mirror"]
"#,
        uri = server.uri()
    ));

    let dir = TempDir::new().unwrap();
    let orchestrator = create_orchestrator(&config, &dir);

    let start = Instant::now();
    let summary = orchestrator.run(&[], 3).await.unwrap();

    let tally = summary.tally("mirrored").unwrap();
    assert!(tally.error.is_none(), "unexpected error: {:?}", tally.error);
    assert_eq!(tally.discovered, 3);
    assert_eq!(tally.succeeded, 3);
    assert!(summary.skipped_sources.is_empty());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_all_listings_failing_skips_source() {
    let server = MockServer::start().await;
    mount_robots(&server).await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/(mirror)?$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = config_with(&format!(
        r#"
[gate]
min-crawl-delay-secs = 0.0

[retry]
retry-delay-ms = 1
fallback-retries = 0

[[source]]
id = "down"
name = "Down"
base-url = "{uri}/"
fallback-urls = ["{uri}/mirror"]
"#,
        uri = server.uri()
    ));

    let dir = TempDir::new().unwrap();
    let orchestrator = create_orchestrator(&config, &dir);
    let summary = orchestrator.run(&[], 3).await.unwrap();

    let tally = summary.tally("down").unwrap();
    assert_eq!(tally.discovered, 0);
    assert!(tally.error.as_deref().unwrap_or_default().contains("skipped"));
    assert_eq!(summary.skipped_sources, vec!["down".to_string()]);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[test]
fn test_reload_keeps_existing_readers_consistent() {
    let before = config_with(
        r#"
[[source]]
id = "alpha"
name = "Alpha v1"
base-url = "https://alpha.example.com/"

[[source]]
id = "beta"
name = "Beta"
base-url = "https://beta.example.com/"
"#,
    );
    let after = config_with(
        r#"
[[source]]
id = "alpha"
name = "Alpha v2"
base-url = "https://alpha.example.com/"
"#,
    );

    let catalog = Arc::new(SourceCatalog::from_config(
        &before,
        ProviderRegistry::with_builtins(),
    ));
    catalog.discover();

    let handle = catalog.handle("alpha").unwrap();
    let snapshot = catalog.snapshot();

    // Readers hammer the catalog while it flips between two configurations
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let inconsistent = Arc::new(AtomicUsize::new(0));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let catalog = Arc::clone(&catalog);
            let stop = Arc::clone(&stop);
            let inconsistent = Arc::clone(&inconsistent);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    let view = catalog.snapshot();
                    let alpha = view.get("alpha").map(|d| d.name.clone());
                    let consistent = match (view.len(), alpha.as_deref()) {
                        (2, Some("Alpha v1")) => view.get("beta").is_some(),
                        (1, Some("Alpha v2")) => view.get("beta").is_none(),
                        _ => false,
                    };
                    if !consistent {
                        inconsistent.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for i in 0..50 {
        if i % 2 == 0 {
            catalog.reload_from(&after);
        } else {
            catalog.reload_from(&before);
        }
    }
    catalog.reload_from(&after);

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(inconsistent.load(Ordering::Relaxed), 0);

    // Pre-reload references are untouched
    assert_eq!(handle.descriptor.name, "Alpha v1");
    assert!(!handle.is_current());
    assert_eq!(snapshot.len(), 2);
    assert!(snapshot.get("beta").is_some());

    // New lookups see the new snapshot
    assert_eq!(catalog.get("alpha").unwrap().name, "Alpha v2");
    assert!(catalog.get("beta").is_err());
    assert!(catalog.handle("alpha").unwrap().is_current());
}

#[tokio::test]
async fn test_retry_budget_bounds_invocations() {
    for max_retries in [0u32, 1, 3] {
        let coordinator = RetrySkipCoordinator::new(
            RetryConfig {
                max_retries,
                retry_delay_ms: 1,
                fallback_retries: 0,
            },
            CancellationToken::new(),
        );
        let calls = AtomicUsize::new(0);

        let counter = &calls;
        let result: Result<(), FetchError> = coordinator
            .execute("flaky", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(FetchError::Transient {
                    url: "https://flaky.example.com/".into(),
                    kind: TransientKind::Timeout,
                    message: "timed out".into(),
                })
            })
            .await;

        assert!(matches!(result, Err(FetchError::Skipped { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), max_retries as usize + 1);
        assert!(coordinator.ledger().is_skipped("flaky"));

        // Later calls for the skipped source never reach the operation
        let again: Result<(), FetchError> = coordinator
            .execute("flaky", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(again, Err(FetchError::Skipped { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), max_retries as usize + 1);

        coordinator.reset();
        assert!(!coordinator.ledger().is_skipped("flaky"));
    }
}

#[test]
fn test_success_rate_is_zero_without_requests() {
    let monitor = PerformanceMonitor::new(&MonitorConfig::default());
    monitor.record_article_discovery("quiet", 3);

    let metrics = monitor.get_metrics("quiet").unwrap();
    assert_eq!(metrics.total_requests, 0);
    assert_eq!(metrics.success_rate(), 0.0);
    assert!(!metrics.success_rate().is_nan());
    assert!(!monitor.health_check("quiet"));
}

#[test]
fn test_metrics_survive_restart() {
    let dir = TempDir::new().unwrap();
    let config = MonitorConfig {
        database_path: dir.path().join("metrics.db").display().to_string(),
        ..Default::default()
    };

    {
        let monitor = PerformanceMonitor::open(&config);
        let token = monitor.start_request("wire");
        monitor.end_request(token, true, None);
        monitor.record_content_fetch("wire", true);
        monitor.save().unwrap();
    }

    let reopened = PerformanceMonitor::open(&config);
    let metrics = reopened.get_metrics("wire").unwrap();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.successful_requests, 1);
    assert_eq!(metrics.content_success, 1);
    assert!(reopened.health_check("wire"));
}

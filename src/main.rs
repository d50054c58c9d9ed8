//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the Sumi-Harvest content harvester.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use sumi_harvest::config::{load_layered, Config, Overrides};
use sumi_harvest::extract::HtmlTextExtractor;
use sumi_harvest::output::{
    generate_markdown_summary, print_catalog_report, print_health_report, print_run_summary,
    MarkdownWriter, NullWriter, OutputWriter,
};
use sumi_harvest::source::ProviderRegistry;
use sumi_harvest::{
    BoundedWorkerPool, ConnectionPool, FetchOrchestrator, PerformanceMonitor, SourceCatalog,
};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: A polite concurrent content harvester
///
/// Sumi-Harvest pulls articles from configured news, RSS and HTML sources
/// while respecting robots.txt, crawl delays and rate limits. Failing
/// sources are skipped without holding up the rest of the run.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A polite concurrent content harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Only harvest these sources (repeatable)
    #[arg(short, long = "source", value_name = "ID")]
    sources: Vec<String>,

    /// Articles to fetch per source
    #[arg(short = 'n', long, value_name = "N")]
    count: Option<usize>,

    /// Concurrent workers
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate sources and show what would be harvested without fetching
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show stored source metrics and health, then exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let overrides = Overrides {
        workers: cli.workers,
        per_source_count: cli.count,
        ..Default::default()
    };

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_layered(&cli.config, &overrides) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config);
    } else {
        handle_harvest(config, config_hash, &cli.sources).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles --dry-run: runs source discovery and prints the result
fn handle_dry_run(config: &Config) {
    println!("=== Sumi-Harvest Dry Run ===\n");

    println!("Harvest Configuration:");
    println!("  Workers: {}", config.harvest.workers);
    println!("  Nesting depth: {}", config.harvest.nesting_depth);
    println!("  Articles per source: {}", config.harvest.per_source_count);
    println!("  Max connections: {}", config.connection.max_connections);
    println!("  Min crawl delay: {}s", config.gate.min_crawl_delay_secs);
    println!(
        "  Retries: {} (retry delay {}ms)",
        config.retry.max_retries, config.retry.retry_delay_ms
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.monitor.database_path);
    match &config.output.directory {
        Some(dir) => println!("  Articles: {}", dir),
        None => println!("  Articles: (not written)"),
    }
    println!();

    let catalog = SourceCatalog::from_config(config, ProviderRegistry::with_builtins());
    let report = catalog.discover();
    print_catalog_report(&report);

    println!("Dry run complete. No requests were made.");
}

/// Handles --stats: prints persisted metrics and health
fn handle_stats(config: &Config) {
    let monitor = PerformanceMonitor::open(&config.monitor);

    match monitor.latest_run() {
        Ok(Some(run)) => {
            println!(
                "Latest run: #{} started {} ({})",
                run.id,
                run.started_at,
                run.status.to_db_string()
            );
            println!();
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Could not read run history: {}", e),
    }

    print_health_report(&monitor.all_metrics(), &monitor.health_report());
}

/// Handles the default mode: runs a harvest and reports the result
async fn handle_harvest(
    config: Config,
    config_hash: String,
    sources: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let connections = ConnectionPool::global(&config.connection, &config.user_agent)?;
    let workers = BoundedWorkerPool::global(&config.harvest);
    tracing::info!(
        "Worker pool: {} slots, connection pool: {} connections",
        workers.capacity(),
        connections.max_connections()
    );

    let catalog = Arc::new(SourceCatalog::from_config(
        &config,
        ProviderRegistry::with_builtins(),
    ));
    catalog.discover();

    let monitor = Arc::new(PerformanceMonitor::open(&config.monitor));

    let writer: Arc<dyn OutputWriter> = match &config.output.directory {
        Some(dir) => Arc::new(MarkdownWriter::new(dir)),
        None => Arc::new(NullWriter),
    };

    let orchestrator = FetchOrchestrator::from_config(
        &config,
        catalog,
        connections.clone(),
        workers.clone(),
        monitor.clone(),
    )
    .with_extractor(Arc::new(HtmlTextExtractor::default()))
    .with_writer(writer)
    .with_config_hash(config_hash);

    // Cancel cooperatively on Ctrl-C
    let cancel = orchestrator.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let result = orchestrator
        .run(sources, config.harvest.per_source_count)
        .await;

    if let Err(e) = workers.shutdown(config.harvest.shutdown_timeout()).await {
        tracing::warn!("Worker pool shutdown: {}", e);
    }
    connections.shutdown();

    let summary = result?;
    print_run_summary(&summary);

    if let Some(dir) = &config.output.directory {
        let path = Path::new(dir).join("run-summary.md");
        match generate_markdown_summary(&summary, &monitor.health_report(), &path) {
            Ok(()) => println!("\nSummary written to {}", path.display()),
            Err(e) => tracing::error!("Failed to write summary: {}", e),
        }
    }

    Ok(())
}

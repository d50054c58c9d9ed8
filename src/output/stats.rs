//! Console reports
//!
//! This module prints run summaries, per-source metrics and catalog
//! discovery results to stdout.

use crate::monitor::{HealthStatus, MetricsRecord};
use crate::orchestrator::RunSummary;
use crate::source::DiscoveryReport;

/// Prints a run summary to stdout in a formatted manner
///
/// # Arguments
///
/// * `summary` - The summary returned by the orchestrator
pub fn print_run_summary(summary: &RunSummary) {
    let totals = summary.totals();

    println!("=== Harvest Summary ===\n");

    println!("Overview:");
    if let Some(run_id) = summary.run_id {
        println!("  Run ID: {}", run_id);
    }
    println!("  Status: {}", summary.status().to_db_string());
    println!("  Duration: {:.1}s", summary.elapsed.as_secs_f64());
    println!("  Sources: {}", totals.sources);
    println!();

    println!("Articles:");
    println!("  Succeeded: {}", totals.succeeded);
    println!("  Skipped: {}", totals.skipped);
    println!("  Failed: {}", totals.failed);
    println!();

    println!("By Source:");
    for (id, tally) in &summary.sources {
        println!(
            "  {}: {} discovered, {} ok, {} skipped, {} failed",
            id, tally.discovered, tally.succeeded, tally.skipped, tally.failed
        );
    }
    println!();

    let failed = summary.failed_sources();
    if !failed.is_empty() {
        println!("Source Errors ({}):", failed.len());
        for (id, error) in failed {
            println!("  - {}: {}", id, error);
        }
        println!();
    }

    if !summary.skipped_sources.is_empty() {
        println!("Skipped Sources ({}):", summary.skipped_sources.len());
        for id in &summary.skipped_sources {
            println!("  - {}", id);
        }
        println!();
    }

    let attempted = totals.succeeded + totals.skipped + totals.failed;
    println!(
        "Success Rate: {:.1}% ({} / {} articles harvested)",
        percentage(totals.succeeded, attempted),
        totals.succeeded,
        attempted
    );
}

/// Prints accumulated per-source metrics with their health
pub fn print_health_report(metrics: &[MetricsRecord], health: &[HealthStatus]) {
    println!("=== Source Health ===\n");

    if metrics.is_empty() {
        println!("No metrics recorded yet.");
        return;
    }

    for record in metrics {
        let healthy = health
            .iter()
            .find(|h| h.source_id == record.source_id)
            .map(|h| h.healthy)
            .unwrap_or(false);

        println!(
            "{} [{}]",
            record.source_id,
            if healthy { "healthy" } else { "unhealthy" }
        );
        println!(
            "  Requests: {} ({:.1}% ok, avg {:.0} ms)",
            record.total_requests,
            record.success_rate(),
            record.avg_response_time_ms
        );
        println!(
            "  Articles: {} discovered, {} fetched, {} failed",
            record.articles_discovered, record.content_success, record.content_failure
        );
        if let Some(updated) = record.last_updated {
            println!("  Last activity: {}", updated.to_rfc3339());
        }

        if !record.errors.is_empty() {
            let mut errors: Vec<_> = record.errors.iter().collect();
            errors.sort_by(|a, b| b.1.cmp(a.1));
            println!("  Errors:");
            for (kind, count) in errors {
                println!("    {}: {}", kind, count);
            }
        }
        println!();
    }
}

/// Prints the sources that survived discovery and the ones that did not
pub fn print_catalog_report(report: &DiscoveryReport) {
    println!("=== Source Catalog (generation {}) ===\n", report.generation);

    println!("Valid Sources ({}):", report.valid.len());
    for source in &report.valid {
        println!(
            "  {} [{}] {} ({}) via {}",
            source.id,
            source.category,
            source.name,
            source.base_url,
            source.origin.as_str()
        );
    }
    println!();

    if !report.errors.is_empty() {
        println!("Rejected ({}):", report.errors.len());
        for error in &report.errors {
            println!("  - {}: {}", error.source_id, error.error);
        }
        println!();
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

//! End-to-end harvest runs
//!
//! A run resolves each requested source through the catalog, submits one task
//! per source to the shared worker pool, and from inside that task submits one
//! task per discovered article to the same pool. Every failure below the run
//! level ends up as a value in the summary.

use crate::config::Config;
use crate::extract::{ContentExtractor, HtmlTextExtractor};
use crate::monitor::PerformanceMonitor;
use crate::orchestrator::summary::{ArticleOutcome, OutcomeStatus, RunSummary, SourceTally};
use crate::output::{NullWriter, OutputWriter};
use crate::pool::{BoundedWorkerPool, ConnectionPool};
use crate::retry::{Fallback, RetrySkipCoordinator};
use crate::robots::{EthicalFetchGate, FetchedPage};
use crate::source::{ArticleRef, FetchContext, SourceCatalog, SourceHandle};
use crate::{CatalogError, ErrorKind, FetchError, HarvestError};
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Everything a source or article task needs, shared by reference count
#[derive(Clone)]
struct Shared {
    catalog: Arc<SourceCatalog>,
    ctx: FetchContext,
    coordinator: Arc<RetrySkipCoordinator>,
    monitor: Arc<PerformanceMonitor>,
    extractor: Arc<dyn ContentExtractor>,
    writer: Arc<dyn OutputWriter>,
}

/// Drives harvest runs over the catalog's sources
pub struct FetchOrchestrator {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    config_hash: String,
}

impl FetchOrchestrator {
    /// Creates an orchestrator from already-built components
    ///
    /// The run-level cancellation token is the gate's; `coordinator` should
    /// have been built with the same token.
    pub fn new(
        catalog: Arc<SourceCatalog>,
        gate: Arc<EthicalFetchGate>,
        workers: Arc<BoundedWorkerPool>,
        coordinator: Arc<RetrySkipCoordinator>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        let cancel = gate.cancel_token().clone();
        Self {
            shared: Arc::new(Shared {
                catalog,
                ctx: FetchContext { gate, workers },
                coordinator,
                monitor,
                extractor: Arc::new(HtmlTextExtractor::default()),
                writer: Arc::new(NullWriter),
            }),
            cancel,
            config_hash: String::new(),
        }
    }

    /// Builds the gate and coordinator from `config` around the given pools
    ///
    /// # Arguments
    ///
    /// * `config` - The merged configuration snapshot
    /// * `catalog` - A catalog that has already run discovery
    /// * `connections` - The shared HTTP connection pool
    /// * `workers` - The shared worker pool
    /// * `monitor` - Where request and content outcomes are recorded
    pub fn from_config(
        config: &Config,
        catalog: Arc<SourceCatalog>,
        connections: Arc<ConnectionPool>,
        workers: Arc<BoundedWorkerPool>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let gate = Arc::new(EthicalFetchGate::new(
            connections,
            config.gate.clone(),
            config.user_agent.crawler_name.clone(),
            cancel.clone(),
        ));
        let coordinator = Arc::new(RetrySkipCoordinator::new(config.retry.clone(), cancel));
        Self::new(catalog, gate, workers, coordinator, monitor)
    }

    /// Replaces the content extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn ContentExtractor>) -> Self {
        Arc::make_mut(&mut self.shared).extractor = extractor;
        self
    }

    /// Replaces the article writer
    pub fn with_writer(mut self, writer: Arc<dyn OutputWriter>) -> Self {
        Arc::make_mut(&mut self.shared).writer = writer;
        self
    }

    /// Hash recorded with every run
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    pub fn catalog(&self) -> &Arc<SourceCatalog> {
        &self.shared.catalog
    }

    pub fn gate(&self) -> &Arc<EthicalFetchGate> {
        &self.shared.ctx.gate
    }

    pub fn coordinator(&self) -> &Arc<RetrySkipCoordinator> {
        &self.shared.coordinator
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.shared.monitor
    }

    /// Cancelling this token stops the run at the next safe point
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Harvests up to `per_source_count` articles from each source
    ///
    /// An empty `source_ids` means every source in the catalog. Unknown ids
    /// are reported in the summary and do not stop the run. The only hard
    /// error is a catalog with no valid sources.
    ///
    /// # Arguments
    ///
    /// * `source_ids` - Sources to harvest, or empty for all
    /// * `per_source_count` - Maximum articles to fetch per source
    pub async fn run(
        &self,
        source_ids: &[String],
        per_source_count: usize,
    ) -> Result<RunSummary, HarvestError> {
        let snapshot = self.shared.catalog.snapshot();
        if snapshot.is_empty() {
            return Err(CatalogError::NoValidSources {
                rejected: snapshot.errors().len(),
            }
            .into());
        }

        let started_at = Utc::now();
        let clock = Instant::now();
        self.shared.coordinator.reset();
        let pruned = self.shared.ctx.gate.prune_idle();
        if pruned > 0 {
            tracing::debug!("Dropped state for {} idle domains", pruned);
        }

        let run_id = match self.shared.monitor.start_run(&self.config_hash) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("Failed to record run start: {}", e);
                None
            }
        };

        let ids: Vec<String> = if source_ids.is_empty() {
            snapshot.descriptors().iter().map(|d| d.id.clone()).collect()
        } else {
            let mut seen = HashSet::new();
            source_ids
                .iter()
                .filter(|id| seen.insert(id.as_str()))
                .cloned()
                .collect()
        };

        tracing::info!(
            run_id = ?run_id,
            sources = ids.len(),
            per_source_count,
            "Starting harvest run"
        );

        let mut sources = BTreeMap::new();
        let mut pending = Vec::with_capacity(ids.len());

        for id in ids {
            let handle = match self.shared.catalog.handle(&id) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::warn!("Skipping source {}: {}", id, e);
                    sources.insert(id, source_error(e.to_string()));
                    continue;
                }
            };

            let task = harvest_source(Arc::clone(&self.shared), handle, per_source_count);
            match self.shared.ctx.workers.submit(task).await {
                Ok(task) => pending.push((id, task)),
                Err(e) => {
                    tracing::warn!("Could not schedule source {}: {}", id, e);
                    sources.insert(id, source_error(e.to_string()));
                }
            }
        }

        for (id, task) in pending {
            let tally = match task.join().await {
                Ok(tally) => tally,
                Err(e) => {
                    tracing::error!("Source task for {} failed: {}", id, e);
                    source_error(e.to_string())
                }
            };
            sources.insert(id, tally);
        }

        let summary = RunSummary {
            run_id,
            config_hash: self.config_hash.clone(),
            started_at,
            elapsed: clock.elapsed(),
            sources,
            skipped_sources: self.shared.coordinator.ledger().skipped_sources(),
            cancelled: self.cancel.is_cancelled(),
        };

        if let Err(e) = self.shared.monitor.save() {
            tracing::warn!("Failed to save metrics: {}", e);
        }
        if let Some(id) = run_id {
            if let Err(e) = self
                .shared
                .monitor
                .finish_run(id, summary.status(), &summary.totals())
            {
                tracing::warn!("Failed to record run completion: {}", e);
            }
        }

        let totals = summary.totals();
        tracing::info!(
            succeeded = totals.succeeded,
            skipped = totals.skipped,
            failed = totals.failed,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Harvest run finished"
        );

        Ok(summary)
    }
}

fn source_error(message: String) -> SourceTally {
    SourceTally {
        error: Some(message),
        ..Default::default()
    }
}

/// Discovers a source's articles and fans them out to the worker pool
async fn harvest_source(shared: Arc<Shared>, handle: SourceHandle, count: usize) -> SourceTally {
    let source = Arc::clone(&handle.descriptor);
    let mut tally = SourceTally::default();

    let token = shared.monitor.start_request(&source.id);
    let discovered = discover_articles(&shared, &handle, count).await;

    let mut articles = match discovered {
        Ok(articles) => {
            shared.monitor.end_request(token, true, None);
            articles
        }
        Err(e) => {
            shared.monitor.end_request(token, false, Some(e.kind()));
            tracing::warn!("Discovery failed for {}: {}", source.id, e);
            tally.error = Some(e.to_string());
            return tally;
        }
    };
    articles.truncate(count);

    tally.discovered = articles.len();
    shared
        .monitor
        .record_article_discovery(&source.id, articles.len());
    tracing::debug!(
        "Discovered {} articles for {} via {}",
        articles.len(),
        source.id,
        handle.provider.kind()
    );

    if !handle.is_current() {
        tracing::debug!(
            "Catalog reloaded while {} was running, finishing on generation {}",
            source.id,
            handle.generation()
        );
    }

    // Submitted in discovery order; completion order is not preserved
    let mut pending = Vec::with_capacity(articles.len());
    for article in articles {
        let url = article.url.clone();
        let task = harvest_article(Arc::clone(&shared), handle.clone(), article);
        match shared.ctx.workers.submit(task).await {
            Ok(task) => pending.push((url, task)),
            Err(e) => tally.record(&failed(&source.id, url, e.to_string(), None)),
        }
    }

    for (url, task) in pending {
        let outcome = match task.join().await {
            Ok(outcome) => outcome,
            Err(e) => failed(&source.id, url, e.to_string(), None),
        };
        tally.record(&outcome);
    }

    tracing::info!(
        "Source {}: {} succeeded, {} skipped, {} failed",
        source.id,
        tally.succeeded,
        tally.skipped,
        tally.failed
    );
    tally
}

/// Runs discovery through the coordinator, walking fallback listings when the source has any
async fn discover_articles(
    shared: &Shared,
    handle: &SourceHandle,
    count: usize,
) -> Result<Vec<ArticleRef>, FetchError> {
    let source = handle.descriptor.as_ref();
    let provider = &handle.provider;
    let ctx = &shared.ctx;

    if source.fallback_urls.is_empty() {
        return shared
            .coordinator
            .execute(&source.id, || provider.discover(ctx, source, count))
            .await;
    }

    let result = shared
        .coordinator
        .execute_with_url_fallbacks(&source.id, &source.listing_urls(), |listing| async move {
            provider.discover_at(ctx, source, &listing, count).await
        })
        .await?;

    match result {
        Fallback::Success { value, url } => {
            if url != source.base_url {
                tracing::info!("Discovered {} via fallback listing {}", source.id, url);
            }
            Ok(value)
        }
        Fallback::Skipped { reason } => Err(FetchError::Skipped {
            source_id: source.id.clone(),
            reason,
        }),
    }
}

/// Fetches, extracts and writes one article
async fn harvest_article(
    shared: Arc<Shared>,
    handle: SourceHandle,
    article: ArticleRef,
) -> ArticleOutcome {
    let source = handle.descriptor.as_ref();

    if let Some(entry) = shared.coordinator.ledger().get(&source.id) {
        return ArticleOutcome {
            source_id: source.id.clone(),
            url: article.url,
            status: OutcomeStatus::Skipped,
            reason: Some(entry.reason),
            error_kind: Some(ErrorKind::Skipped),
            fetched_from: None,
            output: None,
        };
    }

    let token = shared.monitor.start_request(&source.id);
    let fetched = fetch_article(&shared, &handle, &article).await;

    let (page, fetched_from) = match fetched {
        Ok(fetched) => {
            shared.monitor.end_request(token, true, None);
            fetched
        }
        Err(e) => {
            shared.monitor.end_request(token, false, Some(e.kind()));
            shared.monitor.record_content_fetch(&source.id, false);
            tracing::debug!("Fetch failed for {}: {}", article.url, e);
            return from_error(&source.id, article.url, &e);
        }
    };

    let content = match shared.extractor.extract(&page) {
        Ok(content) => content,
        Err(e) => {
            shared.monitor.record_content_fetch(&source.id, false);
            return failed(
                &source.id,
                article.url,
                format!("{:#}", e),
                Some(ErrorKind::Extraction),
            );
        }
    };

    let output = match shared.writer.write_article(source, &article, &content) {
        Ok(path) => path,
        Err(e) => {
            shared.monitor.record_content_fetch(&source.id, false);
            tracing::warn!("Failed to write {}: {}", article.url, e);
            return failed(&source.id, article.url, e.to_string(), None);
        }
    };

    shared.monitor.record_content_fetch(&source.id, true);
    ArticleOutcome {
        source_id: source.id.clone(),
        url: article.url,
        status: OutcomeStatus::Succeeded,
        reason: None,
        error_kind: None,
        fetched_from,
        output,
    }
}

/// Fetches through the coordinator, walking fallback URLs when the article has any
async fn fetch_article(
    shared: &Shared,
    handle: &SourceHandle,
    article: &ArticleRef,
) -> Result<(FetchedPage, Option<Url>), FetchError> {
    let source = handle.descriptor.as_ref();
    let provider = &handle.provider;
    let ctx = &shared.ctx;

    if article.fallback_urls.is_empty() {
        return shared
            .coordinator
            .execute(&source.id, || provider.fetch_content(ctx, source, article))
            .await
            .map(|page| (page, None));
    }

    let result = shared
        .coordinator
        .execute_with_url_fallbacks(&source.id, &article.candidates(), |url| {
            let candidate = article.with_url(url);
            async move { provider.fetch_content(ctx, source, &candidate).await }
        })
        .await?;

    match result {
        Fallback::Success { value, url } => {
            let fetched_from = (url != article.url).then_some(url);
            Ok((value, fetched_from))
        }
        Fallback::Skipped { reason } => Err(FetchError::Skipped {
            source_id: source.id.clone(),
            reason,
        }),
    }
}

fn from_error(source_id: &str, url: Url, error: &FetchError) -> ArticleOutcome {
    let status = match error {
        FetchError::Skipped { .. } => OutcomeStatus::Skipped,
        _ => OutcomeStatus::Failed,
    };
    ArticleOutcome {
        source_id: source_id.to_string(),
        url,
        status,
        reason: Some(error.to_string()),
        error_kind: Some(error.kind()),
        fetched_from: None,
        output: None,
    }
}

fn failed(source_id: &str, url: Url, reason: String, kind: Option<ErrorKind>) -> ArticleOutcome {
    ArticleOutcome {
        source_id: source_id.to_string(),
        url,
        status: OutcomeStatus::Failed,
        reason: Some(reason),
        error_kind: kind,
        fetched_from: None,
        output: None,
    }
}

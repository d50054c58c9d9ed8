//! Provider abstraction and the programmatic provider registry

use crate::config::SourceRecord;
use crate::pool::BoundedWorkerPool;
use crate::robots::{EthicalFetchGate, FetchedPage};
use crate::source::descriptor::{ArticleRef, SourceDescriptor};
use crate::source::feed::FeedProvider;
use crate::{FetchError, ValidationError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Shared resources handed to providers
///
/// Every request a provider makes goes through `gate`; nested work may be
/// submitted to `workers`.
#[derive(Clone)]
pub struct FetchContext {
    pub gate: Arc<EthicalFetchGate>,
    pub workers: Arc<BoundedWorkerPool>,
}

/// A pluggable content source
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Short label for logs
    fn kind(&self) -> &'static str;

    /// Finds up to `count` articles on one listing page
    ///
    /// `listing` is the source's base URL or one of its fallback listings.
    /// Walking between them is left to the retry coordinator.
    async fn discover_at(
        &self,
        ctx: &FetchContext,
        source: &SourceDescriptor,
        listing: &Url,
        count: usize,
    ) -> Result<Vec<ArticleRef>, FetchError>;

    /// Finds up to `count` articles from the source's base URL
    async fn discover(
        &self,
        ctx: &FetchContext,
        source: &SourceDescriptor,
        count: usize,
    ) -> Result<Vec<ArticleRef>, FetchError> {
        self.discover_at(ctx, source, &source.base_url, count).await
    }

    /// Fetches the raw content of one article
    async fn fetch_content(
        &self,
        ctx: &FetchContext,
        source: &SourceDescriptor,
        article: &ArticleRef,
    ) -> Result<FetchedPage, FetchError> {
        ctx.gate.fetch(&article.url, &source.request_options()).await
    }
}

/// What a provider factory produces: a completed record plus the provider
pub struct ProviderInstance {
    pub record: SourceRecord,
    pub provider: Arc<dyn SourceProvider>,
}

/// Builds a provider instance from the `[[programmatic]]` record
pub type ProviderFactory = Arc<dyn Fn(&SourceRecord) -> ProviderInstance + Send + Sync>;

/// Name-to-factory table for programmatic sources
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in providers (`rss`)
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("rss", |record: &SourceRecord| ProviderInstance {
            record: record.clone(),
            provider: Arc::new(FeedProvider),
        });
        registry
    }

    /// Registers a factory, replacing any previous one with the same name
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&SourceRecord) -> ProviderInstance + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs the factory registered under `name`
    pub fn instantiate(
        &self,
        name: &str,
        record: &SourceRecord,
    ) -> Result<ProviderInstance, ValidationError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ValidationError::UnknownProvider(name.to_string()))?;
        Ok(factory(record))
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

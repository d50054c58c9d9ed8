//! RSS feed provider, registered as `rss`
//!
//! The source's base URL is the feed itself, with any fallback URLs as mirror
//! feeds. Each item's `<link>` becomes an article; a permalink `<guid>` that
//! differs from it is kept as a fallback.

use crate::source::descriptor::{ArticleRef, SourceDescriptor};
use crate::source::provider::{FetchContext, SourceProvider};
use crate::url::canonicalize_article_url;
use crate::FetchError;
use async_trait::async_trait;
use std::collections::HashSet;
use url::Url;

pub struct FeedProvider;

impl FeedProvider {
    /// Turns a parsed channel into article references
    ///
    /// Pure function so tests can exercise it without the network.
    pub fn parse_channel(channel: &rss::Channel, source_id: &str) -> Vec<ArticleRef> {
        let mut seen = HashSet::new();

        channel
            .items()
            .iter()
            .filter_map(|item| {
                let permalink = item
                    .guid()
                    .filter(|g| g.is_permalink())
                    .and_then(|g| parse_item_url(g.value()));

                let primary = item.link().and_then(parse_item_url);
                let (url, fallback) = match (primary, permalink) {
                    (Some(link), guid) => (link, guid),
                    (None, Some(guid)) => (guid, None),
                    (None, None) => return None,
                };

                if !seen.insert(url.clone()) {
                    return None;
                }

                let mut article = ArticleRef::new(source_id, url);
                if let Some(title) = item.title().map(str::trim).filter(|t| !t.is_empty()) {
                    article = article.with_title(title);
                }
                if let Some(fallback) = fallback {
                    article = article.with_fallback(fallback);
                }
                Some(article)
            })
            .collect()
    }
}

fn parse_item_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    match url.scheme() {
        "http" | "https" => Some(canonicalize_article_url(&url)),
        _ => None,
    }
}

#[async_trait]
impl SourceProvider for FeedProvider {
    fn kind(&self) -> &'static str {
        "rss"
    }

    async fn discover_at(
        &self,
        ctx: &FetchContext,
        source: &SourceDescriptor,
        feed_url: &Url,
        count: usize,
    ) -> Result<Vec<ArticleRef>, FetchError> {
        let page = ctx.gate.fetch(feed_url, &source.request_options()).await?;

        let channel = rss::Channel::read_from(page.body.as_bytes()).map_err(|e| {
            tracing::debug!("Feed {} for {} is not valid RSS: {}", feed_url, source.id, e);
            FetchError::Discovery {
                source_id: source.id.clone(),
                message: format!("invalid feed at {}: {}", feed_url, e),
            }
        })?;

        let mut articles = Self::parse_channel(&channel, &source.id);
        articles.truncate(count);
        Ok(articles)
    }
}

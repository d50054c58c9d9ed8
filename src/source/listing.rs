//! Declarative HTML listing provider
//!
//! Fetches one listing page through the gate and collects article links
//! matched by the source's CSS selector.

use crate::source::descriptor::{ArticleRef, SourceDescriptor};
use crate::source::provider::{FetchContext, SourceProvider};
use crate::source::validation::{compile_pattern, compile_selector, DEFAULT_ARTICLE_SELECTOR};
use crate::url::canonicalize_article_url;
use crate::{FetchError, ValidationError};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// A link found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingLink {
    pub url: Url,
    pub title: Option<String>,
}

/// Provider for `[[source]]` records
pub struct HtmlListingProvider {
    selector: Selector,
    pattern: Option<Regex>,
}

impl HtmlListingProvider {
    /// Compiles the descriptor's selector and URL pattern
    pub fn from_descriptor(source: &SourceDescriptor) -> Result<Self, ValidationError> {
        let selector = compile_selector(
            source
                .article_selector
                .as_deref()
                .unwrap_or(DEFAULT_ARTICLE_SELECTOR),
        )?;
        let pattern = source
            .url_pattern
            .as_deref()
            .map(compile_pattern)
            .transpose()?;
        Ok(Self { selector, pattern })
    }
}

#[async_trait]
impl SourceProvider for HtmlListingProvider {
    fn kind(&self) -> &'static str {
        "html-listing"
    }

    async fn discover_at(
        &self,
        ctx: &FetchContext,
        source: &SourceDescriptor,
        listing: &Url,
        count: usize,
    ) -> Result<Vec<ArticleRef>, FetchError> {
        let page = ctx.gate.fetch(listing, &source.request_options()).await?;

        let links = extract_article_links(
            &page.body,
            &page.final_url,
            &self.selector,
            self.pattern.as_ref(),
        );
        if links.is_empty() {
            tracing::debug!("Listing {} for {} had no article links", listing, source.id);
        }

        Ok(links
            .into_iter()
            .take(count)
            .map(|link| {
                let article = ArticleRef::new(source.id.clone(), link.url);
                match link.title {
                    Some(title) => article.with_title(title),
                    None => article,
                }
            })
            .collect())
    }
}

/// Extracts article links from a listing page
///
/// # Link Rules
///
/// - Each element matched by `selector` contributes its own `href`, or the
///   first `a[href]` inside it
/// - Links are resolved against `page_url`; only http(s) results survive
/// - Without a `pattern`, links must stay on the listing page's host; with
///   one, they must match it instead
/// - Links are canonicalized and de-duplicated in document order, and the
///   listing page itself is excluded
///
/// # Arguments
///
/// * `html` - The listing page body
/// * `page_url` - URL the body was served from, used for resolution
/// * `selector` - Compiled article selector
/// * `pattern` - Optional regex article URLs must match
pub fn extract_article_links(
    html: &str,
    page_url: &Url,
    selector: &Selector,
    pattern: Option<&Regex>,
) -> Vec<ListingLink> {
    let document = Html::parse_document(html);
    let page_key = canonicalize_article_url(page_url);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(selector) {
        let Some((href, anchor)) = element_href(element) else {
            continue;
        };
        let Some(url) = resolve_link(href, page_url) else {
            continue;
        };

        let keep = match pattern {
            Some(re) => re.is_match(url.as_str()),
            None => url.host_str() == page_url.host_str(),
        };
        if !keep {
            continue;
        }

        let url = canonicalize_article_url(&url);
        if url == page_key || !seen.insert(url.clone()) {
            continue;
        }

        let title = Some(anchor.text().collect::<Vec<_>>().join(" "))
            .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|t| !t.is_empty());

        links.push(ListingLink { url, title });
    }

    links
}

fn element_href(element: ElementRef<'_>) -> Option<(&str, ElementRef<'_>)> {
    if let Some(href) = element.value().attr("href") {
        return Some((href, element));
    }

    let anchor_selector = Selector::parse("a[href]").ok()?;
    element
        .select(&anchor_selector)
        .next()
        .and_then(|a| a.value().attr("href").map(|href| (href, a)))
}

/// Resolves a link href to an absolute http(s) URL
///
/// Returns None for empty and fragment-only links and for the
/// javascript:, mailto:, tel: and data: schemes.
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let url = base_url.join(href).ok()?;
    match url.scheme() {
        "http" | "https" => Some(url),
        _ => None,
    }
}

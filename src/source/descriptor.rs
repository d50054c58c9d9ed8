//! Validated source descriptors and discovered article references

use crate::robots::RequestOptions;
use std::time::Duration;
use url::Url;

/// Default request timeout when a record does not set one
pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default category for records that do not name one
pub const DEFAULT_CATEGORY: &str = "general";

/// Where a descriptor came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginKind {
    /// A `[[source]]` record handled by the generic HTML listing provider
    Declarative,
    /// An instance produced by a registered provider factory
    Programmatic,
}

impl OriginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Declarative => "declarative",
            Self::Programmatic => "programmatic",
        }
    }
}

/// Optional features a source supports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub supports_comments: bool,
}

/// Validated, immutable description of one content source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub id: String,
    pub name: String,
    pub base_url: Url,
    pub category: String,
    pub timeout: Duration,
    /// Minimum interval between requests to this source's domain
    pub min_delay: Duration,
    pub capabilities: Capabilities,
    pub origin: OriginKind,
    pub article_selector: Option<String>,
    pub url_pattern: Option<String>,
    /// Alternative listing pages, tried in order after `base_url`
    pub fallback_urls: Vec<Url>,
}

impl SourceDescriptor {
    /// Gate options derived from this descriptor
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            timeout: Some(self.timeout),
            min_delay: self.min_delay,
        }
    }

    /// Listing pages in the order they should be tried
    pub fn listing_urls(&self) -> Vec<Url> {
        std::iter::once(self.base_url.clone())
            .chain(self.fallback_urls.iter().cloned())
            .collect()
    }
}

/// A discovered article, not yet fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    pub source_id: String,
    pub url: Url,
    pub title: Option<String>,
    /// Alternative locations of the same article
    pub fallback_urls: Vec<Url>,
}

impl ArticleRef {
    pub fn new(source_id: impl Into<String>, url: Url) -> Self {
        Self {
            source_id: source_id.into(),
            url,
            title: None,
            fallback_urls: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_fallback(mut self, url: Url) -> Self {
        if url != self.url && !self.fallback_urls.contains(&url) {
            self.fallback_urls.push(url);
        }
        self
    }

    /// The primary URL followed by its fallbacks
    pub fn candidates(&self) -> Vec<Url> {
        std::iter::once(self.url.clone())
            .chain(self.fallback_urls.iter().cloned())
            .collect()
    }

    /// Copy of this reference pointing at another URL
    pub fn with_url(&self, url: Url) -> Self {
        Self {
            source_id: self.source_id.clone(),
            url,
            title: self.title.clone(),
            fallback_urls: Vec::new(),
        }
    }
}

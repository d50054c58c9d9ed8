//! Content sources
//!
//! A source is described by a validated [`SourceDescriptor`] and served by a
//! [`SourceProvider`]. Declarative `[[source]]` records use the generic HTML
//! listing provider; `[[programmatic]]` records name a factory in the
//! [`ProviderRegistry`]. The [`SourceCatalog`] owns the validated set.

mod catalog;
mod descriptor;
mod feed;
mod listing;
mod provider;
mod validation;

pub use catalog::{
    CatalogInputs, CatalogSnapshot, DiscoveryReport, SourceCatalog, SourceError, SourceHandle,
};
pub use descriptor::{
    ArticleRef, Capabilities, OriginKind, SourceDescriptor, DEFAULT_CATEGORY,
    DEFAULT_SOURCE_TIMEOUT,
};
pub use feed::FeedProvider;
pub use listing::{extract_article_links, HtmlListingProvider, ListingLink};
pub use provider::{FetchContext, ProviderFactory, ProviderInstance, ProviderRegistry, SourceProvider};
pub use validation::{compile_pattern, compile_selector, validate_record, DEFAULT_ARTICLE_SELECTOR};

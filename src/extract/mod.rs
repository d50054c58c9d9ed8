//! Content extraction
//!
//! Turns a fetched article page into a title and plain text. The harvester
//! only depends on the [`ContentExtractor`] trait; [`HtmlTextExtractor`] is the
//! default implementation.

mod html;

pub use html::HtmlTextExtractor;

use crate::robots::FetchedPage;
use url::Url;

/// Readable content of one article
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub url: Url,
    pub title: Option<String>,
    /// Paragraphs separated by blank lines
    pub text: String,
    pub word_count: usize,
}

/// Converts a fetched page into [`ExtractedContent`]
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, page: &FetchedPage) -> anyhow::Result<ExtractedContent>;
}

//! Output writer traits and types
//!
//! This module defines the trait interface for article writers and the
//! associated error type.

use crate::extract::ExtractedContent;
use crate::source::{ArticleRef, SourceDescriptor};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Persists harvested articles
///
/// Called from worker tasks, so implementations must be thread-safe.
pub trait OutputWriter: Send + Sync {
    /// Writes one article and returns where it went, if anywhere
    ///
    /// # Arguments
    ///
    /// * `source` - The source the article belongs to
    /// * `article` - The discovered article reference
    /// * `content` - Extracted title and text
    fn write_article(
        &self,
        source: &SourceDescriptor,
        article: &ArticleRef,
        content: &ExtractedContent,
    ) -> OutputResult<Option<PathBuf>>;
}

/// Writer that discards everything, used when no output directory is set
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWriter;

impl OutputWriter for NullWriter {
    fn write_article(
        &self,
        _source: &SourceDescriptor,
        _article: &ArticleRef,
        _content: &ExtractedContent,
    ) -> OutputResult<Option<PathBuf>> {
        Ok(None)
    }
}

//! Output module for harvested articles and run reports
//!
//! This module handles:
//! - Writing harvested articles to disk
//! - Generating markdown summaries of a run
//! - Printing run, health and catalog reports to the console

mod markdown;
pub mod stats;
mod traits;

pub use markdown::{format_article, format_markdown_summary, generate_markdown_summary, MarkdownWriter};
pub use stats::{print_catalog_report, print_health_report, print_run_summary};
pub use traits::{NullWriter, OutputError, OutputResult, OutputWriter};

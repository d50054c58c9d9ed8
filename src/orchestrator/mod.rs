//! Run orchestration
//!
//! [`FetchOrchestrator::run`] ties the catalog, the fetch gate, the retry
//! coordinator, the shared pools and the monitor together and returns a
//! [`RunSummary`].

#[allow(clippy::module_inception)]
mod orchestrator;
mod summary;

pub use orchestrator::FetchOrchestrator;
pub use summary::{ArticleOutcome, OutcomeStatus, RunSummary, SourceTally};

//! Application-level retry and skip coordination
//!
//! Transport-level 429/503 backoff lives in the fetch gate; this layer retries
//! transient failures a bounded number of times and remembers, for the rest of
//! the run, which sources have run out of budget.

mod attempt;
mod coordinator;
mod ledger;

pub use attempt::{AttemptState, FetchAttempt};
pub use coordinator::{Fallback, RetrySkipCoordinator};
pub use ledger::{SkipEntry, SkipLedger};

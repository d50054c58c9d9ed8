//! Robots.txt handling and the ethical fetch gate
//!
//! This module provides robots.txt parsing and caching, the backoff schedule
//! for overloaded servers, and [`EthicalFetchGate`], which every content
//! request goes through.

mod backoff;
mod cache;
mod gate;
mod parser;

pub use backoff::{parse_retry_after, BackoffPolicy};
pub use cache::{PolicySource, RobotsCacheEntry, DEFAULT_ROBOTS_TTL};
pub use gate::{EthicalFetchGate, FetchedPage, Permit, RequestOptions};
pub use parser::ParsedRobots;

//! Shared resource pools
//!
//! Both pools are process-wide: [`ConnectionPool::global`] and
//! [`BoundedWorkerPool::global`] lazily build one instance each. Components
//! receive them as `Arc` handles so tests can pass their own instances.

mod connection;
mod worker;

pub use connection::{ConnectionPool, PooledResponse};
pub use worker::{capacity_for, join_all, BoundedWorkerPool, TaskHandle, WorkerTask};

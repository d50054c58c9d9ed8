//! Per-source performance metrics and health checks

mod metrics;
#[allow(clippy::module_inception)]
mod monitor;

pub use metrics::MetricsRecord;
pub use monitor::{HealthStatus, PerformanceMonitor, RequestToken};

//! Bounded worker pool shared by every level of task nesting
//!
//! All I/O-bound fan-out (per-source tasks, per-article tasks, and anything
//! those tasks spawn for themselves) is submitted to the same pool. When the
//! pool is saturated a submission waits for a bounded time and then runs the
//! task on the submitting task instead. An outer task that submits inner work
//! therefore always makes progress, even when every slot is held by outer
//! tasks waiting on their children.

use crate::config::HarvestConfig;
use crate::PoolError;
use once_cell::sync::OnceCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

static GLOBAL: OnceCell<Arc<BoundedWorkerPool>> = OnceCell::new();

/// Slots needed so that `workers` outer tasks, each blocked on children up to
/// `nesting_depth` levels deep, never hold every slot at once
pub fn capacity_for(workers: usize, nesting_depth: usize) -> usize {
    workers.max(1) * (nesting_depth + 1)
}

/// A unit of work plus the id used to correlate it in logs and metrics
pub struct WorkerTask<T> {
    pub correlation_id: u64,
    future: Pin<Box<dyn Future<Output = T> + Send + 'static>>,
}

impl<T> WorkerTask<T> {
    pub fn new<F>(correlation_id: u64, future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            correlation_id,
            future: Box::pin(future),
        }
    }
}

enum HandleState<T> {
    Spawned(JoinHandle<T>),
    Completed(T),
}

/// Handle to a submitted task
pub struct TaskHandle<T> {
    correlation_id: u64,
    state: HandleState<T>,
}

impl<T> TaskHandle<T> {
    pub fn correlation_id(&self) -> u64 {
        self.correlation_id
    }

    /// True when the pool was saturated and the task ran on the submitter
    pub fn ran_on_caller(&self) -> bool {
        matches!(self.state, HandleState::Completed(_))
    }

    /// Waits for the task's output
    pub async fn join(self) -> Result<T, PoolError> {
        match self.state {
            HandleState::Completed(output) => Ok(output),
            HandleState::Spawned(handle) => handle.await.map_err(|e| PoolError::TaskPanicked {
                correlation_id: self.correlation_id,
                message: e.to_string(),
            }),
        }
    }
}

/// Decrements the in-flight count when a task finishes, however it finishes
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.drained.notify_waiters();
        }
    }
}

/// The process-wide bounded worker pool
pub struct BoundedWorkerPool {
    permits: Arc<Semaphore>,
    capacity: usize,
    submit_wait: Duration,
    closed: AtomicBool,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
    next_id: AtomicU64,
    caller_runs: AtomicU64,
}

impl BoundedWorkerPool {
    /// Creates a pool with `capacity` slots
    ///
    /// `submit_wait` bounds how long a submission blocks on a saturated pool
    /// before falling back to running on the caller.
    pub fn new(capacity: usize, submit_wait: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            submit_wait,
            closed: AtomicBool::new(false),
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
            next_id: AtomicU64::new(1),
            caller_runs: AtomicU64::new(0),
        }
    }

    /// Sizes the pool for the configured workers and nesting depth
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self::new(
            capacity_for(config.workers, config.nesting_depth),
            config.submit_wait(),
        )
    }

    /// Returns the process-wide pool, building it on first use
    ///
    /// Initialization is thread-safe and idempotent; the first caller's
    /// configuration decides the size.
    pub fn global(config: &HarvestConfig) -> Arc<Self> {
        GLOBAL
            .get_or_init(|| Arc::new(Self::from_config(config)))
            .clone()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently running, on pool slots or on callers
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Number of submissions that ran on the caller because the pool was full
    pub fn caller_runs(&self) -> u64 {
        self.caller_runs.load(Ordering::Relaxed)
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Allocates a correlation id for a task
    pub fn next_correlation_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Submits a future with a freshly allocated correlation id
    pub async fn submit<F, T>(&self, future: F) -> Result<TaskHandle<T>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let task = WorkerTask::new(self.next_correlation_id(), future);
        self.submit_task(task).await
    }

    /// Submits a task
    ///
    /// Waits up to `submit_wait` for a free slot. If none frees up, the task
    /// runs to completion on the caller before this returns. Submissions
    /// after [`shutdown`](Self::shutdown) are rejected.
    pub async fn submit_task<T>(&self, task: WorkerTask<T>) -> Result<TaskHandle<T>, PoolError>
    where
        T: Send + 'static,
    {
        if self.is_shut_down() {
            return Err(PoolError::ShutDown);
        }

        let correlation_id = task.correlation_id;
        let acquired =
            tokio::time::timeout(self.submit_wait, self.permits.clone().acquire_owned()).await;

        match acquired {
            Ok(Ok(permit)) => {
                if self.is_shut_down() {
                    return Err(PoolError::ShutDown);
                }
                let guard = self.track();
                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    let _guard = guard;
                    task.future.await
                });
                Ok(TaskHandle {
                    correlation_id,
                    state: HandleState::Spawned(handle),
                })
            }
            Ok(Err(_)) => Err(PoolError::ShutDown),
            Err(_) => {
                self.caller_runs.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    correlation_id,
                    capacity = self.capacity,
                    "Worker pool saturated, running task on caller"
                );
                let _guard = self.track();
                let output = task.future.await;
                Ok(TaskHandle {
                    correlation_id,
                    state: HandleState::Completed(output),
                })
            }
        }
    }

    fn track(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: self.in_flight.clone(),
            drained: self.drained.clone(),
        }
    }

    /// Rejects new submissions and waits for in-flight tasks to finish
    ///
    /// Returns [`PoolError::DrainTimeout`] if tasks are still running after
    /// `timeout`; they are not aborted. Calling this again after the first
    /// call returns immediately. Must not be awaited from inside a pool task,
    /// since that task would wait on itself until the timeout.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), PoolError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::info!(in_flight = self.in_flight(), "Shutting down worker pool");

        let drain = async {
            loop {
                let notified = self.drained.notified();
                if self.in_flight() == 0 {
                    break;
                }
                notified.await;
            }
        };

        let drained = tokio::time::timeout(timeout, drain).await;
        self.permits.close();

        match drained {
            Ok(()) => Ok(()),
            Err(_) => {
                let in_flight = self.in_flight();
                tracing::warn!(in_flight, "Worker pool drain timed out");
                Err(PoolError::DrainTimeout { in_flight })
            }
        }
    }
}

/// Joins handles in submission order
pub async fn join_all<T>(handles: Vec<TaskHandle<T>>) -> Vec<Result<T, PoolError>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.join().await);
    }
    results
}

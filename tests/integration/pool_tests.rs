//! Stress tests for the shared worker pool
//!
//! Outer tasks that submit inner tasks to the same pool and wait on them must
//! finish even when every slot is taken by an outer task.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sumi_harvest::pool::{capacity_for, join_all};
use sumi_harvest::BoundedWorkerPool;

/// Every outer task fans out `inner` children and waits for all of them
async fn nested_run(pool: Arc<BoundedWorkerPool>, outer: usize, inner: usize) -> usize {
    let completed = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();

    for _ in 0..outer {
        let pool_for_task = Arc::clone(&pool);
        let completed = Arc::clone(&completed);
        let handle = pool
            .submit(async move {
                let mut children = Vec::new();
                for _ in 0..inner {
                    let completed = Arc::clone(&completed);
                    let child = pool_for_task
                        .submit(async move {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            completed.fetch_add(1, Ordering::SeqCst);
                        })
                        .await
                        .unwrap();
                    children.push(child);
                }
                for result in join_all(children).await {
                    result.unwrap();
                }
            })
            .await
            .unwrap();
        handles.push(handle);
    }

    for result in join_all(handles).await {
        result.unwrap();
    }
    completed.load(Ordering::SeqCst)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_nested_submission_at_capacity_completes() {
    // Capacity for two outer tasks with one level of nesting, then far more outer
    // tasks than that so the pool is saturated by waiting parents
    let pool = Arc::new(BoundedWorkerPool::new(
        capacity_for(2, 1),
        Duration::from_millis(20),
    ));

    let completed = tokio::time::timeout(
        Duration::from_secs(30),
        nested_run(Arc::clone(&pool), 16, 8),
    )
    .await
    .expect("nested submissions deadlocked");

    assert_eq!(completed, 16 * 8);
    assert!(pool.caller_runs() > 0);
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_slot_pool_with_nesting() {
    // The worst case: one slot, held by the parent while its children run
    let pool = Arc::new(BoundedWorkerPool::new(1, Duration::from_millis(10)));

    let completed = tokio::time::timeout(
        Duration::from_secs(30),
        nested_run(Arc::clone(&pool), 4, 4),
    )
    .await
    .expect("nested submissions deadlocked");

    assert_eq!(completed, 16);
}

#[tokio::test]
async fn test_shutdown_after_nested_work_is_clean() {
    let pool = Arc::new(BoundedWorkerPool::new(4, Duration::from_millis(20)));
    nested_run(Arc::clone(&pool), 4, 2).await;

    pool.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(pool.is_shut_down());
    assert!(pool.submit(async {}).await.is_err());

    // Idempotent
    pool.shutdown(Duration::from_secs(1)).await.unwrap();
}

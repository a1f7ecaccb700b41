//! Bounded fan-out/fan-in worker pool.
//!
//! A fixed worker count drains a bounded task queue and writes results into a
//! single mutex-guarded accumulator. Used for segmented danmaku fetches where
//! the item count is data-dependent and the platform rate-limits concurrency.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

/// Run `handler` over `items` with at most `workers` concurrent executions.
/// `None` results are skipped. Accumulation order follows completion order.
pub async fn fan_out<T, R, F, Fut>(workers: usize, items: Vec<T>, handler: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<R>> + Send + 'static,
{
    let workers = workers.max(1);
    let (queue_tx, queue_rx) = mpsc::channel::<T>(workers * 2);
    let queue_rx = Arc::new(tokio::sync::Mutex::new(queue_rx));
    let results: Arc<Mutex<Vec<R>>> = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    let mut pool = JoinSet::new();
    for _ in 0..workers {
        let queue_rx = Arc::clone(&queue_rx);
        let results = Arc::clone(&results);
        let handler = Arc::clone(&handler);
        pool.spawn(async move {
            loop {
                let item = { queue_rx.lock().await.recv().await };
                let Some(item) = item else {
                    break;
                };
                if let Some(result) = handler(item).await {
                    results.lock().push(result);
                }
            }
        });
    }

    for item in items {
        if queue_tx.send(item).await.is_err() {
            break;
        }
    }
    drop(queue_tx);

    while pool.join_next().await.is_some() {}

    match Arc::try_unwrap(results) {
        Ok(results) => results.into_inner(),
        Err(shared) => {
            // All workers are joined; this arm is unreachable in practice.
            std::mem::take(&mut *shared.lock())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_processes_all_items() {
        let mut results = fan_out(4, (0..100).collect(), |n: i32| async move { Some(n * 2) }).await;
        results.sort_unstable();
        let expected: Vec<i32> = (0..100).map(|n| n * 2).collect();
        assert_eq!(results, expected);
    }

    #[tokio::test]
    async fn test_none_results_are_skipped() {
        let results = fan_out(2, (0..10).collect(), |n: i32| async move {
            (n % 2 == 0).then_some(n)
        })
        .await;
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_zero_workers_clamped() {
        let results = fan_out(0, vec![1, 2, 3], |n: i32| async move { Some(n) }).await;
        assert_eq!(results.len(), 3);
    }
}

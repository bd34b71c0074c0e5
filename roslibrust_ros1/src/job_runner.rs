//! A shared, bounded job queue that callback dispatch (deserialize + invoke) is handed
//! off to, so a slow callback on one topic cannot stall the connection read loops feeding
//! it.

use abort_on_drop::ChildTask;
use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;

pub type Job = BoxFuture<'static, ()>;

/// Abstracts the job runner a Supervisor hands dispatch work to. Exists as a trait so a
/// process hosting many subscribed topics can share one runner instead of spawning one
/// worker per topic.
pub trait JobQueue: Send + Sync {
    /// Attempts to enqueue `job`, waiting at most `budget` for room in the queue. Returns
    /// whether the job was accepted; a job that isn't accepted within `budget` is dropped
    /// by the caller, not retried here.
    fn try_enqueue<'a>(&'a self, job: Job, budget: Duration) -> BoxFuture<'a, bool>;
}

/// The default [`JobQueue`]: a single worker task draining a bounded `deadqueue`.
pub struct TokioJobQueue {
    queue: Arc<deadqueue::limited::Queue<Job>>,
    _worker: ChildTask<()>,
}

impl TokioJobQueue {
    /// Spawns a worker task and returns a queue with room for `capacity` pending jobs.
    pub fn spawn(capacity: usize) -> Self {
        let queue = Arc::new(deadqueue::limited::Queue::new(capacity));
        let worker_queue = queue.clone();
        let worker = tokio::spawn(async move {
            loop {
                let job = worker_queue.pop().await;
                job.await;
            }
        });
        Self {
            queue,
            _worker: worker.into(),
        }
    }
}

impl JobQueue for TokioJobQueue {
    fn try_enqueue<'a>(&'a self, job: Job, budget: Duration) -> BoxFuture<'a, bool> {
        Box::pin(async move {
            tokio::time::timeout(budget, self.queue.push(job))
                .await
                .is_ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test_log::test(tokio::test)]
    async fn runs_enqueued_jobs() {
        let queue = TokioJobQueue::spawn(8);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = counter.clone();
            let accepted = queue
                .try_enqueue(
                    Box::pin(async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }),
                    Duration::from_secs(1),
                )
                .await;
            assert!(accepted);
        }
        // give the worker a moment to drain
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test_log::test(tokio::test)]
    async fn drops_when_queue_stays_full_past_budget() {
        let queue = TokioJobQueue::spawn(1);
        // Fill the single worker with a job that blocks until we tell it not to.
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let accepted = queue
            .try_enqueue(
                Box::pin(async move {
                    let _ = rx.await;
                }),
                Duration::from_secs(1),
            )
            .await;
        assert!(accepted);
        // Fill the bounded queue behind it.
        let accepted = queue
            .try_enqueue(Box::pin(async move {}), Duration::from_secs(1))
            .await;
        assert!(accepted);
        // Queue is now full (capacity 1) and the worker is blocked; a third job should
        // not fit within a short budget.
        let accepted = queue
            .try_enqueue(Box::pin(async move {}), Duration::from_millis(20))
            .await;
        assert!(!accepted);
        let _ = tx.send(());
    }
}

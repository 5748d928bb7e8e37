//! Bounded, stale-aware pool for network retrievals.
//!
//! ```text
//!   submit(task, priority) ──► ┌───────────────────┐
//!                              │  PriorityQueue    │  (bounded)
//!                              └─────────┬─────────┘
//!                                        │ pop most urgent
//!                      ┌─────────────────┼─────────────────┐
//!                      ▼                 ▼                 ▼
//!                  worker 0          worker 1   ...   worker N-1
//!                      │
//!                      ├── waited > stale horizon ──► abandon
//!                      └── otherwise ──────────────► run
//! ```
//!
//! Workers are async tasks on the supplied runtime. On cancellation they exit
//! and every queued task is abandoned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::queue::PriorityQueue;
use super::task::{AbandonReason, Task};
use super::SubmitError;

/// Counters for the retrieval pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrievalPoolStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub abandoned_stale: u64,
    pub abandoned_cancelled: u64,
    pub queued: usize,
}

struct Shared {
    queue: Mutex<PriorityQueue<Box<dyn Task>>>,
    notify: Notify,
    capacity: usize,
    stale_horizon: Duration,
    cancel: CancellationToken,
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    abandoned_stale: AtomicU64,
    abandoned_cancelled: AtomicU64,
}

/// Fixed set of async workers draining a bounded priority queue.
#[derive(Clone)]
pub struct RetrievalPool {
    shared: Arc<Shared>,
    workers: usize,
}

impl RetrievalPool {
    /// Creates the pool and spawns its workers.
    ///
    /// # Arguments
    ///
    /// * `handle` - Runtime the workers run on
    /// * `workers` - Number of concurrent retrievals (at least 1)
    /// * `capacity` - Maximum queued tasks before the pool reports unavailable
    /// * `stale_horizon` - Tasks waiting longer than this are abandoned
    /// * `cancel` - Shuts the workers down
    pub fn new(
        handle: &Handle,
        workers: usize,
        capacity: usize,
        stale_horizon: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let workers = workers.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(PriorityQueue::with_capacity(capacity)),
            notify: Notify::new(),
            capacity: capacity.max(1),
            stale_horizon,
            cancel,
            submitted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            abandoned_stale: AtomicU64::new(0),
            abandoned_cancelled: AtomicU64::new(0),
        });

        for id in 0..workers {
            handle.spawn(worker_loop(Arc::clone(&shared), id));
        }
        info!(
            workers,
            capacity = shared.capacity,
            stale_horizon_ms = stale_horizon.as_millis() as u64,
            "Retrieval pool started"
        );

        Self { shared, workers }
    }

    /// True if a submission would currently be accepted.
    pub fn is_available(&self) -> bool {
        !self.shared.cancel.is_cancelled() && self.shared.queue.lock().len() < self.shared.capacity
    }

    /// Queues a task. Lower `priority` runs sooner.
    ///
    /// On rejection the task is abandoned before returning.
    pub fn submit(&self, task: Box<dyn Task>, priority: f64) -> Result<(), SubmitError> {
        if self.shared.cancel.is_cancelled() {
            task.abandon(AbandonReason::Cancelled);
            return Err(SubmitError::Shutdown);
        }
        {
            let mut queue = self.shared.queue.lock();
            if queue.len() >= self.shared.capacity {
                drop(queue);
                self.shared.rejected.fetch_add(1, Ordering::Relaxed);
                task.abandon(AbandonReason::Cancelled);
                return Err(SubmitError::Saturated);
            }
            queue.push(task, priority);
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.notify.notify_one();
        Ok(())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    pub fn stats(&self) -> RetrievalPoolStats {
        let s = &self.shared;
        RetrievalPoolStats {
            submitted: s.submitted.load(Ordering::Relaxed),
            rejected: s.rejected.load(Ordering::Relaxed),
            completed: s.completed.load(Ordering::Relaxed),
            abandoned_stale: s.abandoned_stale.load(Ordering::Relaxed),
            abandoned_cancelled: s.abandoned_cancelled.load(Ordering::Relaxed),
            queued: self.queued(),
        }
    }

    /// Stops the workers and abandons everything still queued.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        abandon_all(&self.shared);
    }
}

impl std::fmt::Debug for RetrievalPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPool")
            .field("workers", &self.workers)
            .field("stats", &self.stats())
            .finish()
    }
}

async fn worker_loop(shared: Arc<Shared>, id: usize) {
    loop {
        if shared.cancel.is_cancelled() {
            break;
        }

        let next = shared.queue.lock().pop();
        let queued = match next {
            Some(queued) => queued,
            None => {
                tokio::select! {
                    biased;
                    _ = shared.cancel.cancelled() => break,
                    _ = shared.notify.notified() => {}
                }
                continue;
            }
        };

        let waited = queued.wait_time();
        if waited > shared.stale_horizon {
            debug!(
                worker = id,
                task = queued.item.name(),
                waited_ms = waited.as_millis() as u64,
                "Abandoning stale retrieval"
            );
            shared.abandoned_stale.fetch_add(1, Ordering::Relaxed);
            queued.item.abandon(AbandonReason::Stale { waited });
            continue;
        }

        queued.item.run().await;
        shared.completed.fetch_add(1, Ordering::Relaxed);
    }

    abandon_all(&shared);
    debug!(worker = id, "Retrieval worker stopped");
}

fn abandon_all(shared: &Shared) {
    let drained: Vec<_> = shared.queue.lock().drain().collect();
    for queued in drained {
        shared.abandoned_cancelled.fetch_add(1, Ordering::Relaxed);
        queued.item.abandon(AbandonReason::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::task::tests::RecordingTask;
    use futures::future::BoxFuture;
    use tokio::sync::Semaphore;

    /// Blocks its worker until the gate opens.
    struct GatedTask {
        gate: Arc<Semaphore>,
    }

    impl Task for GatedTask {
        fn name(&self) -> &str {
            "gated"
        }

        fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let _ = self.gate.acquire().await;
            })
        }
    }

    async fn wait_for(pool: &RetrievalPool, done: impl Fn(&RetrievalPoolStats) -> bool) {
        for _ in 0..200 {
            if done(&pool.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("pool did not reach expected state: {:?}", pool.stats());
    }

    #[tokio::test]
    async fn test_runs_in_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Semaphore::new(0));
        let pool = RetrievalPool::new(
            &Handle::current(),
            1,
            10,
            Duration::from_secs(60),
            CancellationToken::new(),
        );

        // Occupy the single worker so the rest queue up
        pool.submit(Box::new(GatedTask { gate: Arc::clone(&gate) }), 0.0)
            .unwrap();
        wait_for(&pool, |s| s.queued == 0).await;

        pool.submit(RecordingTask::new("far", &log), 50.0).unwrap();
        pool.submit(RecordingTask::new("near", &log), 1.0).unwrap();
        pool.submit(RecordingTask::new("middle", &log), 10.0).unwrap();
        gate.add_permits(1);

        wait_for(&pool, |s| s.completed == 4).await;
        assert_eq!(*log.lock(), vec!["ran near", "ran middle", "ran far"]);
    }

    #[tokio::test]
    async fn test_stale_tasks_are_abandoned() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Semaphore::new(0));
        let pool = RetrievalPool::new(
            &Handle::current(),
            1,
            10,
            Duration::from_millis(30),
            CancellationToken::new(),
        );

        pool.submit(Box::new(GatedTask { gate: Arc::clone(&gate) }), 0.0)
            .unwrap();
        wait_for(&pool, |s| s.queued == 0).await;
        pool.submit(RecordingTask::new("old", &log), 1.0).unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        pool.submit(RecordingTask::new("fresh", &log), 2.0).unwrap();
        gate.add_permits(1);

        wait_for(&pool, |s| s.completed == 2 && s.abandoned_stale == 1).await;
        assert_eq!(*log.lock(), vec!["stale old", "ran fresh"]);
    }

    #[tokio::test]
    async fn test_full_queue_is_unavailable() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Semaphore::new(0));
        let pool = RetrievalPool::new(
            &Handle::current(),
            1,
            2,
            Duration::from_secs(60),
            CancellationToken::new(),
        );

        pool.submit(Box::new(GatedTask { gate: Arc::clone(&gate) }), 0.0)
            .unwrap();
        wait_for(&pool, |s| s.queued == 0).await;

        assert!(pool.is_available());
        pool.submit(RecordingTask::new("a", &log), 1.0).unwrap();
        pool.submit(RecordingTask::new("b", &log), 1.0).unwrap();
        assert!(!pool.is_available());

        let result = pool.submit(RecordingTask::new("c", &log), 1.0);
        assert_eq!(result, Err(SubmitError::Saturated));
        assert_eq!(pool.stats().rejected, 1);
        assert!(log.lock().contains(&"cancelled c".to_string()));

        gate.add_permits(1);
        wait_for(&pool, |s| s.completed == 3).await;
        assert!(pool.is_available());
    }

    #[tokio::test]
    async fn test_shutdown_abandons_queued() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Semaphore::new(0));
        let pool = RetrievalPool::new(
            &Handle::current(),
            1,
            10,
            Duration::from_secs(60),
            CancellationToken::new(),
        );

        pool.submit(Box::new(GatedTask { gate: Arc::clone(&gate) }), 0.0)
            .unwrap();
        wait_for(&pool, |s| s.queued == 0).await;
        pool.submit(RecordingTask::new("queued", &log), 1.0).unwrap();

        pool.shutdown();
        assert_eq!(*log.lock(), vec!["cancelled queued"]);
        assert!(!pool.is_available());
        assert_eq!(
            pool.submit(RecordingTask::new("late", &log), 1.0),
            Err(SubmitError::Shutdown)
        );
        gate.add_permits(1);
    }
}

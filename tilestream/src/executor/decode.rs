//! Bounded pool for load tasks.
//!
//! Each load task holds one semaphore permit for its whole lifetime. Dispatch
//! never waits: when every permit is taken the pool reports
//! [`SubmitError::Saturated`] and the caller drops the request for this frame.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::SubmitError;

/// Semaphore-bounded task pool on a tokio runtime.
pub struct DecodePool {
    handle: Handle,
    permits: Arc<Semaphore>,
    size: usize,
    cancel: CancellationToken,
    spawned: AtomicU64,
}

impl DecodePool {
    /// Creates a pool running at most `size` tasks at once.
    ///
    /// # Arguments
    ///
    /// * `handle` - Runtime the tasks are spawned on
    /// * `size` - Maximum concurrent tasks (at least 1)
    /// * `cancel` - Token checked by each task before it starts
    pub fn new(handle: Handle, size: usize, cancel: CancellationToken) -> Self {
        let size = size.max(1);
        Self {
            handle,
            permits: Arc::new(Semaphore::new(size)),
            size,
            cancel,
            spawned: AtomicU64::new(0),
        }
    }

    /// Spawns `task` if a permit is free.
    ///
    /// The task is skipped without running if the pool is cancelled before it
    /// starts.
    pub fn try_spawn<F>(&self, task: F) -> Result<(), SubmitError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(SubmitError::Shutdown);
        }
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|_| SubmitError::Saturated)?;

        let cancel = self.cancel.clone();
        self.handle.spawn(async move {
            let _permit = permit;
            if cancel.is_cancelled() {
                trace!("Load task skipped, pool cancelled");
                return;
            }
            task.await;
        });
        self.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Tasks currently holding a permit.
    pub fn active(&self) -> usize {
        self.size - self.permits.available_permits()
    }

    pub fn is_saturated(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Total tasks spawned since creation.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for DecodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodePool")
            .field("size", &self.size)
            .field("active", &self.active())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

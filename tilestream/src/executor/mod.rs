//! Worker pools.
//!
//! Two pools carry all background work:
//!
//! - [`DecodePool`]: bounded load tasks (local cache read, decode, cache
//!   insert). Dispatch is non-blocking and reports saturation.
//! - [`RetrievalPool`]: bounded priority queue of network retrievals served by
//!   a fixed set of async workers, abandoning entries that went stale.
//!
//! Both pools share one [`CancellationToken`](tokio_util::sync::CancellationToken)
//! per layer so shutdown stops everything at once.

mod decode;
mod queue;
mod retrieval;
mod task;

pub use decode::DecodePool;
pub use queue::{PriorityQueue, QueuedItem};
pub use retrieval::{RetrievalPool, RetrievalPoolStats};
pub use task::{AbandonReason, Task};

use thiserror::Error;

/// Why a pool refused work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("pool is at capacity")]
    Saturated,

    #[error("pool has been shut down")]
    Shutdown,
}

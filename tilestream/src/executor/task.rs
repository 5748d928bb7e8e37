//! Task trait for the retrieval pool.
//!
//! A task is one queued unit of network work. It either runs to completion
//! or is abandoned without running (stale, or the pool shut down). Either
//! way it is consumed exactly once, so resources it owns (in-flight marks,
//! permits) are released when it finishes.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;

/// Why a task was dropped without running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// The task waited in the queue longer than the stale horizon.
    Stale { waited: Duration },
    /// The owning pool was cancelled.
    Cancelled,
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::Stale { waited } => {
                write!(f, "stale after {}ms", waited.as_millis())
            }
            AbandonReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A unit of work executed by a pool worker.
pub trait Task: Send + 'static {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Runs the task.
    fn run(self: Box<Self>) -> BoxFuture<'static, ()>;

    /// Drops the task without running it.
    ///
    /// Implementations must not change tile state here; the default simply
    /// drops `self`.
    fn abandon(self: Box<Self>, reason: AbandonReason) {
        let _ = reason;
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records whether it ran or was abandoned.
    pub struct RecordingTask {
        pub name: String,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingTask {
        pub fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Box<Self> {
            Box::new(Self {
                name: name.to_string(),
                log: Arc::clone(log),
            })
        }
    }

    impl Task for RecordingTask {
        fn name(&self) -> &str {
            &self.name
        }

        fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
            Box::pin(async move {
                self.log.lock().push(format!("ran {}", self.name));
            })
        }

        fn abandon(self: Box<Self>, reason: AbandonReason) {
            let label = match reason {
                AbandonReason::Stale { .. } => "stale",
                AbandonReason::Cancelled => "cancelled",
            };
            self.log.lock().push(format!("{} {}", label, self.name));
        }
    }

    #[test]
    fn test_abandon_reason_display() {
        let stale = AbandonReason::Stale {
            waited: Duration::from_millis(1500),
        };
        assert_eq!(stale.to_string(), "stale after 1500ms");
        assert_eq!(AbandonReason::Cancelled.to_string(), "cancelled");
    }

    #[tokio::test]
    async fn test_recording_task() {
        let log = Arc::new(Mutex::new(Vec::new()));
        RecordingTask::new("a", &log).run().await;
        RecordingTask::new("b", &log).abandon(AbandonReason::Cancelled);
        assert_eq!(*log.lock(), vec!["ran a", "cancelled b"]);
    }
}

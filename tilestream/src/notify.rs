//! Change notification.
//!
//! The [`ChangeNotifier`] tells consumers that tile state changed in a way
//! that could alter the render list, so a repaint is warranted. Loader workers
//! fire it after cache inserts and absent-registry updates; the renderer
//! subscribes with [`ChangeNotifier::on_change`].
//!
//! Callbacks run synchronously on the notifying worker thread and must be
//! cheap (typically: set a "needs redraw" flag or wake an event loop).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::coord::TileKey;

/// What changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// A tile's resource was added to the cache.
    TileLoaded(TileKey),
    /// A tile was marked absent.
    TileAbsent(TileKey),
    /// Absent marks were reset.
    AbsentReset,
}

impl ChangeEvent {
    pub fn key(&self) -> Option<TileKey> {
        match self {
            ChangeEvent::TileLoaded(key) | ChangeEvent::TileAbsent(key) => Some(*key),
            ChangeEvent::AbsentReset => None,
        }
    }
}

/// Handle returned by [`ChangeNotifier::on_change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// Repaint signal with callback subscriptions and a generation counter.
#[derive(Default)]
pub struct ChangeNotifier {
    generation: AtomicU64,
    next_id: AtomicU64,
    listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback fired on every change.
    pub fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(callback)));
        id
    }

    /// Removes a callback. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Bumps the generation and invokes every callback.
    pub fn notify(&self, event: ChangeEvent) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(?event, generation, "Tile state changed");

        // Clone out so callbacks may subscribe/unsubscribe without deadlocking
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Number of changes signalled so far.
    ///
    /// Pollers can compare generations between frames instead of subscribing.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("generation", &self.generation())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_notify_invokes_callbacks() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        notifier.on_change(move |event| sink.lock().push(event));

        notifier.notify(ChangeEvent::TileLoaded(TileKey::new(1, 2, 3)));
        notifier.notify(ChangeEvent::AbsentReset);

        assert_eq!(
            *seen.lock(),
            vec![
                ChangeEvent::TileLoaded(TileKey::new(1, 2, 3)),
                ChangeEvent::AbsentReset
            ]
        );
        assert_eq!(notifier.generation(), 2);
    }

    #[test]
    fn test_unsubscribe() {
        let notifier = ChangeNotifier::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count);
        let id = notifier.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        notifier.notify(ChangeEvent::AbsentReset);
        assert!(notifier.unsubscribe(id));
        assert!(!notifier.unsubscribe(id));
        notifier.notify(ChangeEvent::AbsentReset);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn test_event_key() {
        let key = TileKey::new(0, 0, 1);
        assert_eq!(ChangeEvent::TileAbsent(key).key(), Some(key));
        assert_eq!(ChangeEvent::AbsentReset.key(), None);
    }
}

//! In-flight tracking.
//!
//! A key is in flight from the moment its load is dispatched until the last
//! piece of work for it (decode task, then possibly a retrieval task) has
//! finished or been abandoned. The [`InFlightGuard`] travels with that work
//! and releases the key when dropped.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::coord::TileKey;

/// Concurrent set of keys with a load in progress.
#[derive(Debug, Clone, Default)]
pub struct InFlightSet {
    keys: Arc<DashMap<TileKey, ()>>,
}

impl InFlightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` in flight, or returns `None` if it already is.
    pub fn try_acquire(&self, key: TileKey) -> Option<InFlightGuard> {
        match self.keys.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlightGuard {
                    key,
                    keys: Arc::clone(&self.keys),
                })
            }
        }
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Releases its key from the in-flight set on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    key: TileKey,
    keys: Arc<DashMap<TileKey, ()>>,
}

impl InFlightGuard {
    pub fn key(&self) -> TileKey {
        self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_is_exclusive() {
        let set = InFlightSet::new();
        let key = TileKey::new(1, 2, 3);

        let guard = set.try_acquire(key).unwrap();
        assert_eq!(guard.key(), key);
        assert!(set.contains(&key));
        assert!(set.try_acquire(key).is_none());

        drop(guard);
        assert!(!set.contains(&key));
        assert!(set.try_acquire(key).is_some());
    }

    #[test]
    fn test_guard_released_when_moved_work_is_dropped() {
        let set = InFlightSet::new();
        let guard = set.try_acquire(TileKey::new(0, 0, 0)).unwrap();

        let work = move || {
            let _guard = guard;
        };
        assert_eq!(set.len(), 1);
        work();
        assert!(set.is_empty());
    }
}

//! Registry of tiles known to be unavailable for this run.
//!
//! Entries are added by the loader when a source answers "no data" or fails
//! permanently. They never expire on their own; a successful load of the same
//! key or an explicit reset removes them.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::coord::TileKey;

/// Thread-safe set of absent tile keys for one pyramid level.
///
/// Worker threads mark entries while the render thread queries them; every
/// mutation happens under the write lock so readers never see a partial update.
#[derive(Debug, Default)]
pub struct AbsentRegistry {
    keys: RwLock<HashSet<TileKey>>,
}

impl AbsentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a tile absent. Returns `true` if it was not already marked.
    pub fn mark(&self, key: TileKey) -> bool {
        self.keys.write().insert(key)
    }

    /// Clears the absent mark for a tile. Returns `true` if it was marked.
    pub fn unmark(&self, key: &TileKey) -> bool {
        self.keys.write().remove(key)
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.keys.read().contains(key)
    }

    /// Removes every entry, returning how many were cleared.
    pub fn clear(&self) -> usize {
        let mut keys = self.keys.write();
        let count = keys.len();
        keys.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_mark_and_unmark() {
        let registry = AbsentRegistry::new();
        let key = TileKey::new(2, 3, 4);

        assert!(!registry.contains(&key));
        assert!(registry.mark(key));
        assert!(!registry.mark(key), "second mark reports no change");
        assert!(registry.contains(&key));
        assert_eq!(registry.len(), 1);

        assert!(registry.unmark(&key));
        assert!(!registry.unmark(&key));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clear_returns_count() {
        let registry = AbsentRegistry::new();
        registry.mark(TileKey::new(1, 0, 0));
        registry.mark(TileKey::new(1, 0, 1));

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_marking() {
        let registry = Arc::new(AbsentRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        registry.mark(TileKey::new(3, t, i));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 800);
    }
}

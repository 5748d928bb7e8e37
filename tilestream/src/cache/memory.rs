//! Bounded in-memory tile cache with LRU eviction.
//!
//! The cache maps tile keys to decoded resources and keeps the total reported
//! size within a byte capacity. Eviction removes the least recently used
//! entries first but never touches the *protected* set: the keys the renderer
//! is drawing from for the frame that just completed. Protecting a key also
//! counts as a use, so tiles drawn every frame stay the most recently used.
//!
//! # Synchronization
//!
//! Loader workers insert while the render thread queries. Every operation
//! takes a single `parking_lot::Mutex`, so an insert together with the
//! evictions it causes is atomic with respect to `get`/`contains`.
//!
//! # Capacity invariant
//!
//! `used_capacity() <= capacity()` holds after every operation. An insert that
//! cannot fit without evicting protected entries is rejected and counted.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::coord::TileKey;
use crate::decode::TileResource;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejected: u64,
    pub entry_count: usize,
    pub used_bytes: usize,
    pub capacity_bytes: usize,
}

impl CacheStats {
    /// Hit ratio in `0.0..=1.0`, or `0.0` before any lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Result of an insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// Stored; `evicted` entries were removed to make room.
    Stored { evicted: usize },
    /// Not stored; it would not fit without evicting protected entries.
    Rejected,
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored { .. })
    }
}

#[derive(Debug)]
struct CacheEntry {
    resource: TileResource,
    size: usize,
    stamp: u64,
}

#[derive(Debug)]
struct CacheInner {
    entries: HashMap<TileKey, CacheEntry>,
    /// Recency order: oldest stamp first.
    recency: BTreeMap<u64, TileKey>,
    protected: HashSet<TileKey>,
    capacity: usize,
    used: usize,
    clock: u64,
}

impl CacheInner {
    fn next_stamp(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, key: &TileKey) {
        if !self.entries.contains_key(key) {
            return;
        }
        let stamp = self.next_stamp();
        if let Some(entry) = self.entries.get_mut(key) {
            self.recency.remove(&entry.stamp);
            entry.stamp = stamp;
            self.recency.insert(stamp, *key);
        }
    }

    fn remove(&mut self, key: &TileKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.stamp);
        self.used -= entry.size;
        Some(entry)
    }

    /// Picks least recently used victims freeing at least `needed` bytes,
    /// skipping `exclude` and, unless `allow_protected`, the protected set.
    fn pick_victims(&self, needed: usize, exclude: Option<&TileKey>, allow_protected: bool) -> Option<Vec<TileKey>> {
        if needed == 0 {
            return Some(Vec::new());
        }
        let mut freed = 0;
        let mut victims = Vec::new();
        for key in self.recency.values() {
            if Some(key) == exclude || (!allow_protected && self.protected.contains(key)) {
                continue;
            }
            freed += self.entries[key].size;
            victims.push(*key);
            if freed >= needed {
                return Some(victims);
            }
        }
        None
    }
}

/// Bounded, thread-safe store of loaded tile resources.
pub struct TileCache {
    inner: Mutex<CacheInner>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    rejected: AtomicU64,
}

impl TileCache {
    /// Creates a cache with the given byte capacity.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                recency: BTreeMap::new(),
                protected: HashSet::new(),
                capacity: capacity_bytes,
                used: 0,
                clock: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Looks up a resource and marks it recently used.
    pub fn get(&self, key: &TileKey) -> Option<TileResource> {
        let mut inner = self.inner.lock();
        let resource = inner.entries.get(key).map(|e| e.resource.clone());
        match resource {
            Some(resource) => {
                inner.touch(key);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(resource)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Checks membership without affecting recency or statistics.
    pub fn contains(&self, key: &TileKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Inserts or replaces a resource with the given size.
    pub fn put(&self, key: TileKey, resource: TileResource, size: usize) -> PutOutcome {
        let mut inner = self.inner.lock();

        if size > inner.capacity {
            drop(inner);
            return self.reject(key, size, "larger than capacity");
        }

        let existing = inner.entries.get(&key).map_or(0, |e| e.size);
        let projected = inner.used - existing + size;
        let needed = projected.saturating_sub(inner.capacity);
        let Some(victims) = inner.pick_victims(needed, Some(&key), false) else {
            drop(inner);
            return self.reject(key, size, "protected entries fill the cache");
        };

        for victim in &victims {
            inner.remove(victim);
        }
        inner.remove(&key);
        let stamp = inner.next_stamp();
        inner.entries.insert(
            key,
            CacheEntry {
                resource,
                size,
                stamp,
            },
        );
        inner.recency.insert(stamp, key);
        inner.used += size;

        if !victims.is_empty() {
            self.evictions
                .fetch_add(victims.len() as u64, Ordering::Relaxed);
            debug!(
                tile = %key,
                evicted = victims.len(),
                used = inner.used,
                capacity = inner.capacity,
                "Cache evicted entries"
            );
        }

        PutOutcome::Stored {
            evicted: victims.len(),
        }
    }

    /// Updates the recorded size of an existing entry.
    ///
    /// Growth may evict other unprotected entries. If the entry can no longer
    /// fit, an unprotected entry is removed while a protected one keeps its
    /// old size. Returns `true` if the entry is still cached.
    pub fn update_size(&self, key: &TileKey, size: usize) -> bool {
        let mut inner = self.inner.lock();
        let Some(current) = inner.entries.get(key).map(|e| e.size) else {
            return false;
        };

        let projected = inner.used - current + size;
        let needed = projected.saturating_sub(inner.capacity);
        let victims = if size > inner.capacity {
            None
        } else {
            inner.pick_victims(needed, Some(key), false)
        };

        match victims {
            Some(victims) => {
                for victim in &victims {
                    inner.remove(victim);
                }
                self.evictions
                    .fetch_add(victims.len() as u64, Ordering::Relaxed);
                if let Some(entry) = inner.entries.get_mut(key) {
                    entry.size = size;
                }
                inner.used = inner.used - current + size;
                true
            }
            None if inner.protected.contains(key) => {
                warn!(tile = %key, size, current, "Resized entry no longer fits, keeping protected entry");
                true
            }
            None => {
                inner.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                warn!(tile = %key, size, "Resized entry no longer fits, removed");
                false
            }
        }
    }

    /// Explicitly invalidates an entry.
    pub fn remove(&self, key: &TileKey) -> Option<TileResource> {
        self.inner.lock().remove(key).map(|e| e.resource)
    }

    /// Replaces the protected set with the keys drawn in the last frame and
    /// marks the cached ones recently used, in iteration order.
    pub fn set_protected<I>(&self, keys: I)
    where
        I: IntoIterator<Item = TileKey>,
    {
        let mut inner = self.inner.lock();
        inner.protected.clear();
        for key in keys {
            inner.touch(&key);
            inner.protected.insert(key);
        }
    }

    pub fn is_protected(&self, key: &TileKey) -> bool {
        self.inner.lock().protected.contains(key)
    }

    /// Changes the capacity, evicting down to it.
    ///
    /// Shrinking below the size of the protected set evicts protected entries
    /// too; the capacity invariant takes precedence.
    pub fn set_capacity(&self, capacity_bytes: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = capacity_bytes;
        let needed = inner.used.saturating_sub(capacity_bytes);
        let victims = inner
            .pick_victims(needed, None, false)
            .or_else(|| inner.pick_victims(needed, None, true))
            .unwrap_or_else(|| inner.recency.values().copied().collect());
        for victim in &victims {
            inner.remove(victim);
        }
        if !victims.is_empty() {
            self.evictions
                .fetch_add(victims.len() as u64, Ordering::Relaxed);
            debug!(
                evicted = victims.len(),
                capacity = capacity_bytes,
                "Cache capacity reduced"
            );
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Sum of the sizes of all cached resources.
    pub fn used_capacity(&self) -> usize {
        self.inner.lock().used
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Removes every entry (the protected set is kept).
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.recency.clear();
        inner.used = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            entry_count: inner.entries.len(),
            used_bytes: inner.used,
            capacity_bytes: inner.capacity,
        }
    }

    fn reject(&self, key: TileKey, size: usize, reason: &str) -> PutOutcome {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        warn!(tile = %key, size, reason, "Cache rejected entry");
        PutOutcome::Rejected
    }
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("TileCache")
            .field("entries", &inner.entries.len())
            .field("used", &inner.used)
            .field("capacity", &inner.capacity)
            .field("protected", &inner.protected.len())
            .finish()
    }
}

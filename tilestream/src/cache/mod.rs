//! Tile caching.
//!
//! Two layers of cache back the engine:
//!
//! ```text
//!   Selector ──contains──► TileCache (memory, decoded, bounded)
//!                              ▲
//!   Loader ──put────────────────┘
//!      │
//!      └──find/write/remove──► PersistentCache (raw payloads, e.g. DiskCache)
//! ```
//!
//! - [`TileCache`]: decoded resources with a byte capacity and LRU eviction
//!   that never evicts the protected render set
//! - [`PersistentCache`]: raw payloads on local storage, keyed by data path
//! - [`DiskCache`]: filesystem implementation of [`PersistentCache`]

mod disk;
mod memory;
mod traits;

pub use disk::DiskCache;
pub use memory::{CacheStats, PutOutcome, TileCache};
pub use traits::{CacheError, PersistentCache};

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    /// In-memory persistent cache for loader tests.
    #[derive(Default)]
    pub struct MockPersistentCache {
        pub files: Mutex<HashMap<String, Vec<u8>>>,
        pub removed: Mutex<Vec<String>>,
        /// Paths that are found but fail to read.
        pub unreadable: Mutex<Vec<String>>,
    }

    impl MockPersistentCache {
        pub fn with_file(path: &str, bytes: &[u8]) -> Self {
            let cache = Self::default();
            cache.files.lock().insert(path.to_string(), bytes.to_vec());
            cache
        }

        pub fn has(&self, path: &str) -> bool {
            self.files.lock().contains_key(path)
        }
    }

    impl PersistentCache for MockPersistentCache {
        fn find(&self, path: &str) -> Option<PathBuf> {
            let found = self.has(path) || self.unreadable.lock().iter().any(|p| p == path);
            found.then(|| PathBuf::from(path))
        }

        fn read(&self, location: &Path) -> Result<Vec<u8>, CacheError> {
            let key = location.to_string_lossy().to_string();
            if self.unreadable.lock().contains(&key) {
                return Err(CacheError::io(
                    location,
                    std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
                ));
            }
            self.files.lock().get(&key).cloned().ok_or_else(|| {
                CacheError::io(
                    location,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                )
            })
        }

        fn write(&self, path: &str, bytes: &[u8]) -> Result<(), CacheError> {
            self.files.lock().insert(path.to_string(), bytes.to_vec());
            Ok(())
        }

        fn remove(&self, path: &str) -> Result<(), CacheError> {
            self.files.lock().remove(path);
            self.removed.lock().push(path.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_mock_persistent_cache_roundtrip() {
        let cache = MockPersistentCache::default();
        cache.write("a/0/0/0_0.png", b"x").unwrap();
        let location = cache.find("a/0/0/0_0.png").unwrap();
        assert_eq!(cache.read(&location).unwrap(), b"x");
        cache.remove("a/0/0/0_0.png").unwrap();
        assert!(!cache.has("a/0/0/0_0.png"));
    }
}

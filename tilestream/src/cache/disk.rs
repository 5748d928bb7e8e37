//! Filesystem-backed persistent cache.
//!
//! Payloads live under a root directory at their relative data path
//! (`{cache_name}/{level}/{row}/{row}_{col}{suffix}`). Writes go to a
//! temporary sibling first and are renamed into place so a reader never sees
//! a partially written file.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, trace};

use super::traits::{CacheError, PersistentCache};

/// Suffix for in-progress writes.
const PARTIAL_SUFFIX: &str = ".part";

/// Persistent cache rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    /// Creates a disk cache rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default root: the platform cache directory plus `tilestream`.
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("tilestream")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative data path, rejecting anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, CacheError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(CacheError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl PersistentCache for DiskCache {
    fn find(&self, path: &str) -> Option<PathBuf> {
        let full = self.resolve(path).ok()?;
        full.is_file().then_some(full)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }

        let mut partial = full.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        fs::write(&partial, bytes).map_err(|e| CacheError::io(&partial, e))?;
        fs::rename(&partial, &full).map_err(|e| CacheError::io(&full, e))?;
        trace!(path = %full.display(), bytes = bytes.len(), "Wrote cached tile");
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), CacheError> {
        let full = self.resolve(path)?;
        match fs::remove_file(&full) {
            Ok(()) => {
                debug!(path = %full.display(), "Removed cached tile");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&full, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_find_read() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());
        let path = "Earth/test/3/1/1_2.png";

        assert!(cache.find(path).is_none());
        cache.write(path, b"payload").unwrap();

        let location = cache.find(path).unwrap();
        assert!(location.starts_with(dir.path()));
        assert_eq!(cache.read(&location).unwrap(), b"payload");
    }

    #[test]
    fn test_write_replaces_and_leaves_no_partial() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());
        let path = "layer/0/0/0_0.jpg";

        cache.write(path, b"first").unwrap();
        cache.write(path, b"second").unwrap();

        let location = cache.find(path).unwrap();
        assert_eq!(cache.read(&location).unwrap(), b"second");
        assert!(!dir.path().join("layer/0/0/0_0.jpg.part").exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());
        let path = "layer/1/0/0_1.png";

        cache.write(path, b"x").unwrap();
        cache.remove(path).unwrap();
        assert!(cache.find(path).is_none());
        cache.remove(path).unwrap();
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let cache = DiskCache::new(dir.path());

        assert!(matches!(
            cache.write("../outside.png", b"x"),
            Err(CacheError::InvalidPath(_))
        ));
        assert!(matches!(
            cache.write("/abs/path.png", b"x"),
            Err(CacheError::InvalidPath(_))
        ));
        assert!(matches!(cache.remove(""), Err(CacheError::InvalidPath(_))));
        assert!(cache.find("../outside.png").is_none());
    }
}

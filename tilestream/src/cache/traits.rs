//! Persistent cache interface.
//!
//! The persistent cache stores raw tile payloads between runs. The engine only
//! needs four operations; the file layout beyond the relative data path is up
//! to the implementation.
//!
//! Calls are synchronous and made from blocking worker threads, never from the
//! render thread.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors from persistent cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The relative data path escapes the cache root or is absolute.
    #[error("Invalid cache path: {0}")]
    InvalidPath(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Local store of raw tile payloads keyed by relative data path.
pub trait PersistentCache: Send + Sync {
    /// Locates a cached payload, returning its local file path.
    fn find(&self, path: &str) -> Option<PathBuf>;

    /// Reads a payload previously located with [`find`](Self::find).
    fn read(&self, location: &Path) -> Result<Vec<u8>, CacheError> {
        std::fs::read(location).map_err(|e| CacheError::io(location, e))
    }

    /// Stores a payload, replacing any existing one.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), CacheError>;

    /// Deletes a payload. Removing a missing entry is not an error.
    fn remove(&self, path: &str) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display() {
        let err = CacheError::InvalidPath("../etc/passwd".to_string());
        assert!(err.to_string().contains("../etc/passwd"));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = CacheError::io("/tmp/x", io_err);
        assert!(err.to_string().contains("/tmp/x"));
        assert!(err.to_string().contains("file not found"));
    }
}

//! Engine configuration.
//!
//! [`StreamConfig`] combines every knob the engine exposes. Each section has a
//! `Default` tuned for interactive use and `with_*` builders for overrides.
//! [`ConfigFile`] loads the same settings from an INI file.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use tilestream::config::{RetrievalConfig, StreamConfig};
//!
//! let config = StreamConfig::default().with_retrieval(
//!     RetrievalConfig::default().with_read_timeout(Duration::from_secs(2)),
//! );
//! assert_eq!(config.retrieval.read_timeout, Duration::from_secs(2));
//! ```

mod file;

pub use file::{parse_size, ConfigError, ConfigFile};

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::DiskCache;

/// Default memory cache capacity (256 MB).
pub const DEFAULT_MEMORY_CAPACITY: usize = 256 * 1024 * 1024;

/// Default number of concurrent decode tasks.
pub const DEFAULT_DECODE_WORKERS: usize = 4;

/// Default number of concurrent network retrievals.
pub const DEFAULT_RETRIEVAL_WORKERS: usize = 8;

/// Default bound on retrievals waiting for a worker.
pub const DEFAULT_RETRIEVAL_QUEUE_SIZE: usize = 200;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default horizon after which a queued retrieval is abandoned.
pub const DEFAULT_STALE_HORIZON: Duration = Duration::from_secs(20);

/// Default consecutive transport failures before a host is considered down.
pub const DEFAULT_HOST_FAILURE_THRESHOLD: u32 = 3;

/// Default time a failing host stays unavailable.
pub const DEFAULT_HOST_COOLDOWN: Duration = Duration::from_secs(30);

/// Default arena bound before unvisited tiles are pruned.
pub const DEFAULT_MAX_ARENA_TILES: usize = 8192;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamConfig {
    pub cache: CacheConfig,
    pub pools: PoolConfig,
    pub retrieval: RetrievalConfig,
    pub selection: SelectionConfig,
    pub source: SourceConfig,
}

impl StreamConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_pools(mut self, pools: PoolConfig) -> Self {
        self.pools = pools;
        self
    }

    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn with_selection(mut self, selection: SelectionConfig) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.source = source;
        self
    }
}

/// Memory and disk cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Memory cache capacity in bytes.
    pub memory_capacity: usize,
    /// Root directory of the persistent disk cache.
    pub disk_directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            disk_directory: DiskCache::default_root(),
        }
    }
}

impl CacheConfig {
    pub fn with_memory_capacity(mut self, bytes: usize) -> Self {
        self.memory_capacity = bytes;
        self
    }

    pub fn with_disk_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.disk_directory = directory.into();
        self
    }
}

/// Worker pool sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolConfig {
    /// Concurrent load tasks (local cache + decode).
    pub decode_workers: usize,
    /// Concurrent network retrievals.
    pub retrieval_workers: usize,
    /// Retrievals allowed to wait for a worker before the pool reports full.
    pub retrieval_queue_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            decode_workers: DEFAULT_DECODE_WORKERS,
            retrieval_workers: DEFAULT_RETRIEVAL_WORKERS,
            retrieval_queue_size: DEFAULT_RETRIEVAL_QUEUE_SIZE,
        }
    }
}

impl PoolConfig {
    pub fn with_decode_workers(mut self, workers: usize) -> Self {
        self.decode_workers = workers;
        self
    }

    pub fn with_retrieval_workers(mut self, workers: usize) -> Self {
        self.retrieval_workers = workers;
        self
    }

    pub fn with_retrieval_queue_size(mut self, size: usize) -> Self {
        self.retrieval_queue_size = size;
        self
    }
}

/// Network retrieval settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// When false, tiles missing locally are marked absent instead of fetched.
    pub enabled: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Queued retrievals older than this are abandoned without running.
    pub stale_horizon: Duration,
    /// Consecutive transport failures before a host is treated as down.
    pub host_failure_threshold: u32,
    /// How long a down host stays unavailable before a trial request is allowed.
    pub host_cooldown: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            stale_horizon: DEFAULT_STALE_HORIZON,
            host_failure_threshold: DEFAULT_HOST_FAILURE_THRESHOLD,
            host_cooldown: DEFAULT_HOST_COOLDOWN,
        }
    }
}

impl RetrievalConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_stale_horizon(mut self, horizon: Duration) -> Self {
        self.stale_horizon = horizon;
        self
    }

    pub fn with_host_failure_threshold(mut self, threshold: u32) -> Self {
        self.host_failure_threshold = threshold;
        self
    }

    pub fn with_host_cooldown(mut self, cooldown: Duration) -> Self {
        self.host_cooldown = cooldown;
        self
    }
}

/// Selector tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionConfig {
    /// Bias added to the detail factor; higher values refine further.
    pub detail_hint: f64,
    /// Arena size above which tiles not visited this frame are dropped.
    pub max_arena_tiles: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            detail_hint: 0.0,
            max_arena_tiles: DEFAULT_MAX_ARENA_TILES,
        }
    }
}

impl SelectionConfig {
    pub fn with_detail_hint(mut self, hint: f64) -> Self {
        self.detail_hint = hint;
        self
    }

    pub fn with_max_arena_tiles(mut self, max: usize) -> Self {
        self.max_arena_tiles = max;
        self
    }
}

/// Naming of the tile source in the persistent cache.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceConfig {
    /// Directory name of this source inside the persistent cache.
    pub cache_name: String,
    /// File suffix of cached payloads, including the dot.
    pub format_suffix: String,
    /// Optional format passed to the URL builder (e.g. `image/png`).
    pub format_override: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            cache_name: "default".to_string(),
            format_suffix: ".png".to_string(),
            format_override: None,
        }
    }
}

impl SourceConfig {
    pub fn new(cache_name: impl Into<String>, format_suffix: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            format_suffix: format_suffix.into(),
            format_override: None,
        }
    }

    pub fn with_format_override(mut self, format: impl Into<String>) -> Self {
        self.format_override = Some(format.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StreamConfig::default();
        assert_eq!(config.cache.memory_capacity, DEFAULT_MEMORY_CAPACITY);
        assert_eq!(config.pools.decode_workers, DEFAULT_DECODE_WORKERS);
        assert!(config.retrieval.enabled);
        assert_eq!(config.retrieval.stale_horizon, DEFAULT_STALE_HORIZON);
        assert_eq!(config.selection.detail_hint, 0.0);
        assert_eq!(config.source.format_suffix, ".png");
        assert!(config.cache.disk_directory.ends_with("tilestream"));
    }

    #[test]
    fn test_builders() {
        let config = StreamConfig::default()
            .with_cache(CacheConfig::default().with_memory_capacity(1024))
            .with_pools(PoolConfig::default().with_decode_workers(1))
            .with_selection(SelectionConfig::default().with_detail_hint(0.5))
            .with_source(SourceConfig::new("bmng", ".jpg").with_format_override("image/jpeg"));

        assert_eq!(config.cache.memory_capacity, 1024);
        assert_eq!(config.pools.decode_workers, 1);
        assert_eq!(config.selection.detail_hint, 0.5);
        assert_eq!(config.source.cache_name, "bmng");
        assert_eq!(config.source.format_override.as_deref(), Some("image/jpeg"));
    }
}

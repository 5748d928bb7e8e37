//! Tile loading.
//!
//! The loader turns a [`LoadRequest`] into a cached resource or an absent
//! mark. Each dispatched request becomes one load task on the decode pool:
//!
//! ```text
//! try_dispatch(request)
//!     │  in-flight guard acquired
//!     ▼
//! DecodePool ──► local lookup (find, read, decode under the decode lock)
//!                   │ hit ──────────────► TileCache.put + notify
//!                   │ undecodable ──────► remove file, treat as miss
//!                   │ unreadable ───────► keep file, treat as miss
//!                   ▼ miss
//!                retrieval disabled ────► mark absent + notify
//!                retrieval queue full ──► stop (retry next frame)
//!                no URL ────────────────► stop
//!                host unavailable ──────► mark absent + notify
//!                   ▼
//!             RetrievalPool ──► fetch ──► post-process (see `post`)
//! ```
//!
//! The in-flight guard travels with the work and releases the key when the
//! last task for it finishes or is abandoned. Errors never leave the loader;
//! they are logged and reflected into tile state.

mod inflight;
mod post;

pub use inflight::{InFlightGuard, InFlightSet};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::cache::{PersistentCache, TileCache};
use crate::config::{PoolConfig, RetrievalConfig, SourceConfig};
use crate::coord::TileKey;
use crate::decode::{Decoder, TileResource};
use crate::executor::{DecodePool, RetrievalPool, RetrievalPoolStats, SubmitError};
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::provider::{NetworkStatus, RetrievalTimeouts, Retriever, UrlBuilder};
use crate::pyramid::LevelSet;
use crate::scheduler::{DispatchOutcome, LoadDispatcher};
use crate::tile::LoadRequest;

use post::RetrievalTask;

/// Point-in-time loader counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
    pub dispatched: u64,
    pub local_hits: u64,
    pub corrupt_removed: u64,
    pub retrievals_queued: u64,
    pub retrieved: u64,
    pub no_data: u64,
    pub decode_failures: u64,
    pub transport_failures: u64,
    pub absent_marked: u64,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    local_hits: AtomicU64,
    corrupt_removed: AtomicU64,
    retrievals_queued: AtomicU64,
    retrieved: AtomicU64,
    no_data: AtomicU64,
    decode_failures: AtomicU64,
    transport_failures: AtomicU64,
    absent_marked: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Collaborators a loader needs, injected by the owning layer.
pub struct LoaderParts {
    pub pyramid: Arc<LevelSet>,
    pub cache: Arc<TileCache>,
    pub persistent: Arc<dyn PersistentCache>,
    pub decoder: Arc<dyn Decoder>,
    pub retriever: Arc<dyn Retriever>,
    pub url_builder: Option<Arc<dyn UrlBuilder>>,
    pub network: Arc<dyn NetworkStatus>,
    pub notifier: Arc<ChangeNotifier>,
}

/// State shared between the loader and its in-flight tasks.
pub(crate) struct LoaderShared {
    pyramid: Arc<LevelSet>,
    cache: Arc<TileCache>,
    persistent: Arc<dyn PersistentCache>,
    decoder: Arc<dyn Decoder>,
    retriever: Arc<dyn Retriever>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    network: Arc<dyn NetworkStatus>,
    notifier: Arc<ChangeNotifier>,
    retrieval_pool: RetrievalPool,
    /// Serialises persistent-cache access and decoding.
    decode_lock: Mutex<()>,
    retrieval_enabled: AtomicBool,
    timeouts: RetrievalTimeouts,
    source: SourceConfig,
    counters: Counters,
}

enum LocalLookup {
    Hit(TileResource),
    Miss,
    Corrupt,
}

impl LoaderShared {
    fn data_path(&self, key: &TileKey) -> String {
        key.data_path(&self.source.cache_name, &self.source.format_suffix)
    }

    /// Stores a decoded resource and announces it.
    fn install(&self, key: TileKey, resource: TileResource) {
        let size = resource.size_bytes();
        let outcome = self.cache.put(key, resource, size);
        if outcome.is_stored() {
            self.pyramid.clear_absent(&key);
            self.notifier.notify(ChangeEvent::TileLoaded(key));
        } else {
            debug!(tile = %key, size, "Tile did not fit in cache, will retry");
        }
    }

    fn mark_absent(&self, key: TileKey) {
        self.pyramid.mark_absent(key);
        bump(&self.counters.absent_marked);
        self.notifier.notify(ChangeEvent::TileAbsent(key));
    }

    /// Blocking: find, read and decode a locally persisted payload.
    ///
    /// A file that does not decode is removed so the next attempt goes to the
    /// network. A file that cannot be read is left alone and treated as a miss.
    fn lookup_local(&self, key: &TileKey, path: &str) -> LocalLookup {
        let Some(location) = self.persistent.find(path) else {
            return LocalLookup::Miss;
        };

        let _lock = self.decode_lock.lock();
        let bytes = match self.persistent.read(&location) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(tile = %key, path, error = %e, "Failed to read cached tile");
                return LocalLookup::Miss;
            }
        };
        let failure = match self.decoder.decode(&bytes) {
            Ok(resource) => return LocalLookup::Hit(resource),
            Err(e) => e,
        };

        warn!(tile = %key, path, error = %failure, "Removing undecodable cached tile");
        if let Err(e) = self.persistent.remove(path) {
            warn!(tile = %key, path, error = %e, "Failed to remove cached tile");
        }
        LocalLookup::Corrupt
    }

    /// Body of a load task.
    async fn load(self: Arc<Self>, request: LoadRequest, guard: InFlightGuard) {
        let key = request.key();
        let path = self.data_path(&key);

        let shared = Arc::clone(&self);
        let local_path = path.clone();
        let lookup = tokio::task::spawn_blocking(move || shared.lookup_local(&key, &local_path))
            .await
            .unwrap_or_else(|e| {
                warn!(tile = %key, error = %e, "Local lookup task failed");
                LocalLookup::Miss
            });

        match lookup {
            LocalLookup::Hit(resource) => {
                trace!(tile = %key, "Loaded from local cache");
                bump(&self.counters.local_hits);
                self.install(key, resource);
                return;
            }
            LocalLookup::Corrupt => bump(&self.counters.corrupt_removed),
            LocalLookup::Miss => {}
        }

        if !self.retrieval_enabled.load(Ordering::Acquire) {
            trace!(tile = %key, "Retrieval disabled, marking absent");
            self.mark_absent(key);
            return;
        }

        if !self.retrieval_pool.is_available() {
            trace!(tile = %key, "Retrieval queue full, retry next frame");
            return;
        }

        let sector = self.pyramid.tile_sector(&key);
        let url = self.url_builder.as_ref().and_then(|builder| {
            builder.build_url(&key, &sector, self.source.format_override.as_deref())
        });
        let Some(url) = url else {
            trace!(tile = %key, "No URL for tile");
            return;
        };

        if self.network.is_host_unavailable(&url) {
            debug!(tile = %key, url = %url, "Host unavailable, marking absent");
            self.mark_absent(key);
            return;
        }

        let task = RetrievalTask::new(Arc::clone(&self), key, url, path, guard);
        match self.retrieval_pool.submit(Box::new(task), request.priority()) {
            Ok(()) => bump(&self.counters.retrievals_queued),
            Err(e) => trace!(tile = %key, error = %e, "Retrieval not queued"),
        }
    }
}

/// Executes load requests on the decode and retrieval pools.
pub struct Loader {
    shared: Arc<LoaderShared>,
    decode_pool: DecodePool,
    in_flight: InFlightSet,
    cancel: CancellationToken,
}

impl Loader {
    /// Creates a loader and starts its retrieval workers on `handle`.
    ///
    /// # Arguments
    ///
    /// * `handle` - Runtime for load tasks and retrieval workers
    /// * `parts` - Injected collaborators
    /// * `pools` - Pool sizes
    /// * `retrieval` - Timeouts and whether retrieval starts enabled
    /// * `source` - Data path naming and format override
    pub fn new(
        handle: &Handle,
        parts: LoaderParts,
        pools: &PoolConfig,
        retrieval: &RetrievalConfig,
        source: SourceConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let timeouts = RetrievalTimeouts::from_config(retrieval);
        let retrieval_pool = RetrievalPool::new(
            handle,
            pools.retrieval_workers,
            pools.retrieval_queue_size,
            timeouts.stale,
            cancel.child_token(),
        );
        let decode_pool = DecodePool::new(handle.clone(), pools.decode_workers, cancel.child_token());

        let shared = Arc::new(LoaderShared {
            pyramid: parts.pyramid,
            cache: parts.cache,
            persistent: parts.persistent,
            decoder: parts.decoder,
            retriever: parts.retriever,
            url_builder: parts.url_builder,
            network: parts.network,
            notifier: parts.notifier,
            retrieval_pool,
            decode_lock: Mutex::new(()),
            retrieval_enabled: AtomicBool::new(retrieval.enabled),
            timeouts,
            source,
            counters: Counters::default(),
        });

        Self {
            shared,
            decode_pool,
            in_flight: InFlightSet::new(),
            cancel,
        }
    }

    pub fn set_retrieval_enabled(&self, enabled: bool) {
        self.shared.retrieval_enabled.store(enabled, Ordering::Release);
    }

    pub fn is_retrieval_enabled(&self) -> bool {
        self.shared.retrieval_enabled.load(Ordering::Acquire)
    }

    /// True if tile URLs can be built, which retrieval requires.
    pub fn has_url_builder(&self) -> bool {
        self.shared.url_builder.is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn retrieval_stats(&self) -> RetrievalPoolStats {
        self.shared.retrieval_pool.stats()
    }

    pub fn stats(&self) -> LoaderStats {
        let c = &self.shared.counters;
        LoaderStats {
            dispatched: c.dispatched.load(Ordering::Relaxed),
            local_hits: c.local_hits.load(Ordering::Relaxed),
            corrupt_removed: c.corrupt_removed.load(Ordering::Relaxed),
            retrievals_queued: c.retrievals_queued.load(Ordering::Relaxed),
            retrieved: c.retrieved.load(Ordering::Relaxed),
            no_data: c.no_data.load(Ordering::Relaxed),
            decode_failures: c.decode_failures.load(Ordering::Relaxed),
            transport_failures: c.transport_failures.load(Ordering::Relaxed),
            absent_marked: c.absent_marked.load(Ordering::Relaxed),
            in_flight: self.in_flight.len(),
        }
    }

    /// Cancels both pools. Queued work is abandoned; running work finishes
    /// its current step.
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            debug!("Loader shutting down");
            self.cancel.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl LoadDispatcher for Loader {
    fn is_in_flight(&self, key: &TileKey) -> bool {
        self.in_flight.contains(key)
    }

    fn try_dispatch(&self, request: &LoadRequest) -> DispatchOutcome {
        let Some(guard) = self.in_flight.try_acquire(request.key()) else {
            return DispatchOutcome::InFlight;
        };

        let work = Arc::clone(&self.shared).load(*request, guard);
        match self.decode_pool.try_spawn(work) {
            Ok(()) => {
                bump(&self.shared.counters.dispatched);
                DispatchOutcome::Dispatched
            }
            // The unspawned future is dropped here, releasing the guard
            Err(SubmitError::Saturated) | Err(SubmitError::Shutdown) => DispatchOutcome::Saturated,
        }
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("in_flight", &self.in_flight.len())
            .field("retrieval_enabled", &self.is_retrieval_enabled())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

//! The owning layer object.
//!
//! [`TiledLayer`] constructs and wires every component for one tiled data
//! source and exposes the per-frame API:
//!
//! ```text
//!            frame(view)
//!                │
//!                ▼
//!   ┌──────── Selector ────────┐
//!   │ render list   load reqs  │
//!   ▼                          ▼
//! TileCache.set_protected   RequestScheduler ──► Loader ──► pools
//!                                                  │
//!                      TileCache / AbsentRegistry ◄┘
//!                                │
//!                        ChangeNotifier ──► on_change callbacks
//! ```
//!
//! Each layer owns its cache, absent registry and pools; nothing is global.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilestream::config::StreamConfig;
//! use tilestream::coord::Sector;
//! use tilestream::layer::TiledLayer;
//! use tilestream::provider::XyzUrlBuilder;
//! use tilestream::pyramid::LevelSet;
//! use tilestream::view::RegionView;
//!
//! let pyramid = LevelSet::uniform(Sector::FULL_SPHERE, 36.0, 10, 512, 512)?;
//! let mut layer = TiledLayer::builder(StreamConfig::default(), pyramid)
//!     .url_builder(Arc::new(XyzUrlBuilder::new("https://tiles.example.com/{z}/{x}/{y}.png")))
//!     .build()?;
//!
//! layer.on_change(|_| request_redraw());
//! let tiles = layer.frame(&RegionView::looking_down(45.0, 7.0, 50_000.0, 1.0));
//! ```

mod error;

pub use error::LayerError;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::cache::{CacheStats, DiskCache, PersistentCache, TileCache};
use crate::config::StreamConfig;
use crate::coord::TileKey;
use crate::decode::{Decoder, ImageDecoder};
use crate::executor::RetrievalPoolStats;
use crate::loader::{Loader, LoaderParts, LoaderStats};
use crate::notify::{ChangeEvent, ChangeNotifier, SubscriptionId};
use crate::provider::{HostStatusTracker, HttpRetriever, NetworkStatus, Retriever, UrlBuilder};
use crate::pyramid::LevelSet;
use crate::scheduler::{RequestScheduler, ScheduleReport};
use crate::selector::Selector;
use crate::tile::{RenderTile, TileState};
use crate::view::View;

/// Snapshot of a layer's counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerStats {
    pub frames: u64,
    pub render_tiles: usize,
    pub fallback_tiles: usize,
    pub absent_tiles: usize,
    pub last_schedule: ScheduleReport,
    pub cache: CacheStats,
    pub loader: LoaderStats,
    pub retrieval: RetrievalPoolStats,
}

/// Builder for [`TiledLayer`].
///
/// Every collaborator has a default: an [`HttpRetriever`], an
/// [`ImageDecoder`], a [`DiskCache`] at the configured directory and a
/// [`HostStatusTracker`]. Only the URL builder must be supplied when
/// retrieval is enabled.
pub struct TiledLayerBuilder {
    config: StreamConfig,
    pyramid: LevelSet,
    handle: Option<Handle>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    retriever: Option<Arc<dyn Retriever>>,
    decoder: Option<Arc<dyn Decoder>>,
    persistent: Option<Arc<dyn PersistentCache>>,
    network: Option<Arc<dyn NetworkStatus>>,
}

impl TiledLayerBuilder {
    pub fn url_builder(mut self, builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = Some(builder);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn persistent_cache(mut self, cache: Arc<dyn PersistentCache>) -> Self {
        self.persistent = Some(cache);
        self
    }

    pub fn network_status(mut self, status: Arc<dyn NetworkStatus>) -> Self {
        self.network = Some(status);
        self
    }

    /// Runtime for background work. Defaults to the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Wires the components and starts the retrieval workers.
    pub fn build(self) -> Result<TiledLayer, LayerError> {
        let config = self.config;
        if config.retrieval.enabled && self.url_builder.is_none() {
            return Err(LayerError::MissingUrlBuilder);
        }
        let handle = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| LayerError::NoRuntime(e.to_string()))?,
        };
        let retriever: Arc<dyn Retriever> = match self.retriever {
            Some(retriever) => retriever,
            None => Arc::new(HttpRetriever::new()?),
        };

        let pyramid = Arc::new(self.pyramid);
        let cache = Arc::new(TileCache::new(config.cache.memory_capacity));
        let notifier = Arc::new(ChangeNotifier::new());

        let persistent: Arc<dyn PersistentCache> = match self.persistent {
            Some(persistent) => persistent,
            None => Arc::new(DiskCache::new(config.cache.disk_directory.clone())),
        };
        let decoder: Arc<dyn Decoder> = match self.decoder {
            Some(decoder) => decoder,
            None => Arc::new(ImageDecoder::new()),
        };
        let network: Arc<dyn NetworkStatus> = match self.network {
            Some(network) => network,
            None => Arc::new(HostStatusTracker::from_config(&config.retrieval)),
        };

        let parts = LoaderParts {
            pyramid: Arc::clone(&pyramid),
            cache: Arc::clone(&cache),
            persistent,
            decoder,
            retriever,
            url_builder: self.url_builder,
            network,
            notifier: Arc::clone(&notifier),
        };
        let loader = Loader::new(
            &handle,
            parts,
            &config.pools,
            &config.retrieval,
            config.source.clone(),
        );
        let selector = Selector::new(Arc::clone(&pyramid), &config.selection);

        info!(
            source = %config.source.cache_name,
            levels = pyramid.num_levels(),
            memory_capacity = config.cache.memory_capacity,
            decode_workers = config.pools.decode_workers,
            retrieval_workers = config.pools.retrieval_workers,
            retrieval_enabled = config.retrieval.enabled,
            "Tiled layer started"
        );

        Ok(TiledLayer {
            pyramid,
            cache,
            notifier,
            selector,
            scheduler: RequestScheduler::new(),
            loader,
            render_list: Vec::new(),
            last_schedule: ScheduleReport::default(),
            config,
        })
    }
}

/// One tiled data source, selected and streamed frame by frame.
pub struct TiledLayer {
    pyramid: Arc<LevelSet>,
    cache: Arc<TileCache>,
    notifier: Arc<ChangeNotifier>,
    selector: Selector,
    scheduler: RequestScheduler,
    loader: Loader,
    render_list: Vec<RenderTile>,
    last_schedule: ScheduleReport,
    config: StreamConfig,
}

impl TiledLayer {
    /// Starts building a layer over `pyramid`.
    pub fn builder(config: StreamConfig, pyramid: LevelSet) -> TiledLayerBuilder {
        TiledLayerBuilder {
            config,
            pyramid,
            handle: None,
            url_builder: None,
            retriever: None,
            decoder: None,
            persistent: None,
            network: None,
        }
    }

    /// Runs one frame: selects tiles for `view`, protects them from eviction
    /// and dispatches the most urgent loads.
    ///
    /// Returns the render list, valid until the next call.
    pub fn frame(&mut self, view: &dyn View) -> &[RenderTile] {
        let selection = self.selector.select(view, &self.cache);

        let protected: BTreeSet<TileKey> = selection
            .render_list
            .iter()
            .flat_map(|tile| std::iter::once(tile.key).chain(tile.fallback.as_ref().map(|f| f.ancestor)))
            .collect();
        self.cache.set_protected(protected);

        self.last_schedule = self.scheduler.schedule(&selection.load_requests, &self.loader);
        debug!(
            frame = self.selector.frame(),
            render = selection.render_list.len(),
            fallbacks = selection.fallback_count(),
            requested = self.last_schedule.requested,
            dispatched = self.last_schedule.dispatched,
            "Frame selected"
        );

        self.render_list = selection.render_list;
        &self.render_list
    }

    /// Render list of the last frame.
    pub fn render_list(&self) -> &[RenderTile] {
        &self.render_list
    }

    /// Registers a callback fired when a tile loads or is marked absent.
    ///
    /// Callbacks run on worker threads and should only schedule a redraw.
    pub fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.notifier.on_change(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    /// Forgets every absent mark so those tiles are requested again.
    pub fn reset_absent(&self) -> usize {
        let cleared = self.pyramid.reset_absent();
        info!(cleared, "Absent tiles reset");
        self.notifier.notify(ChangeEvent::AbsentReset);
        cleared
    }

    /// Enables or disables network retrieval. While disabled, tiles missing
    /// from the local cache are marked absent.
    ///
    /// Re-enabling clears every absent mark so those tiles are requested
    /// again. Enabling a layer built without a URL builder is an error.
    pub fn set_retrieval_enabled(&self, enabled: bool) -> Result<(), LayerError> {
        if enabled && !self.loader.has_url_builder() {
            return Err(LayerError::MissingUrlBuilder);
        }
        if enabled == self.loader.is_retrieval_enabled() {
            return Ok(());
        }

        info!(enabled, "Retrieval toggled");
        self.loader.set_retrieval_enabled(enabled);
        if enabled {
            self.reset_absent();
        }
        Ok(())
    }

    pub fn set_detail_hint(&mut self, hint: f64) {
        self.selector.set_detail_hint(hint);
    }

    pub fn tile_state(&self, key: &TileKey) -> TileState {
        self.selector.tile_state(key, &self.cache)
    }

    pub fn cache(&self) -> &Arc<TileCache> {
        &self.cache
    }

    pub fn pyramid(&self) -> &Arc<LevelSet> {
        &self.pyramid
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn stats(&self) -> LayerStats {
        LayerStats {
            frames: self.selector.frame(),
            render_tiles: self.render_list.len(),
            fallback_tiles: self.render_list.iter().filter(|t| t.fallback.is_some()).count(),
            absent_tiles: self.pyramid.absent_count(),
            last_schedule: self.last_schedule,
            cache: self.cache.stats(),
            loader: self.loader.stats(),
            retrieval: self.loader.retrieval_stats(),
        }
    }

    /// Stops background work. Queued retrievals are abandoned; tile state is
    /// left as it is.
    pub fn shutdown(&self) {
        if !self.loader.is_shut_down() {
            info!(source = %self.config.source.cache_name, "Tiled layer shutting down");
            self.loader.shutdown();
        }
    }
}

impl std::fmt::Debug for TiledLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledLayer")
            .field("source", &self.config.source.cache_name)
            .field("render_tiles", &self.render_list.len())
            .field("cache", &self.cache)
            .field("loader", &self.loader)
            .finish()
    }
}

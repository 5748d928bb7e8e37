//! tilestream - Adaptive quadtree tile streaming
//!
//! This library decides, frame by frame, which tiles of a multi-resolution
//! geographic raster pyramid should be drawn, loads missing tiles in the
//! background from a local cache or a remote source, and draws coarser
//! ancestors in their place while data is in flight.
//!
//! # Architecture
//!
//! ```text
//!   View ──► Selector ──► RequestScheduler ──► Loader
//!              │  ▲                              │
//!              │  └──── TileCache ◄──────────────┤ decode pool
//!              │        AbsentRegistry ◄─────────┤ retrieval pool
//!              ▼                                 ▼
//!         render list                      ChangeNotifier
//! ```
//!
//! [`layer::TiledLayer`] owns and wires all of the above for one data source.
//!
//! # Modules
//!
//! - [`coord`]: tile keys, sectors and points
//! - [`pyramid`]: level geometry and absent registries
//! - [`tile`]: tiles, render entries and load requests
//! - [`cache`]: bounded memory cache and persistent cache
//! - [`selector`]: per-frame quadtree refinement
//! - [`scheduler`]: per-frame request de-duplication and dispatch
//! - [`loader`]: load tasks and response post-processing
//! - [`executor`]: decode and retrieval worker pools
//! - [`provider`]: retrieval, URL building and host status
//! - [`decode`]: payload decoding
//! - [`notify`]: change notifications
//! - [`config`], [`logging`]: configuration file and tracing setup

pub mod cache;
pub mod config;
pub mod coord;
pub mod decode;
pub mod executor;
pub mod layer;
pub mod loader;
pub mod logging;
pub mod notify;
pub mod provider;
pub mod pyramid;
pub mod scheduler;
pub mod selector;
pub mod tile;
pub mod view;

pub use config::StreamConfig;
pub use coord::{Sector, TileKey};
pub use layer::{LayerError, LayerStats, TiledLayer, TiledLayerBuilder};
pub use notify::{ChangeEvent, SubscriptionId};
pub use pyramid::{Level, LevelSet};
pub use tile::RenderTile;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Coordinate module
//!
//! Provides the tile identity type and the geographic primitives the rest of
//! the engine is built on: sectors (geographic rectangles in degrees), view
//! space points and axis-aligned bounding volumes.

mod types;

pub use types::{BoundingBox, CoordError, Point3, Sector, TileKey, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

pub(crate) use types::cmp_f64;

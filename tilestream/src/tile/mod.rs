//! Tile value types.
//!
//! - [`GeoTile`]: one materialised pyramid cell with lazily computed geometry
//! - [`TileState`]: resource state, derived from cache and absent registry
//! - [`RenderTile`]: an entry in the render list, optionally drawn from a
//!   [`Fallback`] ancestor
//! - [`LoadRequest`]: a request for tile data emitted by the selector

mod request;
mod transform;

pub use request::LoadRequest;
pub use transform::UvTransform;

use std::cell::OnceCell;

use crate::coord::{BoundingBox, Point3, Sector, TileKey};

/// Resource state of a tile.
///
/// This is never stored on the tile. It is derived on demand from cache
/// membership and the absent registry so the two cannot disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    Unloaded,
    Loaded,
    Absent,
}

/// One cell of the pyramid.
///
/// Tiles are cheap and live in the selector's arena. The expensive loaded
/// resource is held by the tile cache and looked up by key.
#[derive(Debug)]
pub struct GeoTile {
    key: TileKey,
    sector: Sector,
    bounding: OnceCell<BoundingBox>,
    reference_points: OnceCell<Vec<Point3>>,
    /// Frame number in which the selector last visited this tile.
    pub(crate) last_visited: u64,
}

impl GeoTile {
    pub fn new(key: TileKey, sector: Sector) -> Self {
        Self {
            key,
            sector,
            bounding: OnceCell::new(),
            reference_points: OnceCell::new(),
            last_visited: 0,
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    /// Bounding volume, computed on first use.
    pub fn bounding_box(&self) -> &BoundingBox {
        self.bounding.get_or_init(|| BoundingBox::from_sector(&self.sector))
    }

    /// Centre of the bounding volume.
    pub fn center(&self) -> Point3 {
        self.bounding_box().center()
    }

    /// Corner and centre points for the render backend, computed on first use.
    pub fn reference_points(&self) -> &[Point3] {
        self.reference_points.get_or_init(|| {
            let (lat, lon) = self.sector.centroid();
            self.sector
                .corners()
                .iter()
                .map(|&(lat, lon)| Point3::surface(lat, lon))
                .chain(std::iter::once(Point3::surface(lat, lon)))
                .collect()
        })
    }
}

/// Ancestor data substituting for a tile whose own data is not loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallback {
    pub ancestor: TileKey,
    pub ancestor_sector: Sector,
    pub uv: UvTransform,
}

impl Fallback {
    pub fn new(tile_sector: &Sector, ancestor: TileKey, ancestor_sector: Sector) -> Self {
        Self {
            ancestor,
            ancestor_sector,
            uv: UvTransform::between(tile_sector, &ancestor_sector),
        }
    }
}

/// A tile in the render list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTile {
    pub key: TileKey,
    pub sector: Sector,
    pub fallback: Option<Fallback>,
}

impl RenderTile {
    /// A tile drawn with its own loaded data.
    pub fn loaded(key: TileKey, sector: Sector) -> Self {
        Self {
            key,
            sector,
            fallback: None,
        }
    }

    /// A tile drawn from an ancestor's data.
    pub fn with_fallback(key: TileKey, sector: Sector, ancestor: TileKey, ancestor_sector: Sector) -> Self {
        Self {
            key,
            sector,
            fallback: Some(Fallback::new(&sector, ancestor, ancestor_sector)),
        }
    }

    /// Key of the cache entry whose data this tile draws.
    pub fn data_key(&self) -> TileKey {
        self.fallback.map_or(self.key, |f| f.ancestor)
    }

    /// Texture mapping to apply when drawing.
    pub fn uv(&self) -> UvTransform {
        self.fallback.map_or(UvTransform::IDENTITY, |f| f.uv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Sector {
        Sector::new(min_lat, max_lat, min_lon, max_lon).unwrap()
    }

    #[test]
    fn test_geo_tile_lazy_geometry() {
        let tile = GeoTile::new(TileKey::new(1, 0, 0), sector(0.0, 10.0, 20.0, 30.0));

        assert_eq!(tile.center(), Point3::new(25.0, 5.0, 0.0));
        let points = tile.reference_points();
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], Point3::surface(0.0, 20.0));
        assert_eq!(points[4], Point3::surface(5.0, 25.0));
    }

    #[test]
    fn test_render_tile_without_fallback() {
        let key = TileKey::new(3, 1, 2);
        let tile = RenderTile::loaded(key, sector(0.0, 1.0, 0.0, 1.0));
        assert_eq!(tile.data_key(), key);
        assert_eq!(tile.uv(), UvTransform::IDENTITY);
    }

    #[test]
    fn test_render_tile_with_fallback() {
        let key = TileKey::new(2, 5, 5);
        let ancestor = TileKey::new(1, 2, 2);
        let tile = RenderTile::with_fallback(
            key,
            sector(10.0, 20.0, 10.0, 20.0),
            ancestor,
            sector(0.0, 40.0, 0.0, 40.0),
        );

        assert_eq!(tile.data_key(), ancestor);
        assert_eq!(tile.uv().uv_bounds(), ((0.25, 0.5), (0.25, 0.5)));
    }
}

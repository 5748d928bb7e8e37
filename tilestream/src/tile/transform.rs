//! Texture-space remapping for fallback rendering.
//!
//! When a tile is drawn with a coarser ancestor's data, the renderer samples
//! the sub-rectangle of the ancestor's texture that covers the tile. The
//! transform is derived purely from the two sectors.

use crate::coord::Sector;

/// Affine map from a tile's unit texture space into its ancestor's.
///
/// `u` runs along longitude, `v` along latitude, both from the ancestor's
/// minimum corner. A point `(s, t)` in the tile maps to
/// `(u_offset + s * u_scale, v_offset + t * v_scale)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvTransform {
    pub u_offset: f64,
    pub v_offset: f64,
    pub u_scale: f64,
    pub v_scale: f64,
}

impl UvTransform {
    /// The identity mapping, used when a tile draws its own data.
    pub const IDENTITY: UvTransform = UvTransform {
        u_offset: 0.0,
        v_offset: 0.0,
        u_scale: 1.0,
        v_scale: 1.0,
    };

    /// Computes the mapping of `tile` into `ancestor`.
    pub fn between(tile: &Sector, ancestor: &Sector) -> Self {
        let width = ancestor.delta_lon();
        let height = ancestor.delta_lat();
        Self {
            u_offset: (tile.min_lon - ancestor.min_lon) / width,
            v_offset: (tile.min_lat - ancestor.min_lat) / height,
            u_scale: tile.delta_lon() / width,
            v_scale: tile.delta_lat() / height,
        }
    }

    /// Maps a tile-space coordinate into ancestor space.
    pub fn apply(&self, s: f64, t: f64) -> (f64, f64) {
        (
            self.u_offset + s * self.u_scale,
            self.v_offset + t * self.v_scale,
        )
    }

    /// The ancestor-space rectangle covered by the tile, as
    /// `((u_min, u_max), (v_min, v_max))`.
    pub fn uv_bounds(&self) -> ((f64, f64), (f64, f64)) {
        (
            (self.u_offset, self.u_offset + self.u_scale),
            (self.v_offset, self.v_offset + self.v_scale),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Sector {
        Sector::new(min_lat, max_lat, min_lon, max_lon).unwrap()
    }

    #[test]
    fn test_sub_quadrant_mapping() {
        let tile = sector(10.0, 20.0, 10.0, 20.0);
        let ancestor = sector(0.0, 40.0, 0.0, 40.0);
        let uv = UvTransform::between(&tile, &ancestor);

        assert_eq!(uv.uv_bounds(), ((0.25, 0.5), (0.25, 0.5)));
        assert_eq!(uv.apply(0.0, 0.0), (0.25, 0.25));
        assert_eq!(uv.apply(1.0, 1.0), (0.5, 0.5));
    }

    #[test]
    fn test_same_sector_is_identity() {
        let s = sector(-45.0, 45.0, 90.0, 180.0);
        assert_eq!(UvTransform::between(&s, &s), UvTransform::IDENTITY);
    }

    #[test]
    fn test_non_square_ancestor() {
        let tile = sector(0.0, 10.0, 60.0, 80.0);
        let ancestor = sector(0.0, 20.0, 0.0, 80.0);
        let uv = UvTransform::between(&tile, &ancestor);

        assert_eq!(uv.uv_bounds(), ((0.75, 1.0), (0.0, 0.5)));
    }
}

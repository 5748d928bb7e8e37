//! Coordinate value types: tile identity, geographic sectors and 3D points.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

/// Minimum latitude in degrees.
pub const MIN_LAT: f64 = -90.0;

/// Maximum latitude in degrees.
pub const MAX_LAT: f64 = 90.0;

/// Minimum longitude in degrees.
pub const MIN_LON: f64 = -180.0;

/// Maximum longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// Coordinate validation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid level: {level} (pyramid has {count} levels)")]
    InvalidLevel { level: u32, count: usize },

    #[error("Tile row {row} out of range for level {level} (0..{rows})")]
    InvalidRow { level: u32, row: i64, rows: u32 },

    #[error("Tile column {col} out of range for level {level} (0..{cols})")]
    InvalidColumn { level: u32, col: i64, cols: u32 },

    #[error("Invalid sector: lat [{min_lat}, {max_lat}], lon [{min_lon}, {max_lon}]")]
    InvalidSector {
        min_lat: f64,
        max_lat: f64,
        min_lon: f64,
        max_lon: f64,
    },
}

// =============================================================================
// Tile Key
// =============================================================================

/// Identity of one pyramid cell.
///
/// Keys order lexicographically by level, then row, then column. The ordering
/// is used to break priority ties deterministically.
///
/// # Example
///
/// ```
/// use tilestream::coord::TileKey;
///
/// let key = TileKey::new(2, 3, 4);
/// assert_eq!(key.level(), 2);
/// assert_eq!(key.children()[3], TileKey::new(3, 7, 9));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    level: u32,
    row: u32,
    col: u32,
}

impl TileKey {
    /// Creates a new tile key.
    pub const fn new(level: u32, row: u32, col: u32) -> Self {
        Self { level, row, col }
    }

    /// Creates a key from signed row/column values, rejecting negatives.
    pub fn checked(level: u32, row: i64, col: i64) -> Result<Self, CoordError> {
        let row = u32::try_from(row).map_err(|_| CoordError::InvalidRow {
            level,
            row,
            rows: 0,
        })?;
        let col = u32::try_from(col).map_err(|_| CoordError::InvalidColumn {
            level,
            col,
            cols: 0,
        })?;
        Ok(Self::new(level, row, col))
    }

    /// Pyramid level (0 is coarsest).
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Row index, counted northward from the tile origin.
    pub fn row(&self) -> u32 {
        self.row
    }

    /// Column index, counted eastward from the tile origin.
    pub fn col(&self) -> u32 {
        self.col
    }

    /// The four children at the next level, in SW, SE, NW, NE order.
    pub fn children(&self) -> [TileKey; 4] {
        let level = self.level + 1;
        let row = self.row * 2;
        let col = self.col * 2;
        [
            TileKey::new(level, row, col),
            TileKey::new(level, row, col + 1),
            TileKey::new(level, row + 1, col),
            TileKey::new(level, row + 1, col + 1),
        ]
    }

    /// The parent at the previous level, if any.
    pub fn parent(&self) -> Option<TileKey> {
        if self.level == 0 {
            return None;
        }
        Some(TileKey::new(self.level - 1, self.row / 2, self.col / 2))
    }

    /// Relative data path for this tile inside a persistent cache.
    ///
    /// Layout: `{cache_name}/{level}/{row}/{row}_{col}{suffix}`.
    pub fn data_path(&self, cache_name: &str, suffix: &str) -> String {
        format!(
            "{}/{}/{}/{}_{}{}",
            cache_name, self.level, self.row, self.row, self.col, suffix
        )
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.row, self.col)
    }
}

// =============================================================================
// Sector
// =============================================================================

/// Geographic rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sector {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Sector {
    /// Creates a sector, validating that the bounds are ordered and finite.
    pub fn new(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> Result<Self, CoordError> {
        let finite = [min_lat, max_lat, min_lon, max_lon]
            .iter()
            .all(|v| v.is_finite());
        if !finite || min_lat > max_lat || min_lon > max_lon {
            return Err(CoordError::InvalidSector {
                min_lat,
                max_lat,
                min_lon,
                max_lon,
            });
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lon,
            max_lon,
        })
    }

    /// The whole globe.
    pub const FULL_SPHERE: Sector = Sector {
        min_lat: MIN_LAT,
        max_lat: MAX_LAT,
        min_lon: MIN_LON,
        max_lon: MAX_LON,
    };

    pub fn delta_lat(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn delta_lon(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    pub fn area(&self) -> f64 {
        self.delta_lat() * self.delta_lon()
    }

    /// Centre as `(lat, lon)`.
    pub fn centroid(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    /// True if the two sectors share interior area.
    ///
    /// Sectors that merely touch along an edge do not intersect.
    pub fn intersects(&self, other: &Sector) -> bool {
        self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
            && self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
    }

    /// The overlapping sector, if any.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if !self.intersects(other) {
            return None;
        }
        Some(Sector {
            min_lat: self.min_lat.max(other.min_lat),
            max_lat: self.max_lat.min(other.max_lat),
            min_lon: self.min_lon.max(other.min_lon),
            max_lon: self.max_lon.min(other.max_lon),
        })
    }

    /// True if `other` lies entirely within this sector.
    pub fn contains(&self, other: &Sector) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lon >= self.min_lon
            && other.max_lon <= self.max_lon
    }

    /// Corners as `(lat, lon)` in SW, SE, NE, NW order.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_lat, self.min_lon),
            (self.min_lat, self.max_lon),
            (self.max_lat, self.max_lon),
            (self.max_lat, self.min_lon),
        ]
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}] x [{:.4}, {:.4}]",
            self.min_lat, self.max_lat, self.min_lon, self.max_lon
        )
    }
}

// =============================================================================
// Points and Bounding Volumes
// =============================================================================

/// A point in view space.
///
/// `x` is longitude, `y` is latitude (both degrees) and `z` is height above the
/// surface expressed in the same angular units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Point on the surface at the given latitude/longitude.
    pub fn surface(lat: f64, lon: f64) -> Self {
        Self::new(lon, lat, 0.0)
    }

    pub fn distance_squared(&self, other: &Point3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Point3) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// Axis-aligned bounding box used as a tile's bounding volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    /// Box over a sector at surface height.
    pub fn from_sector(sector: &Sector) -> Self {
        Self {
            min: Point3::new(sector.min_lon, sector.min_lat, 0.0),
            max: Point3::new(sector.max_lon, sector.max_lat, 0.0),
        }
    }

    pub fn center(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Distance from `point` to the nearest point of the box.
    pub fn distance_to(&self, point: &Point3) -> f64 {
        let clamp = |v: f64, lo: f64, hi: f64| v.max(lo).min(hi);
        let nearest = Point3::new(
            clamp(point.x, self.min.x, self.max.x),
            clamp(point.y, self.min.y, self.max.y),
            clamp(point.z, self.min.z, self.max.z),
        );
        nearest.distance(point)
    }

    /// Projection of the box onto the surface as a sector.
    pub fn footprint(&self) -> Sector {
        Sector {
            min_lat: self.min.y,
            max_lat: self.max.y,
            min_lon: self.min.x,
            max_lon: self.max.x,
        }
    }
}

/// Total order for distances that are never NaN in practice.
pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

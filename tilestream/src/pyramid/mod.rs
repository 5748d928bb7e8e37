//! Multi-resolution level set.
//!
//! A [`LevelSet`] describes the pyramid geometry: the covered sector, the tile
//! origin and an ordered list of [`Level`]s from coarsest (level 0) to finest.
//! Each level halves the tile delta of the previous one, so every tile has
//! exactly four children.
//!
//! Geometry is immutable after construction. The only mutable state is the
//! per-level [`AbsentRegistry`].
//!
//! # Example
//!
//! ```
//! use tilestream::coord::{Sector, TileKey};
//! use tilestream::pyramid::LevelSet;
//!
//! let pyramid = LevelSet::uniform(Sector::FULL_SPHERE, 36.0, 5, 512, 512).unwrap();
//! assert_eq!(pyramid.num_levels(), 5);
//! assert_eq!(pyramid.top_level_keys().len(), 50);
//!
//! let sector = pyramid.tile_sector(&TileKey::new(0, 0, 0));
//! assert_eq!((sector.min_lat, sector.max_lat), (-90.0, -54.0));
//! ```

mod absent;

pub use absent::AbsentRegistry;

use thiserror::Error;
use tracing::info;

use crate::coord::{CoordError, Sector, TileKey, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Tolerance for floating point comparisons of level geometry.
const GEOMETRY_EPSILON: f64 = 1e-9;

/// Errors raised while building a level set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PyramidError {
    #[error("Level set must contain at least one level")]
    NoLevels,

    #[error("Level {level} has non-positive tile delta ({delta_lat}, {delta_lon})")]
    InvalidDelta {
        level: u32,
        delta_lat: f64,
        delta_lon: f64,
    },

    #[error("Level {level} delta must be half of level {previous}")]
    NotQuadtree { level: u32, previous: u32 },

    #[error("Level {level} has zero tile dimensions")]
    InvalidTileSize { level: u32 },

    #[error(transparent)]
    Coord(#[from] CoordError),
}

// =============================================================================
// Level
// =============================================================================

/// One resolution level of the pyramid.
#[derive(Debug)]
pub struct Level {
    index: u32,
    delta_lat: f64,
    delta_lon: f64,
    tile_width: u32,
    tile_height: u32,
    empty: bool,
    absent: AbsentRegistry,
}

impl Level {
    /// Creates a level with the given tile delta (degrees) and pixel size.
    ///
    /// The index is assigned when the level is added to a [`LevelSet`].
    pub fn new(delta_lat: f64, delta_lon: f64, tile_width: u32, tile_height: u32) -> Self {
        Self {
            index: 0,
            delta_lat,
            delta_lon,
            tile_width,
            tile_height,
            empty: false,
            absent: AbsentRegistry::new(),
        }
    }

    /// Marks this level as having no backing data.
    pub fn empty(mut self) -> Self {
        self.empty = true;
        self
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn delta_lat(&self) -> f64 {
        self.delta_lat
    }

    pub fn delta_lon(&self) -> f64 {
        self.delta_lon
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    /// True if no data source backs this level.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Texel size in degrees per pixel along latitude.
    pub fn texel_size(&self) -> f64 {
        self.delta_lat / self.tile_height as f64
    }

    pub fn absent(&self) -> &AbsentRegistry {
        &self.absent
    }
}

// =============================================================================
// Level Set
// =============================================================================

/// The pyramid: geometry for every level plus the absent registries.
#[derive(Debug)]
pub struct LevelSet {
    sector: Sector,
    origin_lat: f64,
    origin_lon: f64,
    levels: Vec<Level>,
}

impl LevelSet {
    /// Builds a level set with the tile origin at (-90, -180).
    pub fn new(sector: Sector, levels: Vec<Level>) -> Result<Self, PyramidError> {
        Self::with_origin(sector, MIN_LAT, MIN_LON, levels)
    }

    /// Builds a level set with an explicit tile origin.
    pub fn with_origin(
        sector: Sector,
        origin_lat: f64,
        origin_lon: f64,
        mut levels: Vec<Level>,
    ) -> Result<Self, PyramidError> {
        if levels.is_empty() {
            return Err(PyramidError::NoLevels);
        }
        Sector::new(sector.min_lat, sector.max_lat, sector.min_lon, sector.max_lon)?;

        for (i, level) in levels.iter_mut().enumerate() {
            level.index = i as u32;
        }
        for level in &levels {
            if level.delta_lat <= 0.0 || level.delta_lon <= 0.0 {
                return Err(PyramidError::InvalidDelta {
                    level: level.index,
                    delta_lat: level.delta_lat,
                    delta_lon: level.delta_lon,
                });
            }
            if level.tile_width == 0 || level.tile_height == 0 {
                return Err(PyramidError::InvalidTileSize { level: level.index });
            }
        }
        for pair in levels.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            let halves = (prev.delta_lat / 2.0 - next.delta_lat).abs() < GEOMETRY_EPSILON
                && (prev.delta_lon / 2.0 - next.delta_lon).abs() < GEOMETRY_EPSILON;
            if !halves {
                return Err(PyramidError::NotQuadtree {
                    level: next.index,
                    previous: prev.index,
                });
            }
        }

        info!(
            levels = levels.len(),
            sector = %sector,
            level_zero_delta = levels[0].delta_lat,
            "Level set created"
        );

        Ok(Self {
            sector,
            origin_lat,
            origin_lon,
            levels,
        })
    }

    /// Builds `num_levels` square levels starting from `level_zero_delta` degrees.
    pub fn uniform(
        sector: Sector,
        level_zero_delta: f64,
        num_levels: u32,
        tile_width: u32,
        tile_height: u32,
    ) -> Result<Self, PyramidError> {
        let levels = (0..num_levels)
            .map(|i| {
                let delta = level_zero_delta / f64::from(1u32 << i.min(31));
                Level::new(delta, delta, tile_width, tile_height)
            })
            .collect();
        Self::new(sector, levels)
    }

    /// The sector covered by data.
    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: u32) -> Option<&Level> {
        self.levels.get(index as usize)
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    /// True if `level` is the finest level.
    pub fn is_final_level(&self, level: u32) -> bool {
        level as usize + 1 >= self.levels.len()
    }

    /// True if the level exists and has no backing data.
    pub fn is_level_empty(&self, level: u32) -> bool {
        self.level(level).map_or(true, Level::is_empty)
    }

    /// Number of rows and columns in the full grid of a level.
    pub fn grid_size(&self, level: &Level) -> (u32, u32) {
        let rows = ((MAX_LAT - self.origin_lat) / level.delta_lat - GEOMETRY_EPSILON).ceil();
        let cols = ((MAX_LON - self.origin_lon) / level.delta_lon - GEOMETRY_EPSILON).ceil();
        (rows.max(1.0) as u32, cols.max(1.0) as u32)
    }

    /// Validates that a key names a tile in this pyramid.
    pub fn validate_key(&self, key: &TileKey) -> Result<(), CoordError> {
        let level = self.level(key.level()).ok_or(CoordError::InvalidLevel {
            level: key.level(),
            count: self.levels.len(),
        })?;
        let (rows, cols) = self.grid_size(level);
        if key.row() >= rows {
            return Err(CoordError::InvalidRow {
                level: key.level(),
                row: i64::from(key.row()),
                rows,
            });
        }
        if key.col() >= cols {
            return Err(CoordError::InvalidColumn {
                level: key.level(),
                col: i64::from(key.col()),
                cols,
            });
        }
        Ok(())
    }

    /// Geographic sector of a tile, derived from its key.
    ///
    /// Keys at levels beyond the pyramid extrapolate by halving the finest
    /// delta; callers are expected to validate keys they did not construct.
    pub fn tile_sector(&self, key: &TileKey) -> Sector {
        let (delta_lat, delta_lon) = self.deltas(key.level());
        let min_lat = self.origin_lat + f64::from(key.row()) * delta_lat;
        let min_lon = self.origin_lon + f64::from(key.col()) * delta_lon;
        Sector {
            min_lat,
            max_lat: min_lat + delta_lat,
            min_lon,
            max_lon: min_lon + delta_lon,
        }
    }

    /// Keys of all level-0 tiles overlapping the covered sector.
    pub fn top_level_keys(&self) -> Vec<TileKey> {
        let level = &self.levels[0];
        let first_row = ((self.sector.min_lat - self.origin_lat) / level.delta_lat + GEOMETRY_EPSILON)
            .floor()
            .max(0.0) as u32;
        let last_row = ((self.sector.max_lat - self.origin_lat) / level.delta_lat - GEOMETRY_EPSILON)
            .ceil()
            .max(1.0) as u32
            - 1;
        let first_col = ((self.sector.min_lon - self.origin_lon) / level.delta_lon + GEOMETRY_EPSILON)
            .floor()
            .max(0.0) as u32;
        let last_col = ((self.sector.max_lon - self.origin_lon) / level.delta_lon - GEOMETRY_EPSILON)
            .ceil()
            .max(1.0) as u32
            - 1;

        let mut keys = Vec::new();
        for row in first_row..=last_row {
            for col in first_col..=last_col {
                keys.push(TileKey::new(0, row, col));
            }
        }
        keys
    }

    // -------------------------------------------------------------------------
    // Absent registry
    // -------------------------------------------------------------------------

    pub fn is_absent(&self, key: &TileKey) -> bool {
        self.level(key.level())
            .is_some_and(|level| level.absent.contains(key))
    }

    /// Marks a tile absent. Returns `true` if the mark is new.
    pub fn mark_absent(&self, key: TileKey) -> bool {
        self.level(key.level())
            .is_some_and(|level| level.absent.mark(key))
    }

    /// Clears a tile's absent mark. Returns `true` if it was marked.
    pub fn clear_absent(&self, key: &TileKey) -> bool {
        self.level(key.level())
            .is_some_and(|level| level.absent.unmark(key))
    }

    /// Clears every absent mark on every level.
    pub fn reset_absent(&self) -> usize {
        self.levels.iter().map(|level| level.absent.clear()).sum()
    }

    pub fn absent_count(&self) -> usize {
        self.levels.iter().map(|level| level.absent.len()).sum()
    }

    fn deltas(&self, level: u32) -> (f64, f64) {
        match self.level(level) {
            Some(l) => (l.delta_lat, l.delta_lon),
            None => {
                let finest = &self.levels[self.levels.len() - 1];
                let extra = level - finest.index;
                let scale = 2f64.powi(extra as i32);
                (finest.delta_lat / scale, finest.delta_lon / scale)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_sphere() -> LevelSet {
        LevelSet::uniform(Sector::FULL_SPHERE, 36.0, 4, 512, 512).unwrap()
    }

    #[test]
    fn test_uniform_levels_halve() {
        let pyramid = full_sphere();
        let deltas: Vec<f64> = pyramid.levels().iter().map(Level::delta_lat).collect();
        assert_eq!(deltas, vec![36.0, 18.0, 9.0, 4.5]);
        assert_eq!(pyramid.level(2).unwrap().index(), 2);
        assert!(pyramid.is_final_level(3));
        assert!(!pyramid.is_final_level(2));
    }

    #[test]
    fn test_rejects_empty_level_list() {
        assert_eq!(
            LevelSet::new(Sector::FULL_SPHERE, vec![]).unwrap_err(),
            PyramidError::NoLevels
        );
    }

    #[test]
    fn test_rejects_non_halving_levels() {
        let levels = vec![
            Level::new(36.0, 36.0, 512, 512),
            Level::new(12.0, 12.0, 512, 512),
        ];
        assert!(matches!(
            LevelSet::new(Sector::FULL_SPHERE, levels),
            Err(PyramidError::NotQuadtree { level: 1, previous: 0 })
        ));
    }

    #[test]
    fn test_rejects_zero_tile_size() {
        let levels = vec![Level::new(36.0, 36.0, 0, 512)];
        assert!(matches!(
            LevelSet::new(Sector::FULL_SPHERE, levels),
            Err(PyramidError::InvalidTileSize { level: 0 })
        ));
    }

    #[test]
    fn test_top_level_keys_full_sphere() {
        let pyramid = full_sphere();
        let keys = pyramid.top_level_keys();
        // 180/36 rows by 360/36 columns
        assert_eq!(keys.len(), 5 * 10);
        assert_eq!(keys[0], TileKey::new(0, 0, 0));
        assert_eq!(keys[keys.len() - 1], TileKey::new(0, 4, 9));
    }

    #[test]
    fn test_top_level_keys_partial_sector() {
        let sector = Sector::new(10.0, 40.0, 0.0, 30.0).unwrap();
        let pyramid = LevelSet::uniform(sector, 36.0, 3, 256, 256).unwrap();
        let keys = pyramid.top_level_keys();

        // lat 10..40 spans rows 2 (-18..18) and 3 (18..54); lon 0..30 is column 5
        assert_eq!(keys, vec![TileKey::new(0, 2, 5), TileKey::new(0, 3, 5)]);
    }

    #[test]
    fn test_tile_sector_derived_from_key() {
        let pyramid = full_sphere();
        let sector = pyramid.tile_sector(&TileKey::new(1, 5, 10));
        assert_eq!(sector.min_lat, -90.0 + 5.0 * 18.0);
        assert_eq!(sector.max_lat, -90.0 + 6.0 * 18.0);
        assert_eq!(sector.min_lon, -180.0 + 10.0 * 18.0);
        assert_eq!(sector.max_lon, -180.0 + 11.0 * 18.0);
    }

    #[test]
    fn test_children_tile_parent_sector() {
        let pyramid = full_sphere();
        let parent = TileKey::new(1, 3, 7);
        let parent_sector = pyramid.tile_sector(&parent);
        let area: f64 = parent
            .children()
            .iter()
            .map(|child| {
                let s = pyramid.tile_sector(child);
                assert!(parent_sector.contains(&s));
                s.area()
            })
            .sum();
        assert!((area - parent_sector.area()).abs() < 1e-9);
    }

    #[test]
    fn test_validate_key() {
        let pyramid = full_sphere();
        assert!(pyramid.validate_key(&TileKey::new(0, 4, 9)).is_ok());
        assert!(matches!(
            pyramid.validate_key(&TileKey::new(0, 5, 0)),
            Err(CoordError::InvalidRow { rows: 5, .. })
        ));
        assert!(matches!(
            pyramid.validate_key(&TileKey::new(0, 0, 10)),
            Err(CoordError::InvalidColumn { cols: 10, .. })
        ));
        assert!(matches!(
            pyramid.validate_key(&TileKey::new(9, 0, 0)),
            Err(CoordError::InvalidLevel { level: 9, count: 4 })
        ));
    }

    #[test]
    fn test_absent_registry_per_level() {
        let pyramid = full_sphere();
        let key = TileKey::new(2, 3, 4);

        assert!(pyramid.mark_absent(key));
        assert!(pyramid.is_absent(&key));
        assert!(pyramid.level(2).unwrap().absent().contains(&key));
        assert!(pyramid.level(1).unwrap().absent().is_empty());

        pyramid.mark_absent(TileKey::new(1, 0, 0));
        assert_eq!(pyramid.absent_count(), 2);
        assert_eq!(pyramid.reset_absent(), 2);
        assert!(!pyramid.is_absent(&key));
    }

    #[test]
    fn test_absent_ignores_unknown_levels() {
        let pyramid = full_sphere();
        let key = TileKey::new(12, 0, 0);
        assert!(!pyramid.mark_absent(key));
        assert!(!pyramid.is_absent(&key));
    }

    #[test]
    fn test_empty_level_flag() {
        let levels = vec![
            Level::new(36.0, 36.0, 512, 512).empty(),
            Level::new(18.0, 18.0, 512, 512),
        ];
        let pyramid = LevelSet::new(Sector::FULL_SPHERE, levels).unwrap();
        assert!(pyramid.is_level_empty(0));
        assert!(!pyramid.is_level_empty(1));
        assert!(pyramid.is_level_empty(7));
    }
}

//! Load request types.
//!
//! A `LoadRequest` is what the selector emits for a tile that needs data. The
//! priority is the squared distance from the viewpoint to the tile centre, so
//! lower values are more urgent.

use std::cmp::Ordering;

use crate::coord::{cmp_f64, TileKey};

/// Request to load data for one tile.
///
/// # Example
///
/// ```
/// use tilestream::coord::TileKey;
/// use tilestream::tile::LoadRequest;
///
/// let near = LoadRequest::new(TileKey::new(3, 1, 1), 10.0);
/// let far = LoadRequest::new(TileKey::new(3, 0, 0), 1000.0);
/// assert!(near.is_more_urgent_than(&far));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadRequest {
    key: TileKey,
    /// Squared distance from the viewpoint to the tile centre.
    priority: f64,
}

impl LoadRequest {
    pub fn new(key: TileKey, priority: f64) -> Self {
        Self { key, priority }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    /// Urgency order: lower priority value first, ties broken by key.
    pub fn urgency_cmp(&self, other: &Self) -> Ordering {
        cmp_f64(self.priority, other.priority).then_with(|| self.key.cmp(&other.key))
    }

    pub fn is_more_urgent_than(&self, other: &Self) -> bool {
        self.urgency_cmp(other) == Ordering::Less
    }
}

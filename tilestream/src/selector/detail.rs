//! View-dependent detail metric.
//!
//! A tile needs splitting when its texel size is large compared to its
//! distance from the eye:
//!
//! ```text
//! log10(texel_size) > log10(distance) - (DETAIL_HINT_ORIGIN + detail_hint)
//! ```
//!
//! Raising `detail_hint` refines further (sharper, more tiles); lowering it
//! coarsens the selection.

use crate::coord::{BoundingBox, Point3};
use crate::pyramid::Level;

/// Baseline detail factor; `detail_hint` is applied on top.
pub const DETAIL_HINT_ORIGIN: f64 = 2.8;

/// Distance floor so an eye on the surface still yields a finite metric.
const MIN_EYE_DISTANCE: f64 = 1e-9;

/// Screen-space error style split decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetailMetric {
    detail_hint: f64,
}

impl DetailMetric {
    pub fn new(detail_hint: f64) -> Self {
        Self { detail_hint }
    }

    pub fn detail_hint(&self) -> f64 {
        self.detail_hint
    }

    /// True if a tile of `level` with the given bounds should be refined.
    pub fn needs_split(&self, level: &Level, bounds: &BoundingBox, eye: &Point3) -> bool {
        let distance = bounds.distance_to(eye).max(MIN_EYE_DISTANCE);
        level.texel_size().log10() > distance.log10() - (DETAIL_HINT_ORIGIN + self.detail_hint)
    }
}

impl Default for DetailMetric {
    fn default() -> Self {
        Self::new(0.0)
    }
}

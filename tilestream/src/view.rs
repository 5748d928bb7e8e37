//! View abstraction consumed by the selector.
//!
//! Camera and frustum math belong to the render backend. The selector only
//! needs the eye point, the visible region of the surface and a frustum test
//! against tile bounding volumes.

use crate::coord::{BoundingBox, Point3, Sector, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// The current view, as seen by the selector.
pub trait View {
    /// Eye position in view space.
    fn eye_point(&self) -> Point3;

    /// The part of the surface that can be visible, or `None` if the view
    /// does not see the surface at all.
    fn visible_region(&self) -> Option<Sector>;

    /// True if the bounding volume intersects the view frustum.
    fn frustum_intersects(&self, bounds: &BoundingBox) -> bool;
}

/// A view defined by an eye point and a visible surface region.
///
/// The frustum test is the overlap between the region and the volume's
/// footprint. Used by the CLI driver and by tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionView {
    eye: Point3,
    region: Option<Sector>,
}

impl RegionView {
    pub fn new(eye: Point3, region: Option<Sector>) -> Self {
        Self { eye, region }
    }

    /// Looks straight down at `(lat, lon)` from `altitude`, seeing a square of
    /// `half_extent` degrees around the point, clamped to the globe.
    pub fn looking_down(lat: f64, lon: f64, altitude: f64, half_extent: f64) -> Self {
        let region = Sector {
            min_lat: (lat - half_extent).max(MIN_LAT),
            max_lat: (lat + half_extent).min(MAX_LAT),
            min_lon: (lon - half_extent).max(MIN_LON),
            max_lon: (lon + half_extent).min(MAX_LON),
        };
        Self {
            eye: Point3::new(lon, lat, altitude),
            region: Some(region),
        }
    }
}

impl View for RegionView {
    fn eye_point(&self) -> Point3 {
        self.eye
    }

    fn visible_region(&self) -> Option<Sector> {
        self.region
    }

    fn frustum_intersects(&self, bounds: &BoundingBox) -> bool {
        self.region
            .is_some_and(|region| region.intersects(&bounds.footprint()))
    }
}

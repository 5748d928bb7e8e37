//! Per-frame tile selection.
//!
//! The [`Selector`] walks the quadtree from the level-0 tiles and decides, for
//! the current [`View`], which tiles to draw and which to request.
//!
//! ```text
//!   top-level tiles
//!        │
//!        ▼
//!   consider_tile(key, ancestor) ──► not visible? ──► skip
//!        │
//!        ├── final level or detail sufficient ──► admit
//!        │                                         ├─ cached      → draw
//!        │                                         ├─ not absent  → request
//!        │                                         └─ ancestor    → draw from ancestor
//!        │
//!        └── refine: ancestor ← self if cached (or level 0)
//!                    consider_tile(child, ancestor) for each visible child
//! ```
//!
//! Selection never touches disk or network. It reads the tile cache and the
//! absent registry, and emits a [`Selection`] for the scheduler.

mod arena;
mod detail;

pub use detail::{DetailMetric, DETAIL_HINT_ORIGIN};

use std::sync::Arc;

use tracing::{debug, trace};

use crate::cache::TileCache;
use crate::config::SelectionConfig;
use crate::coord::{Sector, TileKey};
use crate::pyramid::LevelSet;
use crate::tile::{LoadRequest, RenderTile, TileState};
use crate::view::View;

use arena::TileArena;

/// Output of one selection pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Tiles to draw this frame, with ancestor fallbacks where needed.
    pub render_list: Vec<RenderTile>,
    /// Tiles whose data should be loaded, not yet de-duplicated.
    pub load_requests: Vec<LoadRequest>,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.render_list.is_empty() && self.load_requests.is_empty()
    }

    /// Number of render tiles drawn from an ancestor.
    pub fn fallback_count(&self) -> usize {
        self.render_list.iter().filter(|t| t.fallback.is_some()).count()
    }
}

/// Quadtree traversal producing render lists and load requests.
pub struct Selector {
    pyramid: Arc<LevelSet>,
    metric: DetailMetric,
    arena: TileArena,
    top_level: Vec<TileKey>,
    frame: u64,
}

/// Per-pass state threaded through the recursion.
struct Pass<'a> {
    view: &'a dyn View,
    region: Sector,
    cache: &'a TileCache,
    selection: Selection,
}

impl Selector {
    pub fn new(pyramid: Arc<LevelSet>, config: &SelectionConfig) -> Self {
        let top_level = pyramid.top_level_keys();
        debug!(
            top_level = top_level.len(),
            detail_hint = config.detail_hint,
            "Selector created"
        );
        Self {
            pyramid,
            metric: DetailMetric::new(config.detail_hint),
            arena: TileArena::new(config.max_arena_tiles),
            top_level,
            frame: 0,
        }
    }

    pub fn pyramid(&self) -> &Arc<LevelSet> {
        &self.pyramid
    }

    pub fn metric(&self) -> DetailMetric {
        self.metric
    }

    pub fn set_detail_hint(&mut self, hint: f64) {
        self.metric = DetailMetric::new(hint);
    }

    /// Number of completed selection passes.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Resource state of a tile, derived from cache membership and the
    /// absent registry.
    pub fn tile_state(&self, key: &TileKey, cache: &TileCache) -> TileState {
        tile_state(&self.pyramid, key, cache)
    }

    /// Selects tiles for the current view.
    pub fn select(&mut self, view: &dyn View, cache: &TileCache) -> Selection {
        self.frame += 1;

        let Some(region) = view.visible_region() else {
            trace!(frame = self.frame, "No visible region, nothing selected");
            return Selection::default();
        };

        let mut pass = Pass {
            view,
            region,
            cache,
            selection: Selection::default(),
        };

        for i in 0..self.top_level.len() {
            let key = self.top_level[i];
            if self.is_visible(key, &pass) {
                self.consider_tile(key, None, &mut pass);
            }
        }

        self.arena.prune(self.frame);

        trace!(
            frame = self.frame,
            render = pass.selection.render_list.len(),
            requests = pass.selection.load_requests.len(),
            arena = self.arena.len(),
            "Selection complete"
        );
        pass.selection
    }

    fn consider_tile(&mut self, key: TileKey, ancestor: Option<TileKey>, pass: &mut Pass<'_>) {
        let eye = pass.view.eye_point();
        let tile = self.arena.visit(key, &self.pyramid, self.frame);
        let bounds = *tile.bounding_box();

        let refine = match self.pyramid.level(key.level()) {
            Some(level) => {
                !self.pyramid.is_final_level(key.level())
                    && self.metric.needs_split(level, &bounds, &eye)
            }
            None => false,
        };
        if !refine {
            self.admit(key, ancestor, pass);
            return;
        }

        let ancestor = if key.level() == 0 || pass.cache.contains(&key) {
            Some(key)
        } else {
            ancestor
        };

        for child in key.children() {
            let child_sector = self.pyramid.tile_sector(&child);
            if !self.pyramid.sector().intersects(&child_sector) {
                continue;
            }
            if self.is_visible(child, pass) {
                self.consider_tile(child, ancestor, pass);
            }
        }
    }

    fn admit(&mut self, key: TileKey, ancestor: Option<TileKey>, pass: &mut Pass<'_>) {
        if self.pyramid.is_level_empty(key.level()) {
            return;
        }

        let eye = pass.view.eye_point();
        let Some(tile) = self.arena.get(&key) else {
            return;
        };
        let sector = *tile.sector();
        let priority = eye.distance_squared(&tile.center());

        if pass.cache.contains(&key) {
            pass.selection
                .render_list
                .push(RenderTile::loaded(key, sector));
            return;
        }

        if !self.pyramid.is_absent(&key) {
            pass.selection
                .load_requests
                .push(LoadRequest::new(key, priority));
        }

        let Some(ancestor) = ancestor else {
            return;
        };
        let ancestor_sector = self.pyramid.tile_sector(&ancestor);
        if pass.cache.contains(&ancestor) {
            pass.selection.render_list.push(RenderTile::with_fallback(
                key,
                sector,
                ancestor,
                ancestor_sector,
            ));
        } else if ancestor.level() == 0
            && !self.pyramid.is_level_empty(0)
            && !self.pyramid.is_absent(&ancestor)
        {
            let ancestor_tile = self.arena.visit(ancestor, &self.pyramid, self.frame);
            let priority = eye.distance_squared(&ancestor_tile.center());
            pass.selection
                .load_requests
                .push(LoadRequest::new(ancestor, priority));
        }
    }

    fn is_visible(&mut self, key: TileKey, pass: &Pass<'_>) -> bool {
        let tile = self.arena.visit(key, &self.pyramid, self.frame);
        tile.sector().intersects(&pass.region) && pass.view.frustum_intersects(tile.bounding_box())
    }
}

/// Resource state derived from cache membership and the absent registry.
pub fn tile_state(pyramid: &LevelSet, key: &TileKey, cache: &TileCache) -> TileState {
    if cache.contains(key) {
        TileState::Loaded
    } else if pyramid.is_absent(key) {
        TileState::Absent
    } else {
        TileState::Unloaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::Point3;
    use crate::decode::TileResource;
    use crate::pyramid::Level;
    use crate::view::RegionView;
    use bytes::Bytes;

    fn pyramid(levels: u32) -> Arc<LevelSet> {
        Arc::new(LevelSet::uniform(Sector::FULL_SPHERE, 36.0, levels, 512, 512).unwrap())
    }

    fn selector(pyramid: &Arc<LevelSet>) -> Selector {
        Selector::new(Arc::clone(pyramid), &SelectionConfig::default())
    }

    fn cache_tile(cache: &TileCache, key: TileKey) {
        let resource = TileResource::new(1, 1, Bytes::from_static(b"TILE"));
        assert!(cache.put(key, resource, 4).is_stored());
    }

    fn cache_all(pyramid: &LevelSet, cache: &TileCache) {
        let mut frontier = pyramid.top_level_keys();
        while let Some(key) = frontier.pop() {
            cache_tile(cache, key);
            if !pyramid.is_final_level(key.level()) {
                frontier.extend(key.children());
            }
        }
    }

    fn global_view(altitude: f64) -> RegionView {
        RegionView::new(Point3::new(0.0, 0.0, altitude), Some(Sector::FULL_SPHERE))
    }

    #[test]
    fn test_far_view_selects_top_level() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);
        for key in pyramid.top_level_keys() {
            cache_tile(&cache, key);
        }

        let selection = selector.select(&global_view(1e6), &cache);
        assert_eq!(selection.render_list.len(), 50);
        assert!(selection.render_list.iter().all(|t| t.key.level() == 0));
        assert!(selection.load_requests.is_empty());
    }

    #[test]
    fn test_fully_loaded_coverage_without_overlap() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);
        cache_all(&pyramid, &cache);

        let view = RegionView::new(Point3::new(-139.5, -58.5, 0.5), Some(Sector::FULL_SPHERE));
        let selection = selector.select(&view, &cache);

        assert!(selection.load_requests.is_empty());
        assert_eq!(selection.fallback_count(), 0);
        // Refinement near the eye, coarse tiles elsewhere
        let levels: std::collections::HashSet<u32> =
            selection.render_list.iter().map(|t| t.key.level()).collect();
        assert!(levels.contains(&0) && levels.contains(&2));

        let area: f64 = selection.render_list.iter().map(|t| t.sector.area()).sum();
        assert!((area - Sector::FULL_SPHERE.area()).abs() < 1e-6);

        let tiles = &selection.render_list;
        for (i, a) in tiles.iter().enumerate() {
            for b in &tiles[i + 1..] {
                assert!(!a.sector.intersects(&b.sector), "{} overlaps {}", a.key, b.key);
            }
        }
    }

    #[test]
    fn test_empty_cache_requests_level_zero() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);

        let view = RegionView::looking_down(-58.5, -139.5, 0.01, 1.0);
        let selection = selector.select(&view, &cache);

        assert!(selection.render_list.is_empty());
        let keys: Vec<TileKey> = selection.load_requests.iter().map(|r| r.key()).collect();
        assert!(keys.contains(&TileKey::new(2, 3, 4)));
        assert!(keys.contains(&TileKey::new(0, 0, 1)));
    }

    #[test]
    fn test_absent_tile_not_requested() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);
        let absent = TileKey::new(2, 3, 4);
        pyramid.mark_absent(absent);

        let view = RegionView::looking_down(-58.5, -139.5, 0.01, 1.0);
        for _ in 0..3 {
            let selection = selector.select(&view, &cache);
            assert!(selection.load_requests.iter().all(|r| r.key() != absent));
        }

        pyramid.reset_absent();
        let selection = selector.select(&view, &cache);
        assert!(selection.load_requests.iter().any(|r| r.key() == absent));
    }

    #[test]
    fn test_absent_tile_drawn_from_ancestor() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);
        let absent = TileKey::new(2, 3, 4);
        let parent = TileKey::new(1, 1, 2);
        pyramid.mark_absent(absent);
        cache_tile(&cache, TileKey::new(0, 0, 1));
        cache_tile(&cache, parent);

        let view = RegionView::looking_down(-58.5, -139.5, 0.01, 1.0);
        let selection = selector.select(&view, &cache);

        let tile = selection
            .render_list
            .iter()
            .find(|t| t.key == absent)
            .expect("absent tile should be drawn from its ancestor");
        assert_eq!(tile.data_key(), parent);
        assert_eq!(tile.uv().uv_bounds(), ((0.0, 0.5), (0.5, 1.0)));
        assert_eq!(selector.tile_state(&absent, &cache), TileState::Absent);
        assert_eq!(selector.tile_state(&parent, &cache), TileState::Loaded);
    }

    #[test]
    fn test_fallback_uses_nearest_loaded_ancestor() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);
        cache_tile(&cache, TileKey::new(0, 0, 1));

        let view = RegionView::looking_down(-58.5, -139.5, 0.01, 1.0);
        let selection = selector.select(&view, &cache);

        let tile = selection
            .render_list
            .iter()
            .find(|t| t.key == TileKey::new(2, 3, 4))
            .unwrap();
        assert_eq!(tile.data_key(), TileKey::new(0, 0, 1));
        // Level-0 ancestor is loaded so it is not requested again
        assert!(selection
            .load_requests
            .iter()
            .all(|r| r.key() != TileKey::new(0, 0, 1)));
    }

    #[test]
    fn test_request_priority_is_distance() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);

        let view = RegionView::looking_down(-58.5, -139.5, 0.01, 10.0);
        let selection = selector.select(&view, &cache);

        let nearest = selection
            .load_requests
            .iter()
            .min_by(|a, b| a.urgency_cmp(b))
            .unwrap();
        assert_eq!(nearest.key(), TileKey::new(2, 3, 4));
        assert!((nearest.priority() - 0.0001).abs() < 1e-9);
    }

    #[test]
    fn test_no_visible_region_selects_nothing() {
        let pyramid = pyramid(3);
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);

        let view = RegionView::new(Point3::new(0.0, 0.0, 1.0), None);
        assert!(selector.select(&view, &cache).is_empty());
        assert_eq!(selector.frame(), 1);
    }

    #[test]
    fn test_empty_level_is_skipped() {
        let levels = vec![
            Level::new(36.0, 36.0, 512, 512),
            Level::new(18.0, 18.0, 512, 512).empty(),
            Level::new(9.0, 9.0, 512, 512),
        ];
        let pyramid = Arc::new(LevelSet::new(Sector::FULL_SPHERE, levels).unwrap());
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);

        let view = RegionView::looking_down(-58.5, -139.5, 0.01, 1.0);
        let selection = selector.select(&view, &cache);
        assert!(selection.load_requests.iter().all(|r| r.key().level() != 1));
        assert!(selection
            .load_requests
            .iter()
            .any(|r| r.key() == TileKey::new(2, 3, 4)));
    }

    #[test]
    fn test_partial_sector_prunes_outside_children() {
        let sector = Sector::new(-90.0, -54.0, -144.0, -140.0).unwrap();
        let pyramid = Arc::new(LevelSet::uniform(sector, 36.0, 3, 512, 512).unwrap());
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);

        let view = RegionView::looking_down(-58.5, -142.0, 0.01, 40.0);
        let selection = selector.select(&view, &cache);

        for request in &selection.load_requests {
            let tile_sector = pyramid.tile_sector(&request.key());
            assert!(
                tile_sector.intersects(&sector),
                "{} lies outside the pyramid",
                request.key()
            );
        }
        assert!(selection
            .load_requests
            .iter()
            .any(|r| r.key() == TileKey::new(2, 3, 4)));
    }

    #[test]
    fn test_view_outside_pyramid_selects_nothing() {
        let sector = Sector::new(0.0, 36.0, 0.0, 36.0).unwrap();
        let pyramid = Arc::new(LevelSet::uniform(sector, 36.0, 3, 512, 512).unwrap());
        let mut selector = selector(&pyramid);
        let cache = TileCache::new(1 << 20);

        let view = RegionView::looking_down(-60.0, -120.0, 0.01, 5.0);
        assert!(selector.select(&view, &cache).is_empty());
    }

    mod coverage {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn prop_loaded_pyramid_covers_visible_sphere(
                lat in -89.0f64..89.0,
                lon in -179.0f64..179.0,
                altitude in 0.001f64..200.0,
            ) {
                let pyramid = pyramid(3);
                let mut selector = selector(&pyramid);
                let cache = TileCache::new(1 << 20);
                cache_all(&pyramid, &cache);

                let view = RegionView::new(Point3::new(lon, lat, altitude), Some(Sector::FULL_SPHERE));
                let selection = selector.select(&view, &cache);

                prop_assert!(selection.load_requests.is_empty());
                let area: f64 = selection.render_list.iter().map(|t| t.sector.area()).sum();
                prop_assert!((area - Sector::FULL_SPHERE.area()).abs() < 1e-6);
            }
        }
    }
}

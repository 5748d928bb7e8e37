//! Arena of materialised tiles, indexed by key.
//!
//! Tiles are reused across frames so their lazily computed geometry is not
//! rebuilt every frame. Nothing outside the arena holds a tile reference;
//! ancestors and fallbacks are plain keys.

use std::collections::HashMap;

use tracing::trace;

use crate::coord::TileKey;
use crate::pyramid::LevelSet;
use crate::tile::GeoTile;

#[derive(Debug, Default)]
pub(crate) struct TileArena {
    tiles: HashMap<TileKey, GeoTile>,
    max_tiles: usize,
}

impl TileArena {
    pub(crate) fn new(max_tiles: usize) -> Self {
        Self {
            tiles: HashMap::new(),
            max_tiles,
        }
    }

    /// Returns the tile for `key`, creating it on first use, and stamps it as
    /// visited in `frame`.
    pub(crate) fn visit(&mut self, key: TileKey, pyramid: &LevelSet, frame: u64) -> &GeoTile {
        let tile = self
            .tiles
            .entry(key)
            .or_insert_with(|| GeoTile::new(key, pyramid.tile_sector(&key)));
        tile.last_visited = frame;
        tile
    }

    pub(crate) fn get(&self, key: &TileKey) -> Option<&GeoTile> {
        self.tiles.get(key)
    }

    /// Drops tiles not visited in `frame` once the arena exceeds its bound.
    pub(crate) fn prune(&mut self, frame: u64) {
        if self.tiles.len() <= self.max_tiles {
            return;
        }
        let before = self.tiles.len();
        self.tiles
            .retain(|key, tile| key.level() == 0 || tile.last_visited == frame);
        trace!(
            before,
            after = self.tiles.len(),
            "Pruned tile arena"
        );
    }

    pub(crate) fn len(&self) -> usize {
        self.tiles.len()
    }
}

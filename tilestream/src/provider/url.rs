//! URL builders.
//!
//! A [`UrlBuilder`] maps a tile to the URL of its remote payload, or to
//! nothing when the source has no URL for that tile.
//!
//! - [`XyzUrlBuilder`]: `{z}`/`{x}`/`{y}` template
//! - [`WmsUrlBuilder`]: OGC WMS `GetMap` with a geographic bounding box

use crate::coord::{Sector, TileKey};

/// Builds the remote URL for a tile.
pub trait UrlBuilder: Send + Sync {
    /// Returns the URL for `key`, or `None` if the source has none.
    ///
    /// # Arguments
    ///
    /// * `key` - Tile identity
    /// * `sector` - Geographic extent of the tile
    /// * `format_override` - Optional image format (MIME type) to request
    fn build_url(&self, key: &TileKey, sector: &Sector, format_override: Option<&str>) -> Option<String>;
}

// =============================================================================
// XYZ
// =============================================================================

/// Template builder for `{z}/{x}/{y}` style sources.
///
/// `{z}` is the tile level plus `level_offset`, `{x}` the column and `{y}` the
/// row. Rows count from the south edge unless `flip_y` is set, in which case
/// `{y}` counts from the north edge of a grid of `rows_at_level_zero << level`
/// rows.
///
/// # Example
///
/// ```
/// use tilestream::coord::{Sector, TileKey};
/// use tilestream::provider::{UrlBuilder, XyzUrlBuilder};
///
/// let builder = XyzUrlBuilder::new("https://tiles.example.com/{z}/{x}/{y}.png");
/// let url = builder.build_url(&TileKey::new(3, 5, 7), &Sector::FULL_SPHERE, None);
/// assert_eq!(url.as_deref(), Some("https://tiles.example.com/3/7/5.png"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct XyzUrlBuilder {
    template: String,
    level_offset: i32,
    flip_y: Option<u32>,
    max_level: Option<u32>,
}

impl XyzUrlBuilder {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            level_offset: 0,
            flip_y: None,
            max_level: None,
        }
    }

    /// Adds `offset` to the level when filling `{z}`.
    pub fn with_level_offset(mut self, offset: i32) -> Self {
        self.level_offset = offset;
        self
    }

    /// Counts rows from the north, given the row count of level 0.
    pub fn with_flip_y(mut self, rows_at_level_zero: u32) -> Self {
        self.flip_y = Some(rows_at_level_zero);
        self
    }

    /// Levels above `max_level` have no URL.
    pub fn with_max_level(mut self, max_level: u32) -> Self {
        self.max_level = Some(max_level);
        self
    }
}

impl UrlBuilder for XyzUrlBuilder {
    fn build_url(&self, key: &TileKey, _sector: &Sector, format_override: Option<&str>) -> Option<String> {
        if self.max_level.is_some_and(|max| key.level() > max) {
            return None;
        }
        let z = i64::from(key.level()) + i64::from(self.level_offset);
        if z < 0 {
            return None;
        }
        let y = match self.flip_y {
            Some(rows) => {
                let total = u64::from(rows) << key.level().min(40);
                total.checked_sub(u64::from(key.row()) + 1)?
            }
            None => u64::from(key.row()),
        };

        let mut url = self
            .template
            .replace("{z}", &z.to_string())
            .replace("{x}", &key.col().to_string())
            .replace("{y}", &y.to_string());
        if let Some(format) = format_override {
            url = url.replace("{format}", format);
        }
        Some(url)
    }
}

// =============================================================================
// WMS
// =============================================================================

/// OGC WMS `GetMap` builder using a geographic (EPSG:4326) bounding box.
///
/// The `BBOX` is `min_lon,min_lat,max_lon,max_lat` and the image size is the
/// level's tile size.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsUrlBuilder {
    service: String,
    layers: String,
    styles: String,
    format: String,
    version: String,
    tile_width: u32,
    tile_height: u32,
    transparent: bool,
}

impl WmsUrlBuilder {
    /// # Arguments
    ///
    /// * `service` - Base URL of the WMS endpoint
    /// * `layers` - Comma separated layer names
    /// * `tile_width`, `tile_height` - Requested image size in pixels
    pub fn new(service: impl Into<String>, layers: impl Into<String>, tile_width: u32, tile_height: u32) -> Self {
        Self {
            service: service.into(),
            layers: layers.into(),
            styles: String::new(),
            format: "image/png".to_string(),
            version: "1.1.1".to_string(),
            tile_width,
            tile_height,
            transparent: false,
        }
    }

    pub fn with_styles(mut self, styles: impl Into<String>) -> Self {
        self.styles = styles.into();
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_transparent(mut self, transparent: bool) -> Self {
        self.transparent = transparent;
        self
    }
}

impl UrlBuilder for WmsUrlBuilder {
    fn build_url(&self, _key: &TileKey, sector: &Sector, format_override: Option<&str>) -> Option<String> {
        let separator = if self.service.contains('?') {
            if self.service.ends_with('?') || self.service.ends_with('&') {
                ""
            } else {
                "&"
            }
        } else {
            "?"
        };
        // 1.3.0 renamed SRS to CRS; CRS:84 keeps lon/lat axis order
        let crs = if self.version.starts_with("1.3") {
            "CRS=CRS:84"
        } else {
            "SRS=EPSG:4326"
        };
        let format = format_override.unwrap_or(&self.format);

        Some(format!(
            "{}{}SERVICE=WMS&REQUEST=GetMap&VERSION={}&LAYERS={}&STYLES={}&FORMAT={}&TRANSPARENT={}&{}&BBOX={},{},{},{}&WIDTH={}&HEIGHT={}",
            self.service,
            separator,
            self.version,
            self.layers,
            self.styles,
            format,
            if self.transparent { "TRUE" } else { "FALSE" },
            crs,
            sector.min_lon,
            sector.min_lat,
            sector.max_lon,
            sector.max_lat,
            self.tile_width,
            self.tile_height,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sector() -> Sector {
        Sector::new(-63.0, -54.0, -144.0, -135.0).unwrap()
    }

    #[test]
    fn test_xyz_fills_template() {
        let builder = XyzUrlBuilder::new("http://t/{z}/{x}/{y}.jpg");
        assert_eq!(
            builder.build_url(&TileKey::new(2, 3, 4), &sector(), None),
            Some("http://t/2/4/3.jpg".to_string())
        );
    }

    #[test]
    fn test_xyz_level_offset_and_flip() {
        let builder = XyzUrlBuilder::new("http://t/{z}/{x}/{y}")
            .with_level_offset(1)
            .with_flip_y(5);
        // Level 2 has 20 rows; row 3 from the south is row 16 from the north
        assert_eq!(
            builder.build_url(&TileKey::new(2, 3, 4), &sector(), None),
            Some("http://t/3/4/16".to_string())
        );
    }

    #[test]
    fn test_xyz_negative_level_has_no_url() {
        let builder = XyzUrlBuilder::new("http://t/{z}/{x}/{y}").with_level_offset(-3);
        assert_eq!(builder.build_url(&TileKey::new(2, 0, 0), &sector(), None), None);
    }

    #[test]
    fn test_xyz_max_level() {
        let builder = XyzUrlBuilder::new("http://t/{z}/{x}/{y}").with_max_level(1);
        assert!(builder.build_url(&TileKey::new(1, 0, 0), &sector(), None).is_some());
        assert!(builder.build_url(&TileKey::new(2, 0, 0), &sector(), None).is_none());
    }

    #[test]
    fn test_xyz_format_placeholder() {
        let builder = XyzUrlBuilder::new("http://t/{z}/{x}/{y}?f={format}");
        assert_eq!(
            builder.build_url(&TileKey::new(0, 0, 0), &sector(), Some("jpeg")),
            Some("http://t/0/0/0?f=jpeg".to_string())
        );
    }

    #[test]
    fn test_wms_bbox_is_lon_lat() {
        let builder = WmsUrlBuilder::new("http://wms.example.com/wms", "bmng", 512, 512);
        let url = builder
            .build_url(&TileKey::new(2, 3, 4), &sector(), None)
            .unwrap();

        assert!(url.starts_with("http://wms.example.com/wms?SERVICE=WMS&REQUEST=GetMap"));
        assert!(url.contains("LAYERS=bmng"));
        assert!(url.contains("SRS=EPSG:4326"));
        assert!(url.contains("BBOX=-144,-63,-135,-54"));
        assert!(url.contains("WIDTH=512&HEIGHT=512"));
        assert!(url.contains("FORMAT=image/png"));
    }

    #[test]
    fn test_wms_existing_query_and_override() {
        let builder = WmsUrlBuilder::new("http://w/wms?map=earth", "a,b", 256, 256)
            .with_version("1.3.0");
        let url = builder
            .build_url(&TileKey::new(0, 0, 0), &sector(), Some("image/jpeg"))
            .unwrap();

        assert!(url.starts_with("http://w/wms?map=earth&SERVICE=WMS"));
        assert!(url.contains("CRS=CRS:84"));
        assert!(url.contains("FORMAT=image/jpeg"));
    }
}

//! Raster image decoder backed by the `image` crate.

use super::{DecodeError, Decoder, TileResource};

/// Decodes any raster format supported by `image` into RGBA8.
///
/// The resource footprint is `width * height * 4` bytes.
#[derive(Debug, Clone, Default)]
pub struct ImageDecoder {
    max_dimension: Option<u32>,
}

impl ImageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects images wider or taller than `max_dimension` pixels.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = Some(max_dimension);
        self
    }
}

impl Decoder for ImageDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<TileResource, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let rgba = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        let too_large = self
            .max_dimension
            .is_some_and(|max| width > max || height > max);
        if width == 0 || height == 0 || too_large {
            return Err(DecodeError::InvalidDimensions { width, height });
        }

        Ok(TileResource::new(width, height, rgba.into_raw()))
    }

    fn name(&self) -> &str {
        "image"
    }
}

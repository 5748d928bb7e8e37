//! Tile payload decoding.
//!
//! The [`Decoder`] trait turns raw tile bytes into a [`TileResource`] with a
//! known byte footprint. The loader holds an `Arc<dyn Decoder>` so formats can
//! be swapped without touching the pipeline.
//!
//! ```text
//!  bytes ──► Decoder ──► TileResource { width, height, data } ──► TileCache
//! ```
//!
//! # Available Decoders
//!
//! - [`ImageDecoder`] - PNG/JPEG/etc. to RGBA8 via the `image` crate

mod error;
mod image_decoder;

pub use error::DecodeError;
pub use image_decoder::ImageDecoder;

use bytes::Bytes;

/// A decoded, render-ready tile resource.
///
/// Cloning is cheap; pixel data is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileResource {
    width: u32,
    height: u32,
    data: Bytes,
}

impl TileResource {
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Memory footprint used for cache accounting.
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Decodes tile payloads into resources.
///
/// Implementations must be thread-safe; decoding runs on worker threads.
pub trait Decoder: Send + Sync {
    /// Decodes a payload.
    fn decode(&self, bytes: &[u8]) -> Result<TileResource, DecodeError>;

    /// Short name for logging.
    fn name(&self) -> &str;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// Decoder that accepts any payload starting with `b"TILE"`.
    ///
    /// The resource size equals the payload length, which keeps cache
    /// accounting easy to reason about in tests.
    pub struct MockDecoder;

    impl Decoder for MockDecoder {
        fn decode(&self, bytes: &[u8]) -> Result<TileResource, DecodeError> {
            if bytes.is_empty() {
                return Err(DecodeError::Empty);
            }
            if !bytes.starts_with(b"TILE") {
                return Err(DecodeError::Malformed("missing TILE magic".to_string()));
            }
            Ok(TileResource::new(1, 1, bytes.to_vec()))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[test]
    fn test_resource_size_is_data_length() {
        let resource = TileResource::new(2, 2, vec![0u8; 16]);
        assert_eq!(resource.size_bytes(), 16);
        assert_eq!(resource.width(), 2);
        assert_eq!(resource.height(), 2);
    }

    #[test]
    fn test_mock_decoder() {
        let decoder: &dyn Decoder = &MockDecoder;
        assert!(decoder.decode(b"TILE1234").is_ok());
        assert_eq!(decoder.decode(b""), Err(DecodeError::Empty));
        assert!(matches!(
            decoder.decode(b"<xml/>"),
            Err(DecodeError::Malformed(_))
        ));
    }
}

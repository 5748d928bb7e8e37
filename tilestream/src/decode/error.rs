//! Error types for tile decoding.

use std::fmt;

/// Errors that can occur while decoding tile bytes into a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is empty.
    Empty,
    /// The payload is not in a recognised format.
    UnsupportedFormat(String),
    /// The payload was recognised but is malformed.
    Malformed(String),
    /// The decoded image has unusable dimensions.
    InvalidDimensions { width: u32, height: u32 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "Empty tile payload"),
            DecodeError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {}", msg),
            DecodeError::Malformed(msg) => write!(f, "Malformed payload: {}", msg),
            DecodeError::InvalidDimensions { width, height } => {
                write!(f, "Invalid dimensions {}×{}", width, height)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => DecodeError::UnsupportedFormat(e.to_string()),
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(DecodeError::Empty.to_string(), "Empty tile payload");
        assert!(DecodeError::Malformed("bad header".to_string())
            .to_string()
            .contains("bad header"));
        assert!(DecodeError::InvalidDimensions {
            width: 0,
            height: 256
        }
        .to_string()
        .contains("0×256"));
    }
}

//! Errors raised while constructing a layer.

use thiserror::Error;

use crate::provider::RetrievalError;
use crate::pyramid::PyramidError;

/// Construction failures of a [`TiledLayer`](super::TiledLayer).
#[derive(Debug, Error)]
pub enum LayerError {
    /// Retrieval is enabled but nothing can build tile URLs.
    #[error("Retrieval is enabled but no URL builder was supplied")]
    MissingUrlBuilder,

    /// The layer was built outside a tokio runtime and no handle was given.
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    #[error("Invalid pyramid: {0}")]
    Pyramid(#[from] PyramidError),

    /// The default HTTP retriever could not be created.
    #[error("Failed to create retriever: {0}")]
    Retrieval(#[from] RetrievalError),
}

//! Retrieval types shared by every retriever.

use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::config::RetrievalConfig;

/// Errors from a single remote retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Failed to read body: {0}")]
    Body(String),

    #[error("Request went stale before it ran")]
    Stale,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl RetrievalError {
    /// True for failures that say nothing about whether the tile exists:
    /// timeouts, connection errors and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrievalError::Timeout(_)
            | RetrievalError::Connect(_)
            | RetrievalError::Body(_)
            | RetrievalError::Stale => true,
            RetrievalError::Status(code) => *code >= 500 || *code == 429,
            RetrievalError::InvalidUrl(_) => false,
        }
    }
}

/// Per-request time limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalTimeouts {
    /// Limit for establishing the connection and receiving headers.
    pub connect: Duration,
    /// Limit for reading the body once headers arrived.
    pub read: Duration,
    /// Maximum time a request may wait in the retrieval queue.
    pub stale: Duration,
}

impl RetrievalTimeouts {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            connect: config.connect_timeout,
            read: config.read_timeout,
            stale: config.stale_horizon,
        }
    }
}

impl Default for RetrievalTimeouts {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// A completed HTTP exchange.
///
/// Non-2xx statuses that still carry meaning (204, 404) are returned here
/// rather than as errors so the post-processor can tell "no data" apart from
/// transport failure.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl RetrievalResponse {
    pub fn new(status: u16, content_type: Option<&str>, bytes: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type: content_type.map(str::to_string),
            bytes: bytes.into(),
        }
    }

    /// A 200 response with the given content type.
    pub fn ok(content_type: &str, bytes: impl Into<Bytes>) -> Self {
        Self::new(200, Some(content_type), bytes)
    }

    /// True if the server answered but has no tile here: HTTP 204/404, or a
    /// textual/XML body (typically a service exception document).
    pub fn is_no_data(&self) -> bool {
        if self.status == 204 || self.status == 404 {
            return true;
        }
        self.content_type.as_deref().is_some_and(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("text/") || ct.contains("xml")
        })
    }
}

/// Future returned by [`Retriever::fetch`].
pub type RetrievalFuture<'a> = BoxFuture<'a, Result<RetrievalResponse, RetrievalError>>;

/// Fetches raw tile payloads from a remote source.
pub trait Retriever: Send + Sync {
    /// Fetches `url`, honouring the connect and read timeouts.
    ///
    /// # Arguments
    ///
    /// * `url` - Fully built tile URL
    /// * `timeouts` - Limits for this request
    fn fetch<'a>(&'a self, url: &'a str, timeouts: RetrievalTimeouts) -> RetrievalFuture<'a>;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RetrievalError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(RetrievalError::Connect("refused".into()).is_transient());
        assert!(RetrievalError::Status(503).is_transient());
        assert!(RetrievalError::Status(429).is_transient());
        assert!(!RetrievalError::Status(403).is_transient());
        assert!(!RetrievalError::InvalidUrl("::".into()).is_transient());
    }

    #[test]
    fn test_no_data_detection() {
        assert!(RetrievalResponse::new(404, None, Bytes::new()).is_no_data());
        assert!(RetrievalResponse::new(204, None, Bytes::new()).is_no_data());
        assert!(RetrievalResponse::ok("text/html", "nope").is_no_data());
        assert!(RetrievalResponse::ok("application/vnd.ogc.se_xml", "<x/>").is_no_data());
        assert!(!RetrievalResponse::ok("image/png", "png").is_no_data());
        assert!(!RetrievalResponse::new(200, None, "raw").is_no_data());
    }

    #[test]
    fn test_timeouts_from_config() {
        let config = RetrievalConfig::default()
            .with_connect_timeout(Duration::from_secs(1))
            .with_stale_horizon(Duration::from_secs(3));
        let timeouts = RetrievalTimeouts::from_config(&config);
        assert_eq!(timeouts.connect, Duration::from_secs(1));
        assert_eq!(timeouts.stale, Duration::from_secs(3));
    }
}

//! HTTP retriever on reqwest.

use std::time::Duration;

use tracing::trace;

use super::types::{RetrievalError, RetrievalFuture, RetrievalResponse, RetrievalTimeouts, Retriever};

const USER_AGENT: &str = concat!("tilestream/", env!("CARGO_PKG_VERSION"));

/// Async HTTP retriever.
///
/// Any status other than 2xx, 204 and 404 is reported as
/// [`RetrievalError::Status`]; 204 and 404 are returned as responses so they
/// can be treated as "no data".
pub struct HttpRetriever {
    client: reqwest::Client,
}

impl HttpRetriever {
    /// Creates a retriever with a shared connection pool.
    pub fn new() -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| RetrievalError::Connect(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch_inner(
        &self,
        url: &str,
        timeouts: RetrievalTimeouts,
    ) -> Result<RetrievalResponse, RetrievalError> {
        let request = self.client.get(url).build().map_err(|e| {
            if e.is_builder() {
                RetrievalError::InvalidUrl(url.to_string())
            } else {
                RetrievalError::Connect(e.to_string())
            }
        })?;

        let response = tokio::time::timeout(timeouts.connect, self.client.execute(request))
            .await
            .map_err(|_| RetrievalError::Timeout(timeouts.connect))?
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout(timeouts.connect)
                } else {
                    RetrievalError::Connect(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !(response.status().is_success() || status == 404) {
            return Err(RetrievalError::Status(status));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = tokio::time::timeout(timeouts.read, response.bytes())
            .await
            .map_err(|_| RetrievalError::Timeout(timeouts.read))?
            .map_err(|e| RetrievalError::Body(e.to_string()))?;

        trace!(url, status, len = bytes.len(), "HTTP response received");
        Ok(RetrievalResponse {
            status,
            content_type,
            bytes,
        })
    }
}

impl Retriever for HttpRetriever {
    fn fetch<'a>(&'a self, url: &'a str, timeouts: RetrievalTimeouts) -> RetrievalFuture<'a> {
        Box::pin(self.fetch_inner(url, timeouts))
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Scripted retriever keyed by URL. Unknown URLs answer 404.
    #[derive(Default)]
    pub struct MockRetriever {
        pub responses: Mutex<HashMap<String, Result<RetrievalResponse, RetrievalError>>>,
        pub requests: Mutex<Vec<String>>,
        pub delay: Option<Duration>,
    }

    impl MockRetriever {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(
            self,
            url: &str,
            response: Result<RetrievalResponse, RetrievalError>,
        ) -> Self {
            self.responses.lock().insert(url.to_string(), response);
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl Retriever for MockRetriever {
        fn fetch<'a>(&'a self, url: &'a str, _timeouts: RetrievalTimeouts) -> RetrievalFuture<'a> {
            Box::pin(async move {
                self.requests.lock().push(url.to_string());
                if let Some(delay) = self.delay {
                    tokio::time::sleep(delay).await;
                }
                self.responses
                    .lock()
                    .get(url)
                    .cloned()
                    .unwrap_or_else(|| Ok(RetrievalResponse::new(404, None, Vec::new())))
            })
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_mock_retriever_scripted() {
        let retriever = MockRetriever::new()
            .with_response("http://a/1", Ok(RetrievalResponse::ok("image/png", "TILE")))
            .with_response("http://a/2", Err(RetrievalError::Status(503)));

        let ok = retriever
            .fetch("http://a/1", RetrievalTimeouts::default())
            .await
            .unwrap();
        assert_eq!(&ok.bytes[..], b"TILE");

        let err = retriever
            .fetch("http://a/2", RetrievalTimeouts::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let missing = retriever
            .fetch("http://a/3", RetrievalTimeouts::default())
            .await
            .unwrap();
        assert!(missing.is_no_data());
        assert_eq!(retriever.request_count(), 3);
    }

    #[tokio::test]
    async fn test_http_retriever_invalid_url() {
        let retriever = HttpRetriever::new().unwrap();
        let err = retriever
            .fetch("not a url", RetrievalTimeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_http_retriever_connect_failure() {
        let retriever = HttpRetriever::new().unwrap();
        let timeouts = RetrievalTimeouts {
            connect: Duration::from_secs(2),
            ..Default::default()
        };
        // Port 9 on loopback is reserved (discard) and normally closed
        let err = retriever
            .fetch("http://127.0.0.1:9/tile.png", timeouts)
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}

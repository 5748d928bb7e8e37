//! Retrieval task and response post-processing.
//!
//! | Outcome                                   | Tile state | Persisted | Host report |
//! |-------------------------------------------|------------|-----------|-------------|
//! | payload decodes                           | loaded     | yes       | success     |
//! | 204/404, textual or XML body              | absent     | no        | success     |
//! | payload fails to decode                   | absent     | no        | success     |
//! | timeout, connection error, 5xx, 429       | unloaded   | no        | failure     |
//! | other 4xx                                 | absent     | no        | success     |
//! | invalid URL                               | absent     | no        | abandoned   |
//! | stale or cancelled before running         | unloaded   | no        | abandoned   |

use std::sync::Arc;

use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::{debug, trace, warn};

use super::{bump, InFlightGuard, LoaderShared};
use crate::coord::TileKey;
use crate::decode::TileResource;
use crate::executor::{AbandonReason, Task};
use crate::provider::{RetrievalError, RetrievalResponse};

/// Network retrieval of one tile, queued on the retrieval pool.
pub(crate) struct RetrievalTask {
    shared: Arc<LoaderShared>,
    key: TileKey,
    url: String,
    path: String,
    name: String,
    _guard: InFlightGuard,
}

impl RetrievalTask {
    pub(crate) fn new(
        shared: Arc<LoaderShared>,
        key: TileKey,
        url: String,
        path: String,
        guard: InFlightGuard,
    ) -> Self {
        Self {
            shared,
            key,
            url,
            path,
            name: format!("retrieve {}", key),
            _guard: guard,
        }
    }

    async fn execute(self) {
        let result = self
            .shared
            .retriever
            .fetch(&self.url, self.shared.timeouts)
            .await;

        match result {
            Ok(response) => {
                self.shared.network.record_success(&self.url);
                self.handle_response(response).await;
            }
            Err(e) if e.is_transient() => {
                bump(&self.shared.counters.transport_failures);
                self.shared.network.record_failure(&self.url);
                debug!(tile = %self.key, url = %self.url, error = %e, "Retrieval failed, tile stays unloaded");
            }
            Err(e) => self.handle_permanent(e),
        }
    }

    async fn handle_response(&self, response: RetrievalResponse) {
        if response.is_no_data() {
            bump(&self.shared.counters.no_data);
            trace!(tile = %self.key, status = response.status, "Source has no data for tile");
            self.shared.mark_absent(self.key);
            return;
        }

        let shared = Arc::clone(&self.shared);
        let key = self.key;
        let path = self.path.clone();
        let bytes = response.bytes;
        let decoded = tokio::task::spawn_blocking(move || decode_and_persist(&shared, key, &path, bytes)).await;

        match decoded {
            Ok(Some(resource)) => {
                bump(&self.shared.counters.retrieved);
                self.shared.install(self.key, resource);
            }
            Ok(None) => {
                bump(&self.shared.counters.decode_failures);
                self.shared.mark_absent(self.key);
            }
            Err(e) => warn!(tile = %self.key, error = %e, "Decode task failed"),
        }
    }

    fn handle_permanent(&self, error: RetrievalError) {
        match error {
            // The host answered, so it is reachable
            RetrievalError::Status(_) => self.shared.network.record_success(&self.url),
            _ => self.shared.network.record_abandoned(&self.url),
        }
        debug!(tile = %self.key, url = %self.url, error = %error, "Source refused tile, marking absent");
        self.shared.mark_absent(self.key);
    }
}

/// Blocking: decodes a retrieved payload and, if it decodes, persists it.
fn decode_and_persist(shared: &LoaderShared, key: TileKey, path: &str, bytes: Bytes) -> Option<TileResource> {
    let _lock = shared.decode_lock.lock();
    let resource = match shared.decoder.decode(&bytes) {
        Ok(resource) => resource,
        Err(e) => {
            debug!(tile = %key, decoder = shared.decoder.name(), error = %e, "Retrieved payload did not decode");
            return None;
        }
    };
    if let Err(e) = shared.persistent.write(path, &bytes) {
        warn!(tile = %key, path, error = %e, "Failed to persist tile");
    }
    Some(resource)
}

impl Task for RetrievalTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin((*self).execute())
    }

    fn abandon(self: Box<Self>, reason: AbandonReason) {
        trace!(tile = %self.key, %reason, "Retrieval abandoned");
        self.shared.network.record_abandoned(&self.url);
    }
}

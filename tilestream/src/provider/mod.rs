//! Remote tile sources.
//!
//! The loader reaches the network only through these capability traits, so
//! each can be swapped for a mock in tests:
//!
//! - [`Retriever`]: fetches a URL ([`HttpRetriever`] on reqwest)
//! - [`UrlBuilder`]: maps a tile to its URL ([`XyzUrlBuilder`], [`WmsUrlBuilder`])
//! - [`NetworkStatus`]: per-host availability ([`HostStatusTracker`])
//!
//! # Example
//!
//! ```ignore
//! use tilestream::provider::{HttpRetriever, Retriever, RetrievalTimeouts};
//!
//! let retriever = HttpRetriever::new()?;
//! let response = retriever
//!     .fetch("https://tiles.example.com/2/4/3.png", RetrievalTimeouts::default())
//!     .await?;
//! ```

mod http;
mod status;
mod types;
mod url;

pub use http::HttpRetriever;
pub use status::{HostState, HostStatusTracker, NetworkStatus};
pub use types::{RetrievalError, RetrievalFuture, RetrievalResponse, RetrievalTimeouts, Retriever};
pub use url::{UrlBuilder, WmsUrlBuilder, XyzUrlBuilder};

#[cfg(test)]
pub use http::tests::MockRetriever;
#[cfg(test)]
pub use status::tests::MockNetworkStatus;

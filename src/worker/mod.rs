//! Offline cache worker.
//!
//! A [`CacheWorker`] owns one cache version: it pre-caches the static asset
//! list on install, purges stale buckets on activate and answers GET
//! requests network-first with a cache fallback. A [`Registration`] tracks
//! the active and waiting workers, and a [`WorkerHandle`] runs it as a
//! tokio task reached over channels.

mod actor;
mod cache;
mod fetch;
mod lifecycle;
mod message;
#[cfg(test)]
mod testing;

pub use actor::WorkerHandle;
pub use cache::{CacheStore, DiskCacheStore, MemoryCacheStore};
pub use fetch::{Fetcher, HttpFetcher};
pub use lifecycle::{CacheWorker, RegisterOutcome, Registration, WorkerState};
pub use message::{BACKGROUND_SYNC_TAG, ClientMessage, SyncSummary, WorkerMessage, WorkerReply};

use bytes::Bytes;
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// Body of the synthetic response for uncached, non-navigation requests.
pub const OFFLINE_MESSAGE: &str = "Sorry, this content is not available offline";

/// A request routed through the worker.
///
/// `path` is either origin-relative (`/css/app.css`) or an absolute URL;
/// absolute URLs are treated as cross-origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub path: String,
    /// Top-level document load.
    pub navigate: bool,
    /// Bypass intermediate HTTP caches.
    pub no_cache: bool,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchRequest {
    /// Creates a request with an empty body.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            navigate: false,
            no_cache: false,
            content_type: None,
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// A GET for a top-level document.
    #[must_use]
    pub fn navigate(path: impl Into<String>) -> Self {
        Self {
            navigate: true,
            ..Self::get(path)
        }
    }

    #[must_use]
    pub const fn with_no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    #[must_use]
    pub fn with_body(mut self, content_type: Option<String>, body: Bytes) -> Self {
        self.content_type = content_type;
        self.body = body;
        self
    }

    /// Whether the request targets the worker's own origin.
    #[must_use]
    pub fn is_same_origin(&self) -> bool {
        self.path.starts_with('/')
    }

    /// Whether the worker's caching strategy applies.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET && self.is_same_origin()
    }
}

/// A response produced by the network, a cache bucket, or the worker itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    #[serde(skip)]
    pub body: Bytes,
}

impl FetchResponse {
    #[must_use]
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// `200 OK` with the given body.
    #[must_use]
    pub fn ok(content_type: &str, body: impl Into<Bytes>) -> Self {
        Self::new(200, Some(content_type.to_string()), body)
    }

    /// Synthetic `503 Service Unavailable` plain-text response.
    #[must_use]
    pub fn service_unavailable() -> Self {
        Self::new(
            503,
            Some("text/plain; charset=utf-8".to_string()),
            OFFLINE_MESSAGE,
        )
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cacheability() {
        assert!(FetchRequest::get("/index.html").is_cacheable());
        assert!(FetchRequest::navigate("/").is_cacheable());
        assert!(!FetchRequest::new(Method::POST, "/api").is_cacheable());
        assert!(!FetchRequest::get("https://cdn.example.com/x.js").is_cacheable());
    }

    #[test]
    fn synthetic_offline_response() {
        let res = FetchResponse::service_unavailable();
        assert_eq!(res.status, 503);
        assert!(!res.is_success());
        assert_eq!(res.body, Bytes::from_static(OFFLINE_MESSAGE.as_bytes()));
    }
}

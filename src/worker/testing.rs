//! Test doubles shared by the worker tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{FetchRequest, FetchResponse, Fetcher};
use crate::error::{Error, Result};

/// Serves canned responses; everything fails while offline.
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, FetchResponse>>,
    offline: AtomicBool,
    pub requests: Mutex<Vec<FetchRequest>>,
}

impl MockFetcher {
    /// Routes each path to a plain-text `body of <path>` response.
    pub fn with_assets(paths: &[&str]) -> Self {
        let fetcher = Self::default();
        for path in paths {
            fetcher.route(path, FetchResponse::ok("text/plain", format!("body of {path}")));
        }
        fetcher
    }

    pub fn route(&self, path: &str, response: FetchResponse) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), response);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if self.offline.load(Ordering::Relaxed) {
            return Err(Error::Io(std::io::Error::other("network down")));
        }
        Ok(self
            .routes
            .lock()
            .unwrap()
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| FetchResponse::new(404, None, "not found")))
    }
}

/// A JSON version manifest, with or without a `version` field.
pub fn manifest(version: Option<&str>) -> FetchResponse {
    let body = match version {
        Some(v) => format!(r#"{{"name":"app","version":"{v}"}}"#),
        None => r#"{"name":"app"}"#.to_string(),
    };
    FetchResponse::ok("application/json", body)
}

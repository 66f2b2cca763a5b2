//! Network access for the cache worker.

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};

use super::{FetchRequest, FetchResponse};
use crate::error::Result;

/// Abstraction over the network for testability.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs `request` against the network. Any response, including
    /// error statuses, is `Ok`; only transport failures are errors.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Default fetcher: resolves origin-relative paths against `origin` and
/// issues them with reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: String,
}

impl HttpFetcher {
    #[must_use]
    pub fn new(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.origin)
        } else {
            path.to_string()
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let url = self.resolve(&request.path);
        log::debug!("{} {url}", request.method);

        let mut builder = self.client.request(request.method.clone(), &url);
        if request.no_cache {
            builder = builder.header(CACHE_CONTROL, "no-cache");
        }
        if let Some(content_type) = &request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(FetchResponse::new(status, content_type, body))
    }
}

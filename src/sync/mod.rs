//! Remote sync client.
//!
//! Talks to a single JSON endpoint: `POST {action:"saveData", data,
//! timestamp}` to push, `GET ?params` to pull. There is no retry and no
//! backoff; failed pushes made while offline are parked in the store's
//! pending-sync queue and sent later by [`SyncClient::drain_pending`].

use std::sync::{Arc, PoisonError, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::store::{StorageBackend, Store};

/// Shared online/offline flag.
///
/// Cloning yields a handle to the same flag.
#[derive(Debug, Clone)]
pub struct NetworkStatus(Arc<AtomicBool>);

impl NetworkStatus {
    /// Creates a flag with the given initial state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(Arc::new(AtomicBool::new(online)))
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Sets the flag and returns the previous state.
    pub fn set_online(&self, online: bool) -> bool {
        self.0.swap(online, Ordering::Relaxed)
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Body of a push request.
#[derive(Debug, Serialize)]
struct SyncRequest<'a> {
    action: &'static str,
    data: &'a Value,
    timestamp: DateTime<Utc>,
}

/// What happened to a payload handed to [`SyncClient::send_or_queue`].
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The remote accepted it; carries the parsed response.
    Sent(Value),
    /// The send failed while offline and the payload was queued.
    Queued,
}

/// HTTP client for the remote endpoint.
///
/// Clones share the endpoint and the online flag, so reconfiguring one
/// handle redirects every clone.
#[derive(Debug, Clone)]
pub struct SyncClient {
    http: reqwest::Client,
    endpoint: Arc<RwLock<String>>,
    network: NetworkStatus,
}

impl SyncClient {
    /// Builds a client from `config`, sharing `network` with the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SyncConfig, network: NetworkStatus) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(http, config.endpoint.clone(), network))
    }

    /// Wraps an existing reqwest client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, endpoint: String, network: NetworkStatus) -> Self {
        Self {
            http,
            endpoint: Arc::new(RwLock::new(endpoint)),
            network,
        }
    }

    /// Sets the remote endpoint URL for this client and all its clones. An
    /// empty string unconfigures them.
    pub fn configure(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        log::info!("Sync endpoint configured: {endpoint}");
        *self.endpoint.write().unwrap_or_else(PoisonError::into_inner) = endpoint;
    }

    #[must_use]
    pub fn endpoint(&self) -> String {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.endpoint().trim().is_empty()
    }

    #[must_use]
    pub const fn network(&self) -> &NetworkStatus {
        &self.network
    }

    fn require_endpoint(&self) -> Result<String> {
        let endpoint = self.endpoint();
        if endpoint.trim().is_empty() {
            Err(Error::NotConfigured)
        } else {
            Ok(endpoint)
        }
    }

    async fn parse(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    /// Pushes `data` to the remote.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`] without touching the network when no
    /// endpoint is set, [`Error::Status`] for a non-2xx answer, or an HTTP
    /// error.
    pub async fn send(&self, data: &Value) -> Result<Value> {
        let endpoint = self.require_endpoint()?;
        let body = SyncRequest {
            action: "saveData",
            data,
            timestamp: Utc::now(),
        };
        let response = self.http.post(&endpoint).json(&body).send().await?;
        Self::parse(response).await
    }

    /// Pushes `data`, parking it in the pending queue if the push fails while
    /// offline.
    ///
    /// # Errors
    ///
    /// Returns the send error when online (nothing is queued), or a storage
    /// error if queueing fails.
    pub async fn send_or_queue<B: StorageBackend>(
        &self,
        data: Value,
        store: &Store<B>,
    ) -> Result<SendOutcome> {
        match self.send(&data).await {
            Ok(response) => Ok(SendOutcome::Sent(response)),
            Err(e) if !self.network.is_online() => {
                log::warn!("Sync failed while offline, queueing: {e}");
                store.add_pending_sync(data)?;
                Ok(SendOutcome::Queued)
            }
            Err(e) => {
                log::error!("Sync failed: {e}");
                Err(e)
            }
        }
    }

    /// Fetches from the remote with `params` as the query string.
    ///
    /// # Errors
    ///
    /// Same as [`SyncClient::send`].
    pub async fn get<K, V>(&self, params: &[(K, V)]) -> Result<Value>
    where
        K: Serialize + Sync,
        V: Serialize + Sync,
    {
        let endpoint = self.require_endpoint()?;
        let response = self.http.get(&endpoint).query(params).send().await?;
        Self::parse(response).await
    }

    /// Issues `GET ?test=true`.
    ///
    /// # Errors
    ///
    /// Same as [`SyncClient::get`].
    pub async fn test_connection(&self) -> Result<Value> {
        self.get(&[("test", "true")]).await
    }

    /// Sends every queued item once, in queue order, removing each as it
    /// succeeds. Stops at the first failure. Returns how many were sent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConfigured`] when no endpoint is set, or a storage
    /// error if a sent item cannot be removed from the queue.
    pub async fn drain_pending<B: StorageBackend>(&self, store: &Store<B>) -> Result<usize> {
        self.require_endpoint()?;
        let mut sent = 0;
        for item in store.pending_sync() {
            if let Err(e) = self.send(&item.data).await {
                log::warn!("Pending item {} not sent: {e}", item.id);
                break;
            }
            store.remove_pending_sync_item(&item.id)?;
            sent += 1;
        }
        if sent > 0 {
            log::info!("Synced {sent} pending item(s)");
        }
        Ok(sent)
    }
}

/// Hook invoked by the cache worker on a background-sync message.
#[async_trait]
pub trait PendingDrain: Send + Sync {
    /// Drains the pending queue, returning the number of items sent.
    async fn drain(&self) -> Result<usize>;
}

/// [`PendingDrain`] backed by a [`SyncClient`] and a shared store.
pub struct SyncDrain<B: StorageBackend> {
    client: SyncClient,
    store: Arc<Store<B>>,
}

impl<B: StorageBackend> SyncDrain<B> {
    #[must_use]
    pub const fn new(client: SyncClient, store: Arc<Store<B>>) -> Self {
        Self { client, store }
    }
}

#[async_trait]
impl<B: StorageBackend + 'static> PendingDrain for SyncDrain<B> {
    async fn drain(&self) -> Result<usize> {
        self.client.drain_pending(self.store.as_ref()).await
    }
}

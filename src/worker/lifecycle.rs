//! Worker install/activate lifecycle and fetch strategy.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::future::try_join_all;
use serde::Deserialize;

use super::{CacheStore, FetchRequest, FetchResponse, Fetcher};
use crate::config::{DEFAULT_WORKER_VERSION, WorkerConfig};
use crate::error::{Error, Result};

/// Lifecycle state of a [`CacheWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Installing = 0,
    /// Installed and waiting for the active worker to step aside.
    Installed = 1,
    Activating = 2,
    Activated = 3,
    /// Replaced, or failed to install.
    Redundant = 4,
}

impl WorkerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Installing,
            1 => Self::Installed,
            2 => Self::Activating,
            3 => Self::Activated,
            _ => Self::Redundant,
        }
    }
}

#[derive(Deserialize)]
struct VersionManifest {
    version: Option<String>,
}

/// One version of the offline cache worker.
pub struct CacheWorker {
    config: WorkerConfig,
    fetcher: Arc<dyn Fetcher>,
    caches: Arc<dyn CacheStore>,
    state: AtomicU8,
}

impl std::fmt::Debug for CacheWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWorker")
            .field("version", &self.config.cache_name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CacheWorker {
    #[must_use]
    pub fn new(config: WorkerConfig, fetcher: Arc<dyn Fetcher>, caches: Arc<dyn CacheStore>) -> Self {
        Self {
            config,
            fetcher,
            caches,
            state: AtomicU8::new(WorkerState::Installing as u8),
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Cache name this worker was built for, e.g. `pwa-app-v1.0.0`.
    #[must_use]
    pub fn version(&self) -> String {
        self.config.cache_name()
    }

    #[must_use]
    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    #[must_use]
    pub fn caches(&self) -> &Arc<dyn CacheStore> {
        &self.caches
    }

    /// Fetches every static asset and stores them in the static bucket.
    ///
    /// All assets are fetched before anything is written, so a failure
    /// leaves no partial static cache. On failure the worker becomes
    /// redundant.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheInstall`] for the first asset that fails to
    /// fetch or answers with a non-success status, or a cache write error.
    pub async fn install(&self) -> Result<()> {
        log::info!("Installing cache worker {}", self.version());
        self.set_state(WorkerState::Installing);

        let result = self.precache().await;
        match &result {
            Ok(count) => {
                log::info!("Cached {count} static asset(s)");
                self.set_state(WorkerState::Installed);
            }
            Err(e) => {
                log::error!("Cache worker install failed: {e}");
                self.set_state(WorkerState::Redundant);
            }
        }
        result.map(|_| ())
    }

    async fn precache(&self) -> Result<usize> {
        let fetches = self.config.static_assets.iter().map(|path| async move {
            let response = self
                .fetcher
                .fetch(&FetchRequest::get(path.as_str()))
                .await
                .map_err(|e| Error::CacheInstall {
                    url: path.clone(),
                    reason: e.to_string(),
                })?;
            if !response.is_success() {
                return Err(Error::CacheInstall {
                    url: path.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            Ok((path.clone(), response))
        });
        let entries = try_join_all(fetches).await?;
        self.caches
            .put_all(&self.config.static_cache(), &entries)
            .await?;
        Ok(entries.len())
    }

    /// Deletes every bucket other than this version's static and dynamic
    /// buckets. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the buckets cannot be listed or deleted.
    pub async fn activate(&self) -> Result<usize> {
        log::info!("Activating cache worker {}", self.version());
        self.set_state(WorkerState::Activating);

        let keep = [self.config.static_cache(), self.config.dynamic_cache()];
        let mut deleted = 0;
        for bucket in self.caches.keys().await? {
            if !keep.contains(&bucket) {
                log::info!("Deleting old cache {bucket}");
                if self.caches.delete(&bucket).await? {
                    deleted += 1;
                }
            }
        }

        self.set_state(WorkerState::Activated);
        Ok(deleted)
    }

    /// Answers `request` network-first with a cache fallback.
    ///
    /// Non-GET and cross-origin requests go straight to the network. For
    /// the rest, a `200` network response is stored in the dynamic bucket;
    /// when the network fails the request is matched across all buckets,
    /// then navigations get the offline document, and anything else a
    /// synthetic `503`.
    ///
    /// # Errors
    ///
    /// Only pass-through requests fail, with the network error.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        if !request.is_cacheable() {
            return self.fetcher.fetch(request).await;
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.status == 200
                    && let Err(e) = self
                        .caches
                        .put(&self.config.dynamic_cache(), &request.path, &response)
                        .await
                {
                    log::warn!("Could not cache {}: {e}", request.path);
                }
                Ok(response)
            }
            Err(e) => {
                log::debug!("Network failed for {}: {e}", request.path);
                Ok(self.offline_response(request).await)
            }
        }
    }

    async fn offline_response(&self, request: &FetchRequest) -> FetchResponse {
        if let Some(cached) = self.lookup(&request.path).await {
            return cached;
        }
        if request.navigate
            && let Some(document) = self.lookup(&self.config.offline_document).await
        {
            return document;
        }
        FetchResponse::service_unavailable()
    }

    async fn lookup(&self, key: &str) -> Option<FetchResponse> {
        self.caches.match_any(key).await.unwrap_or_else(|e| {
            log::warn!("Cache lookup failed for {key}: {e}");
            None
        })
    }

    /// Whether the published version manifest names a different version.
    /// Any failure counts as no update.
    pub async fn check_for_update(&self) -> bool {
        match self.published_version().await {
            Ok(latest) => {
                let latest = format!("{}-{latest}", self.config.app_name);
                latest != self.version()
            }
            Err(e) => {
                log::error!("Error checking for updates: {e}");
                false
            }
        }
    }

    async fn published_version(&self) -> Result<String> {
        let request = FetchRequest::get(self.config.version_manifest.as_str()).with_no_cache();
        let response = self.fetcher.fetch(&request).await?;
        if !response.is_success() {
            return Err(Error::Status {
                status: response.status,
            });
        }
        let manifest: VersionManifest = serde_json::from_slice(&response.body)?;
        Ok(manifest
            .version
            .unwrap_or_else(|| DEFAULT_WORKER_VERSION.to_string()))
    }
}

/// Result of [`Registration::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// No worker was active; the new one took control.
    Activated,
    /// Another worker is active; the new one waits for skip-waiting.
    Waiting,
    /// Install failed; the previous worker (if any) stays in control.
    Failed,
}

/// Active and waiting workers of one scope.
#[derive(Debug, Default)]
pub struct Registration {
    active: Option<Arc<CacheWorker>>,
    waiting: Option<Arc<CacheWorker>>,
}

impl Registration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn active(&self) -> Option<&Arc<CacheWorker>> {
        self.active.as_ref()
    }

    #[must_use]
    pub const fn waiting(&self) -> Option<&Arc<CacheWorker>> {
        self.waiting.as_ref()
    }

    /// Installs `worker` and either activates it or parks it as waiting.
    /// A newer waiting worker replaces an older one.
    pub async fn register(&mut self, worker: Arc<CacheWorker>) -> RegisterOutcome {
        if worker.install().await.is_err() {
            return RegisterOutcome::Failed;
        }

        if self.active.is_none() {
            self.promote(worker).await;
            return RegisterOutcome::Activated;
        }

        if let Some(previous) = self.waiting.replace(worker) {
            previous.set_state(WorkerState::Redundant);
        }
        RegisterOutcome::Waiting
    }

    /// Promotes the waiting worker, if any, and activates it. Returns
    /// whether a worker was promoted.
    pub async fn skip_waiting(&mut self) -> bool {
        match self.waiting.take() {
            Some(worker) => {
                self.promote(worker).await;
                true
            }
            None => false,
        }
    }

    async fn promote(&mut self, worker: Arc<CacheWorker>) {
        if let Err(e) = worker.activate().await {
            log::error!("Cache worker activation failed: {e}");
            worker.set_state(WorkerState::Activated);
        }
        if let Some(previous) = self.active.replace(worker) {
            previous.set_state(WorkerState::Redundant);
        }
    }
}

//! Application controller.
//!
//! [`Desk`] ties the store, the sync client and the online flag together
//! and, when attached, talks to the cache worker. It is the library-level
//! counterpart of the page context: everything a front end needs, minus
//! rendering.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::calc::{self, Evaluation, Operation};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::model::{Calculation, ENDPOINT_SETTING, Record, RecordInput};
use crate::store::{FileBackend, StorageBackend, Store};
use crate::sync::{NetworkStatus, PendingDrain, SendOutcome, SyncClient, SyncDrain};
use crate::validate::validate_record;
use crate::worker::{BACKGROUND_SYNC_TAG, WorkerHandle, WorkerMessage};

/// What happened to the remote copy of a saved record. The local save has
/// always succeeded when one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The remote accepted the record.
    Synced,
    /// Offline: the record was queued for the next sync pass.
    Queued,
    /// Online, but the remote rejected or could not be reached.
    SyncFailed,
    /// No remote endpoint is configured.
    LocalOnly,
}

/// How a pending-queue sync was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPass {
    /// Drained directly; carries the number of items sent.
    Drained(usize),
    /// Handed to the cache worker, which reports back with `SYNC_COMPLETE`.
    Delegated,
    /// Offline, or nothing queued.
    Skipped,
}

/// Runtime information about the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInfo {
    pub version: String,
    pub is_online: bool,
    pub started: DateTime<Utc>,
    pub platform: String,
    /// Cache name of the active worker, if one is attached and active.
    pub worker_version: Option<String>,
    pub sync_configured: bool,
}

/// Application data export: runtime info plus the full document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppExport {
    pub app_info: AppInfo,
    pub user_data: Value,
    pub export_date: DateTime<Utc>,
}

/// The application controller.
pub struct Desk<B: StorageBackend = FileBackend> {
    store: Arc<Store<B>>,
    sync: SyncClient,
    network: NetworkStatus,
    worker: Option<WorkerHandle>,
    started: DateTime<Utc>,
}

impl Desk<FileBackend> {
    /// Opens the file-backed store and builds the sync client from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let network = NetworkStatus::default();
        let sync = SyncClient::new(&config.sync, network)?;
        Ok(Self::new(Store::open(&config.storage), sync))
    }
}

impl<B: StorageBackend + 'static> Desk<B> {
    /// Builds a controller. An endpoint saved in the settings overrides the
    /// one the client was built with.
    pub fn new(store: Store<B>, sync: SyncClient) -> Self {
        let saved = store
            .all_settings()
            .get_str(ENDPOINT_SETTING)
            .map(str::to_string);
        if let Some(endpoint) = saved {
            sync.configure(endpoint);
        }
        let network = sync.network().clone();
        Self {
            store: Arc::new(store),
            sync,
            network,
            worker: None,
            started: Utc::now(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Store<B> {
        &self.store
    }

    #[must_use]
    pub const fn sync_client(&self) -> &SyncClient {
        &self.sync
    }

    /// Connects the controller to a running cache worker.
    pub fn attach_worker(&mut self, handle: WorkerHandle) {
        self.worker = Some(handle);
    }

    #[must_use]
    pub const fn worker(&self) -> Option<&WorkerHandle> {
        self.worker.as_ref()
    }

    /// Drain hook for [`WorkerHandle::spawn`], sharing this controller's
    /// store and sync client.
    #[must_use]
    pub fn background_sync_hook(&self) -> Arc<dyn PendingDrain> {
        Arc::new(SyncDrain::new(self.sync.clone(), Arc::clone(&self.store)))
    }

    // ------------------------------------------------------------------
    // Connectivity
    // ------------------------------------------------------------------

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// Updates the online flag. Coming back online triggers a sync pass.
    ///
    /// # Errors
    ///
    /// Returns an error from the sync pass.
    pub async fn set_online(&self, online: bool) -> Result<SyncPass> {
        let was_online = self.network.set_online(online);
        if online && !was_online {
            log::info!("Back online");
            return self.sync_pending().await;
        }
        if !online && was_online {
            log::warn!("Working offline");
        }
        Ok(SyncPass::Skipped)
    }

    /// Sends queued items: through the worker's background sync when one is
    /// active, otherwise directly.
    ///
    /// # Errors
    ///
    /// Returns an error if a direct drain fails before sending anything.
    pub async fn sync_pending(&self) -> Result<SyncPass> {
        if !self.is_online() || self.store.pending_sync().is_empty() {
            return Ok(SyncPass::Skipped);
        }
        if let Some(worker) = &self.worker {
            let message = WorkerMessage::Sync {
                tag: BACKGROUND_SYNC_TAG.to_string(),
            };
            match worker.post(message).await {
                Ok(_) => return Ok(SyncPass::Delegated),
                Err(Error::NoController) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(SyncPass::Drained(self.sync.drain_pending(self.store.as_ref()).await?))
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Validates and stores a new record, then pushes it to the remote.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] (nothing is stored) or a storage error.
    /// Sync failures are reported through [`SaveOutcome`].
    pub async fn save_record(&self, input: RecordInput) -> Result<(Record, SaveOutcome)> {
        validate_record(&input)?;
        let now = Utc::now();
        let record = Record::from_input(self.store.next_record_id(now), input, now);
        self.store.save_record(record.clone())?;
        log::info!("Saved record {}", record.id);
        let outcome = self.push(&record).await?;
        Ok((record, outcome))
    }

    /// Overwrites the fields of record `id`, keeping its id and creation
    /// time. Returns `None` when no such record exists.
    ///
    /// # Errors
    ///
    /// As [`Desk::save_record`].
    pub async fn update_record(
        &self,
        id: &str,
        input: RecordInput,
    ) -> Result<Option<(Record, SaveOutcome)>> {
        validate_record(&input)?;
        let Some(mut record) = self.store.load_record(id) else {
            return Ok(None);
        };
        record.apply(input, Utc::now());
        self.store.save_record(record.clone())?;
        log::info!("Updated record {id}");
        let outcome = self.push(&record).await?;
        Ok(Some((record, outcome)))
    }

    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn delete_record(&self, id: &str) -> Result<bool> {
        self.store.delete_record(id)
    }

    async fn push(&self, record: &Record) -> Result<SaveOutcome> {
        if !self.sync.is_configured() {
            return Ok(SaveOutcome::LocalOnly);
        }
        let data = serde_json::to_value(record)?;
        if !self.is_online() {
            self.store.add_pending_sync(data)?;
            return Ok(SaveOutcome::Queued);
        }
        match self.sync.send_or_queue(data, self.store.as_ref()).await {
            Ok(SendOutcome::Sent(_)) => Ok(SaveOutcome::Synced),
            Ok(SendOutcome::Queued) => Ok(SaveOutcome::Queued),
            Err(e) => {
                log::warn!("Record {} saved locally, sync failed: {e}", record.id);
                Ok(SaveOutcome::SyncFailed)
            }
        }
    }

    // ------------------------------------------------------------------
    // Calculator
    // ------------------------------------------------------------------

    fn keep(&self, evaluation: std::result::Result<Evaluation, calc::CalcError>) -> Result<Calculation> {
        self.store.record_evaluation(evaluation?)
    }

    /// Evaluates `a op b` and appends it to history. Errors record nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Calc`] for invalid input, or a storage error.
    pub fn calculate(&self, a: f64, op: Operation, b: f64) -> Result<Calculation> {
        self.keep(calc::evaluate(a, op, b))
    }

    /// # Errors
    ///
    /// As [`Desk::calculate`].
    pub fn square_root(&self, a: f64) -> Result<Calculation> {
        self.keep(calc::square_root(a))
    }

    /// # Errors
    ///
    /// As [`Desk::calculate`].
    pub fn factorial(&self, n: i64) -> Result<Calculation> {
        self.keep(calc::factorial(n))
    }

    // ------------------------------------------------------------------
    // Remote endpoint
    // ------------------------------------------------------------------

    /// Sets the remote endpoint and persists it in the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the setting cannot be written.
    pub fn configure_endpoint(&self, endpoint: &str) -> Result<()> {
        self.sync.configure(endpoint);
        self.store
            .save_setting(ENDPOINT_SETTING, Value::from(endpoint))
    }

    /// # Errors
    ///
    /// See [`SyncClient::test_connection`].
    pub async fn test_connection(&self) -> Result<Value> {
        self.sync.test_connection().await
    }

    // ------------------------------------------------------------------
    // Updates
    // ------------------------------------------------------------------

    /// Asks the active worker whether a newer version is published. `false`
    /// when no worker is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker task has stopped.
    pub async fn check_for_updates(&self) -> Result<bool> {
        let Some(worker) = &self.worker else {
            return Ok(false);
        };
        match worker.check_update().await {
            Err(Error::NoController) => Ok(false),
            other => other,
        }
    }

    /// Promotes a waiting worker, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker task has stopped.
    pub async fn apply_update(&self) -> Result<()> {
        let Some(worker) = &self.worker else {
            return Ok(());
        };
        match worker.skip_waiting().await {
            Err(Error::NoController) => Ok(()),
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Info and backup
    // ------------------------------------------------------------------

    #[must_use]
    pub fn app_info(&self) -> AppInfo {
        AppInfo {
            version: env!("CARGO_PKG_VERSION").to_string(),
            is_online: self.is_online(),
            started: self.started,
            platform: std::env::consts::OS.to_string(),
            worker_version: self
                .worker
                .as_ref()
                .and_then(WorkerHandle::controller)
                .map(|w| w.version()),
            sync_configured: self.sync.is_configured(),
        }
    }

    /// Export wrapping the document with runtime info. [`Store::import`]
    /// accepts it back.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read.
    pub fn export_app_data(&self) -> Result<AppExport> {
        Ok(AppExport {
            app_info: self.app_info(),
            user_data: serde_json::to_value(self.store.export()?)?,
            export_date: Utc::now(),
        })
    }
}

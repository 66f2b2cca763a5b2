//! offline-desk - An offline-first contact book and calculator.
//!
//! Data lives in a single JSON document on disk and is optionally pushed to
//! a remote JSON endpoint. A cache worker can sit in front of the web
//! origin, answering network-first and falling back to its cache when the
//! network is gone.
//!
//! # Example
//!
//! ```no_run
//! use offline_desk::{AppConfig, Desk, Operation, RecordInput};
//!
//! # async fn example() -> offline_desk::Result<()> {
//! let config = AppConfig::load(&AppConfig::default_path())?;
//! let desk = Desk::open(&config)?;
//!
//! // Save a record; it is pushed to the remote if one is configured
//! let (record, outcome) = desk
//!     .save_record(RecordInput::new("Somchai", "somchai@example.com"))
//!     .await?;
//! println!("saved {} ({outcome:?})", record.id);
//!
//! // Calculations are kept in history
//! let calc = desk.calculate(5.0, Operation::Add, 3.0)?;
//! println!("{} = {}", calc.expression, calc.result);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod app;
pub mod calc;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod model;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod sync;
pub mod validate;
pub mod worker;

// Re-export main types for convenience
pub use app::{AppExport, AppInfo, Desk, SaveOutcome, SyncPass};
pub use calc::{CalcError, Evaluation, Operation};
pub use config::{AppConfig, ServerConfig, StorageConfig, SyncConfig, WorkerConfig};
pub use error::{Error, Result};
pub use export::{calculations_to_csv, records_to_csv};
pub use format::{format_bytes, format_number};
pub use model::{
    Calculation, Category, Document, ExportedDocument, PendingSyncItem, Record, RecordInput,
    Settings,
};
pub use store::{
    CleanupOptions, FileBackend, MemoryBackend, SearchOptions, SortKey, SortOrder, Statistics,
    StorageBackend, StorageInfo, Store,
};
pub use sync::{NetworkStatus, PendingDrain, SyncClient};
pub use validate::{ValidationError, validate_record};
pub use worker::{
    CacheStore, CacheWorker, ClientMessage, DiskCacheStore, FetchRequest, FetchResponse, Fetcher,
    HttpFetcher, MemoryCacheStore, WorkerHandle, WorkerMessage, WorkerReply,
};

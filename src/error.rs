//! Error types for the offline-desk library.

use thiserror::Error;

use crate::calc::CalcError;
use crate::validate::ValidationError;

/// Errors that can occur across storage, sync and cache operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from a storage backend or cache bucket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote answered with a non-success status.
    #[error("HTTP error! status: {status}")]
    Status {
        /// Status code returned by the remote.
        status: u16,
    },

    /// The remote sync endpoint URL has not been set.
    #[error("remote endpoint not configured")]
    NotConfigured,

    /// Record failed validation; nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Calculator rejected the input; nothing was recorded.
    #[error(transparent)]
    Calc(#[from] CalcError),

    /// Imported data is not a document or export.
    #[error("invalid import: {0}")]
    Import(String),

    /// A static asset could not be fetched during worker install.
    #[error("cache install failed for {url}: {reason}")]
    CacheInstall {
        /// Asset that failed.
        url: String,
        /// Why it failed.
        reason: String,
    },

    /// A worker message was malformed or of an unknown type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No cache worker is active to receive the message.
    #[error("no active cache worker")]
    NoController,

    /// The worker task has shut down.
    #[error("cache worker is not running")]
    WorkerGone,
}

/// A specialized `Result` type for offline-desk operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Messages exchanged between page contexts and the worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Sync tag that triggers a pending-queue drain.
pub const BACKGROUND_SYNC_TAG: &str = "background-sync";

/// Page → worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Ask whether a newer version is published. Replies `{hasUpdate}`.
    CheckUpdate,
    /// Promote the waiting worker. No reply.
    SkipWaiting,
    /// Replies `{version}` with the active cache name.
    GetVersion,
    /// Background sync request. No reply.
    Sync { tag: String },
}

impl WorkerMessage {
    /// Parses a JSON message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed JSON or an unknown `type`.
    pub fn parse(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Interprets an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `value` is not a known message.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| Error::Protocol(e.to_string()))
    }
}

/// Worker → page reply to a single message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerReply {
    HasUpdate {
        #[serde(rename = "hasUpdate")]
        has_update: bool,
    },
    Version { version: String },
}

/// Payload of [`ClientMessage::SyncComplete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSummary {
    pub count: usize,
}

/// Worker → every page, unsolicited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    SyncComplete { data: SyncSummary },
    /// A new worker installed and is waiting to take over.
    UpdateAvailable,
}

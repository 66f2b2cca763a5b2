//! Storage and usage statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::format::format_bytes;
use crate::model::{Calculation, Document, Record};

/// Size and count summary of the persisted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInfo {
    pub total_items: usize,
    pub total_calculations: usize,
    pub pending_sync_items: usize,
    /// Serialized document size in bytes.
    pub storage_bytes: u64,
    pub last_access: DateTime<Utc>,
    pub version: String,
}

impl StorageInfo {
    /// Builds the summary for `document`, whose serialized form is
    /// `serialized_len` bytes long.
    #[must_use]
    pub fn new(document: &Document, serialized_len: usize) -> Self {
        Self {
            total_items: document.users.len(),
            total_calculations: document.calculations.len(),
            pending_sync_items: document.pending_sync.len(),
            storage_bytes: serialized_len as u64,
            last_access: document.metadata.last_access,
            version: document.metadata.version.clone(),
        }
    }

    /// Human-readable storage size, e.g. `1.50 KB`.
    #[must_use]
    pub fn storage_size(&self) -> String {
        format_bytes(self.storage_bytes)
    }
}

/// Record statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStats {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
    /// Records created within the last seven days.
    pub recent_week: usize,
    /// Most recently created record.
    pub latest: Option<Record>,
}

/// Calculation statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationStats {
    pub total: usize,
    pub recent_week: usize,
    /// Last entry in history order.
    pub latest: Option<Calculation>,
}

/// Combined statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub users: RecordStats,
    pub calculations: CalculationStats,
    pub storage: StorageInfo,
}

impl Statistics {
    /// Computes statistics relative to `now`.
    #[must_use]
    pub fn compute(document: &Document, serialized_len: usize, now: DateTime<Utc>) -> Self {
        let week_ago = now - Duration::days(7);

        let mut by_category = BTreeMap::new();
        for record in &document.users {
            *by_category
                .entry(record.category.as_str().to_string())
                .or_insert(0) += 1;
        }

        Self {
            users: RecordStats {
                total: document.users.len(),
                by_category,
                recent_week: document
                    .users
                    .iter()
                    .filter(|r| r.timestamp > week_ago)
                    .count(),
                latest: document.users.iter().max_by_key(|r| r.timestamp).cloned(),
            },
            calculations: CalculationStats {
                total: document.calculations.len(),
                recent_week: document
                    .calculations
                    .iter()
                    .filter(|c| c.timestamp > week_ago)
                    .count(),
                latest: document.calculations.last().cloned(),
            },
            storage: StorageInfo::new(document, serialized_len),
        }
    }
}

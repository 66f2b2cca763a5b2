//! Local document store.
//!
//! Every operation is a whole-document read-modify-write against a single
//! key of a [`StorageBackend`]. There are no transactions: concurrent
//! writers race and the last write wins. Read paths degrade to empty
//! defaults when the backend fails; write paths return the error so the
//! caller can log it.

mod backend;
mod query;
mod stats;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use query::{SearchOptions, SortKey, SortOrder};
pub use stats::{CalculationStats, RecordStats, Statistics, StorageInfo};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::calc::Evaluation;
use crate::config::{DEFAULT_STORAGE_KEY, StorageConfig};
use crate::error::{Error, Result};
use crate::model::{
    Calculation, Category, DOCUMENT_VERSION, Document, ExportInfo, ExportedDocument,
    MAX_CALCULATIONS, PENDING_USER_DATA, PendingSyncItem, Record, Settings, timestamp_id,
    trim_front,
};

/// Options for [`Store::cleanup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOptions {
    /// Pending-sync items older than this are dropped.
    pub older_than_days: i64,
    /// Calculation history is trimmed to this many entries.
    pub max_calculations: usize,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            older_than_days: 90,
            max_calculations: MAX_CALCULATIONS,
        }
    }
}

/// Fields accepted by [`Store::import`]. Absent collections keep the
/// current ones.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportPayload {
    users: Option<Vec<Record>>,
    calculations: Option<Vec<Calculation>>,
    settings: Option<Settings>,
}

/// Returns a timestamp id not already taken according to `taken`.
fn unique_id(now: DateTime<Utc>, taken: impl Fn(&str) -> bool) -> String {
    let mut millis = now.timestamp_millis();
    loop {
        let id = millis.to_string();
        if !taken(&id) {
            return id;
        }
        millis += 1;
    }
}

/// The application document store.
pub struct Store<B: StorageBackend = FileBackend> {
    backend: B,
    key: String,
}

impl Store<FileBackend> {
    /// Opens the file-backed store described by `config` and initializes it.
    #[must_use]
    pub fn open(config: &StorageConfig) -> Self {
        Self::new(FileBackend::new(&config.data_dir), config.key.clone())
    }
}

impl Store<MemoryBackend> {
    /// Creates an initialized in-memory store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new(), DEFAULT_STORAGE_KEY)
    }
}

impl<B: StorageBackend> Store<B> {
    /// Wraps `backend` and initializes the document under `key`.
    pub fn new(backend: B, key: impl Into<String>) -> Self {
        let store = Self {
            backend,
            key: key.into(),
        };
        store.init();
        store
    }

    /// Returns a reference to the underlying backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Storage key of the document.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Creates the document if absent and touches `lastAccess`.
    pub fn init(&self) {
        let now = Utc::now();
        let result = self.update(|doc| doc.metadata.last_access = now);
        if let Err(e) = result {
            log::error!("Error initializing document: {e}");
        }
    }

    /// Reads and parses the document. A missing or unparseable document is
    /// `Ok(None)`; only backend failures are errors.
    fn load(&self) -> Result<Option<Document>> {
        let Some(raw) = self.backend.get_item(&self.key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                log::warn!("Discarding unparseable document under {}: {e}", self.key);
                Ok(None)
            }
        }
    }

    /// Reads the document, logging and swallowing backend failures.
    fn read(&self) -> Option<Document> {
        self.load().unwrap_or_else(|e| {
            log::error!("Error reading document: {e}");
            None
        })
    }

    fn write(&self, doc: &Document) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        self.backend.set_item(&self.key, &json).map_err(|e| {
            log::error!("Error writing document: {e}");
            Error::Io(e)
        })
    }

    /// Read-modify-write. An absent document is re-initialized first.
    fn update<T>(&self, f: impl FnOnce(&mut Document) -> T) -> Result<T> {
        let mut doc = self.load()?.unwrap_or_else(|| Document::new(Utc::now()));
        let out = f(&mut doc);
        self.write(&doc)?;
        Ok(out)
    }

    /// Returns a snapshot of the whole document.
    #[must_use]
    pub fn document(&self) -> Option<Document> {
        self.read()
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Inserts `record`, or overwrites the record with the same id in place.
    /// An overwrite keeps the stored creation time and bumps `last_modified`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save_record(&self, record: Record) -> Result<()> {
        self.update(|doc| {
            if let Some(existing) = doc.users.iter_mut().find(|r| r.id == record.id) {
                *existing = Record {
                    timestamp: existing.timestamp,
                    last_modified: Utc::now(),
                    ..record
                };
            } else {
                doc.users.push(record);
            }
        })
    }

    /// Returns a creation-time id not used by any stored record.
    #[must_use]
    pub fn next_record_id(&self, now: DateTime<Utc>) -> String {
        let users = self.all_records();
        unique_id(now, |id| users.iter().any(|r| r.id == id))
    }

    #[must_use]
    pub fn load_record(&self, id: &str) -> Option<Record> {
        self.read()?.users.into_iter().find(|r| r.id == id)
    }

    #[must_use]
    pub fn all_records(&self) -> Vec<Record> {
        self.read().map(|doc| doc.users).unwrap_or_default()
    }

    /// Removes the record with `id`. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn delete_record(&self, id: &str) -> Result<bool> {
        self.update(|doc| {
            let before = doc.users.len();
            doc.users.retain(|r| r.id != id);
            doc.users.len() != before
        })
    }

    #[must_use]
    pub fn record_count(&self) -> usize {
        self.read().map_or(0, |doc| doc.users.len())
    }

    /// Free-text search; an empty query returns every record.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<Record> {
        let records = self.all_records();
        if query.is_empty() {
            return records;
        }
        records
            .into_iter()
            .filter(|r| query::matches_query(r, query))
            .collect()
    }

    /// Records in `category`; `None` returns every record.
    #[must_use]
    pub fn filter_by_category(&self, category: Option<Category>) -> Vec<Record> {
        let records = self.all_records();
        match category {
            Some(category) => records
                .into_iter()
                .filter(|r| r.category == category)
                .collect(),
            None => records,
        }
    }

    #[must_use]
    pub fn advanced_search(&self, options: &SearchOptions) -> Vec<Record> {
        query::apply(self.all_records(), options)
    }

    // ------------------------------------------------------------------
    // Calculations
    // ------------------------------------------------------------------

    /// Appends `calculation` to history, keeping the most recent 100.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save_calculation(&self, calculation: Calculation) -> Result<()> {
        self.update(|doc| doc.push_calculation(calculation))
    }

    /// Stamps `evaluation` with an id and timestamp and appends it to history.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn record_evaluation(&self, evaluation: Evaluation) -> Result<Calculation> {
        let now = Utc::now();
        let calculation = Calculation {
            id: timestamp_id(now),
            expression: evaluation.expression,
            result: evaluation.result,
            timestamp: now,
        };
        self.save_calculation(calculation.clone())?;
        Ok(calculation)
    }

    #[must_use]
    pub fn calculation_history(&self) -> Vec<Calculation> {
        self.read().map(|doc| doc.calculations).unwrap_or_default()
    }

    #[must_use]
    pub fn calculation_count(&self) -> usize {
        self.read().map_or(0, |doc| doc.calculations.len())
    }

    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn clear_calculation_history(&self) -> Result<()> {
        self.update(|doc| doc.calculations.clear())
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn save_setting(&self, key: &str, value: Value) -> Result<()> {
        self.update(|doc| doc.settings.set(key, value))
    }

    #[must_use]
    pub fn load_setting(&self, key: &str) -> Option<Value> {
        self.read()?.settings.get(key).cloned()
    }

    /// Every setting; defaults when the document cannot be read.
    #[must_use]
    pub fn all_settings(&self) -> Settings {
        self.read().map(|doc| doc.settings).unwrap_or_default()
    }

    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn reset_settings(&self) -> Result<()> {
        self.update(|doc| doc.settings = Settings::default())
    }

    // ------------------------------------------------------------------
    // Pending sync queue
    // ------------------------------------------------------------------

    /// Queues `data` for a later sync attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn add_pending_sync(&self, data: Value) -> Result<PendingSyncItem> {
        let now = Utc::now();
        self.update(|doc| {
            let id = unique_id(now, |id| doc.pending_sync.iter().any(|p| p.id == id));
            let item = PendingSyncItem {
                id,
                data,
                timestamp: now,
                kind: PENDING_USER_DATA.to_string(),
            };
            doc.pending_sync.push(item.clone());
            item
        })
    }

    #[must_use]
    pub fn pending_sync(&self) -> Vec<PendingSyncItem> {
        self.read().map(|doc| doc.pending_sync).unwrap_or_default()
    }

    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn clear_pending_sync(&self) -> Result<()> {
        self.update(|doc| doc.pending_sync.clear())
    }

    /// Removes one queued item. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written.
    pub fn remove_pending_sync_item(&self, id: &str) -> Result<bool> {
        self.update(|doc| {
            let before = doc.pending_sync.len();
            doc.pending_sync.retain(|p| p.id != id);
            doc.pending_sync.len() != before
        })
    }

    // ------------------------------------------------------------------
    // Backup and restore
    // ------------------------------------------------------------------

    /// Full document dump plus export metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn export(&self) -> Result<ExportedDocument> {
        let now = Utc::now();
        let document = self.load()?.unwrap_or_else(|| Document::new(now));
        Ok(ExportedDocument {
            document,
            export_info: ExportInfo {
                export_date: now,
                version: DOCUMENT_VERSION.to_string(),
                source: env!("CARGO_PKG_NAME").to_string(),
            },
        })
    }

    /// Pretty-printed JSON export.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export()?)?)
    }

    /// Imports a JSON export (or a bare document, or an app export wrapping
    /// one under `userData`).
    ///
    /// Imported records and calculations replace the current ones when
    /// present; settings merge defaults, then current, then imported; the
    /// pending queue is kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Import`] for anything that is not a JSON object with
    /// well-formed collections, or an I/O error if the write fails.
    pub fn import(&self, value: Value) -> Result<()> {
        let value = match value {
            Value::Object(mut map) => match map.remove("userData") {
                Some(inner @ Value::Object(_)) => inner,
                Some(_) => return Err(Error::Import("Invalid data format".into())),
                None => Value::Object(map),
            },
            _ => return Err(Error::Import("Invalid data format".into())),
        };
        let payload: ImportPayload =
            serde_json::from_value(value).map_err(|e| Error::Import(e.to_string()))?;

        let now = Utc::now();
        self.update(|doc| {
            if let Some(users) = payload.users {
                doc.users = users;
            }
            if let Some(mut calculations) = payload.calculations {
                trim_front(&mut calculations, MAX_CALCULATIONS);
                doc.calculations = calculations;
            }
            let mut settings = Settings::default();
            settings.merge(std::mem::take(&mut doc.settings));
            if let Some(imported) = payload.settings {
                settings.merge(imported);
            }
            doc.settings = settings;
            doc.metadata.last_import = Some(now);
        })
    }

    /// Parses `json` and imports it.
    ///
    /// # Errors
    ///
    /// See [`Store::import`].
    pub fn import_json(&self, json: &str) -> Result<()> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::Import(e.to_string()))?;
        self.import(value)
    }

    // ------------------------------------------------------------------
    // Utilities
    // ------------------------------------------------------------------

    #[must_use]
    pub fn storage_info(&self) -> Option<StorageInfo> {
        let doc = self.read()?;
        let len = serde_json::to_string(&doc).map_or(0, |s| s.len());
        Some(StorageInfo::new(&doc, len))
    }

    #[must_use]
    pub fn statistics(&self) -> Option<Statistics> {
        let doc = self.read()?;
        let len = serde_json::to_string(&doc).map_or(0, |s| s.len());
        Some(Statistics::compute(&doc, len, Utc::now()))
    }

    /// Removes the document and re-initializes an empty one.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend refuses the removal or the fresh
    /// document cannot be written.
    pub fn clear_all(&self) -> Result<()> {
        self.backend.remove_item(&self.key)?;
        self.write(&Document::new(Utc::now()))
    }

    /// Trims calculation history and drops stale pending-sync items.
    /// Returns whether anything changed; nothing is written otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or written.
    pub fn cleanup(&self, options: CleanupOptions) -> Result<bool> {
        self.cleanup_at(options, Utc::now())
    }

    fn cleanup_at(&self, options: CleanupOptions, now: DateTime<Utc>) -> Result<bool> {
        let Some(mut doc) = self.load()? else {
            return Ok(false);
        };
        let mut changed = false;

        if doc.calculations.len() > options.max_calculations {
            trim_front(&mut doc.calculations, options.max_calculations);
            changed = true;
        }

        // An age past the representable range keeps every pending item
        let cutoff = Duration::try_days(options.older_than_days)
            .and_then(|age| now.checked_sub_signed(age));
        if let Some(cutoff) = cutoff {
            let before = doc.pending_sync.len();
            doc.pending_sync.retain(|p| p.timestamp > cutoff);
            changed |= doc.pending_sync.len() != before;
        }

        if changed {
            self.write(&doc)?;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RecordInput;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn record(id: &str, name: &str) -> Record {
        Record::from_input(
            id.into(),
            RecordInput::new(name, format!("{}@x.com", name.to_lowercase())),
            Utc::now(),
        )
    }

    fn calc(i: usize) -> Calculation {
        Calculation {
            id: i.to_string(),
            expression: format!("{i} + 0"),
            result: i as f64,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn new_store_initializes_document() {
        let store = Store::in_memory();
        let doc = store.document().unwrap();
        assert!(doc.users.is_empty());
        assert_eq!(doc.settings, Settings::default());
        assert_eq!(doc.metadata.version, "1.0.0");
    }

    #[test]
    fn init_touches_last_access_but_keeps_data() {
        let store = Store::in_memory();
        store.save_record(record("1", "A")).unwrap();
        let before = store.document().unwrap().metadata;

        std::thread::sleep(std::time::Duration::from_millis(5));
        store.init();

        let after = store.document().unwrap();
        assert_eq!(after.users.len(), 1);
        assert_eq!(after.metadata.created, before.created);
        assert!(after.metadata.last_access > before.last_access);
    }

    #[test]
    fn save_existing_id_updates_in_place() {
        let store = Store::in_memory();
        store.save_record(record("1", "A")).unwrap();
        store.save_record(record("2", "B")).unwrap();

        let mut edited = record("1", "Alpha");
        edited.note = Some("edited".into());
        store.save_record(edited).unwrap();

        assert_eq!(store.record_count(), 2);
        let loaded = store.load_record("1").unwrap();
        assert_eq!(loaded.name, "Alpha");
        assert_eq!(loaded.note.as_deref(), Some("edited"));
        assert_eq!(store.all_records()[0].id, "1");
    }

    #[test]
    fn delete_record_reports_removal() {
        let store = Store::in_memory();
        store.save_record(record("1", "A")).unwrap();
        assert!(store.delete_record("1").unwrap());
        assert!(!store.delete_record("1").unwrap());
        assert_eq!(store.record_count(), 0);
        assert!(store.load_record("1").is_none());
    }

    #[test]
    fn next_record_id_skips_taken_ids() {
        let store = Store::in_memory();
        let now = Utc::now();
        let first = store.next_record_id(now);
        store.save_record(record(&first, "A")).unwrap();
        let second = store.next_record_id(now);
        assert_ne!(first, second);
        assert_eq!(
            second.parse::<i64>().unwrap(),
            first.parse::<i64>().unwrap() + 1
        );
    }

    #[test]
    fn search_and_category_filter() {
        let store = Store::in_memory();
        store.save_record(record("1", "Alice")).unwrap();
        let mut bob = record("2", "Bob");
        bob.category = Category::Work;
        store.save_record(bob).unwrap();

        assert_eq!(store.search("").len(), 2);
        assert_eq!(store.search("ali").len(), 1);
        assert_eq!(store.filter_by_category(None).len(), 2);
        assert_eq!(store.filter_by_category(Some(Category::Work)).len(), 1);
        assert_eq!(
            store
                .advanced_search(&SearchOptions::new().sorted_by(SortKey::Name, SortOrder::Desc))
                .first()
                .map(|r| r.name.clone()),
            Some("Bob".to_string())
        );
    }

    #[test]
    fn calculation_history_keeps_most_recent_hundred() {
        let store = Store::in_memory();
        for i in 0..150 {
            store.save_calculation(calc(i)).unwrap();
        }
        let history = store.calculation_history();
        assert_eq!(history.len(), 100);
        let ids: Vec<usize> = history.iter().map(|c| c.id.parse().unwrap()).collect();
        assert_eq!(ids, (50..150).collect::<Vec<_>>());
    }

    #[test]
    fn clear_calculation_history_empties() {
        let store = Store::in_memory();
        store.save_calculation(calc(1)).unwrap();
        store.clear_calculation_history().unwrap();
        assert_eq!(store.calculation_count(), 0);
    }

    #[test]
    fn settings_round_trip_and_reset() {
        let store = Store::in_memory();
        store.save_setting("theme", Value::from("dark")).unwrap();
        assert_eq!(store.load_setting("theme"), Some(Value::from("dark")));
        assert_eq!(store.load_setting("missing"), None);

        store.reset_settings().unwrap();
        assert_eq!(store.all_settings(), Settings::default());
    }

    #[test]
    fn pending_sync_queue() {
        let store = Store::in_memory();
        let a = store.add_pending_sync(serde_json::json!({"n": 1})).unwrap();
        let b = store.add_pending_sync(serde_json::json!({"n": 2})).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.kind, "user_data");
        assert_eq!(store.pending_sync().len(), 2);

        assert!(store.remove_pending_sync_item(&a.id).unwrap());
        assert_eq!(store.pending_sync(), vec![b]);

        store.clear_pending_sync().unwrap();
        assert!(store.pending_sync().is_empty());
    }

    #[test]
    fn export_then_import_into_fresh_store() {
        let source = Store::in_memory();
        source.save_record(record("1", "A")).unwrap();
        source.save_record(record("2", "B")).unwrap();
        for i in 0..5 {
            source.save_calculation(calc(i)).unwrap();
        }
        source.save_setting("theme", Value::from("dark")).unwrap();
        let json = source.export_json().unwrap();

        let target = Store::in_memory();
        target.import_json(&json).unwrap();

        let mut ids: Vec<_> = target.all_records().into_iter().map(|r| r.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(target.calculation_history(), source.calculation_history());
        assert_eq!(target.load_setting("theme"), Some(Value::from("dark")));
        assert!(target.document().unwrap().metadata.last_import.is_some());
    }

    #[test]
    fn import_keeps_current_collections_when_absent() {
        let store = Store::in_memory();
        store.save_record(record("1", "A")).unwrap();
        store.add_pending_sync(Value::Null).unwrap();

        store
            .import(serde_json::json!({"settings": {"fontSize": "large"}}))
            .unwrap();

        assert_eq!(store.record_count(), 1);
        assert_eq!(store.pending_sync().len(), 1);
        let settings = store.all_settings();
        assert_eq!(settings.get_str("fontSize"), Some("large"));
        assert_eq!(settings.get_str("theme"), Some("default"));
    }

    #[test]
    fn import_unwraps_app_export() {
        let store = Store::in_memory();
        store
            .import(serde_json::json!({"userData": {"users": []}, "appInfo": {}}))
            .unwrap();
        assert_eq!(store.record_count(), 0);
    }

    #[test]
    fn import_caps_calculations() {
        let store = Store::in_memory();
        let calcs: Vec<_> = (0..120).map(calc).collect();
        store
            .import(serde_json::json!({ "calculations": calcs }))
            .unwrap();
        let history = store.calculation_history();
        assert_eq!(history.len(), 100);
        assert_eq!(history[0].id, "20");
    }

    #[test]
    fn import_rejects_non_objects() {
        let store = Store::in_memory();
        assert!(matches!(
            store.import(serde_json::json!([1, 2])),
            Err(Error::Import(_))
        ));
        assert!(matches!(store.import_json("not json"), Err(Error::Import(_))));
        assert!(matches!(
            store.import(serde_json::json!({"users": "nope"})),
            Err(Error::Import(_))
        ));
    }

    #[test]
    fn clear_all_reinitializes() {
        let store = Store::in_memory();
        store.save_record(record("1", "A")).unwrap();
        store.save_setting("theme", Value::from("dark")).unwrap();
        store.clear_all().unwrap();

        let doc = store.document().unwrap();
        assert!(doc.users.is_empty());
        assert_eq!(doc.settings, Settings::default());
    }

    #[test]
    fn cleanup_drops_stale_pending_items() {
        let store = Store::in_memory();
        store.add_pending_sync(Value::from(1)).unwrap();

        let soon = Utc::now() + Duration::days(1);
        assert!(!store.cleanup_at(CleanupOptions::default(), soon).unwrap());

        let later = Utc::now() + Duration::days(91);
        assert!(store.cleanup_at(CleanupOptions::default(), later).unwrap());
        assert!(store.pending_sync().is_empty());
    }

    #[test]
    fn cleanup_with_out_of_range_age_keeps_pending() {
        let store = Store::in_memory();
        store.add_pending_sync(Value::Null).unwrap();
        for days in [i64::MAX, i64::MIN, 200_000_000] {
            let options = CleanupOptions {
                older_than_days: days,
                ..CleanupOptions::default()
            };
            assert!(!store.cleanup(options).unwrap());
            assert_eq!(store.pending_sync().len(), 1);
        }
    }

    #[test]
    fn cleanup_trims_to_custom_limit() {
        let store = Store::in_memory();
        for i in 0..10 {
            store.save_calculation(calc(i)).unwrap();
        }
        let options = CleanupOptions {
            max_calculations: 3,
            ..CleanupOptions::default()
        };
        assert!(store.cleanup(options).unwrap());
        let ids: Vec<_> = store
            .calculation_history()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["7", "8", "9"]);
    }

    #[test]
    fn storage_info_and_statistics() {
        let store = Store::in_memory();
        store.save_record(record("1", "A")).unwrap();
        store.add_pending_sync(Value::Null).unwrap();

        let info = store.storage_info().unwrap();
        assert_eq!(info.total_items, 1);
        assert_eq!(info.pending_sync_items, 1);
        assert!(info.storage_bytes > 0);

        let stats = store.statistics().unwrap();
        assert_eq!(stats.users.total, 1);
        assert_eq!(stats.users.recent_week, 1);
    }

    #[test]
    fn corrupt_document_is_reinitialized() {
        let backend = MemoryBackend::new();
        backend.set_item(DEFAULT_STORAGE_KEY, "{not json").unwrap();
        let store = Store::new(backend, DEFAULT_STORAGE_KEY);
        assert_eq!(store.record_count(), 0);
        assert!(store.document().is_some());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            key: "doc".into(),
        };
        Store::open(&config).save_record(record("1", "A")).unwrap();

        let reopened = Store::open(&config);
        assert_eq!(reopened.record_count(), 1);
        assert!(dir.path().join("doc.json").exists());
    }

    /// A backend whose every operation can be switched to fail.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        broken: AtomicBool,
    }

    impl FlakyBackend {
        fn check(&self) -> io::Result<()> {
            if self.broken.load(Ordering::Relaxed) {
                Err(io::Error::other("quota exceeded"))
            } else {
                Ok(())
            }
        }
    }

    impl StorageBackend for FlakyBackend {
        fn get_item(&self, key: &str) -> io::Result<Option<String>> {
            self.check()?;
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> io::Result<()> {
            self.check()?;
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> io::Result<()> {
            self.check()?;
            self.inner.remove_item(key)
        }
    }

    #[test]
    fn unavailable_storage_degrades_to_defaults() {
        let store = Store::new(FlakyBackend::default(), "doc");
        store.save_record(record("1", "A")).unwrap();
        store.backend().broken.store(true, Ordering::Relaxed);

        assert!(store.all_records().is_empty());
        assert_eq!(store.record_count(), 0);
        assert!(store.load_record("1").is_none());
        assert_eq!(store.all_settings(), Settings::default());
        assert!(store.storage_info().is_none());
        assert!(matches!(store.save_record(record("2", "B")), Err(Error::Io(_))));

        store.backend().broken.store(false, Ordering::Relaxed);
        assert_eq!(store.record_count(), 1);
    }
}

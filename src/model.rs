//! Persisted data model: records, calculations, pending-sync items, settings
//! and the single aggregate document that holds them.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Schema version stamped into document metadata and exports.
pub const DOCUMENT_VERSION: &str = "1.0.0";

/// Maximum number of calculations kept in history.
pub const MAX_CALCULATIONS: usize = 100;

/// Pending-sync `type` for queued record sends.
pub const PENDING_USER_DATA: &str = "user_data";

/// Returns a creation-time identifier (milliseconds since the epoch).
#[must_use]
pub fn timestamp_id(now: DateTime<Utc>) -> String {
    now.timestamp_millis().to_string()
}

/// Record category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    #[default]
    Personal,
    Work,
    Business,
    Other,
}

impl Category {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Work => "work",
            Self::Business => "business",
            Self::Other => "other",
        }
    }

    /// Human-readable label used in CSV exports.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Personal => "Personal",
            Self::Work => "Work",
            Self::Business => "Business",
            Self::Other => "Other",
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        s.parse().unwrap_or(Self::Other)
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "personal" => Ok(Self::Personal),
            "work" => Ok(Self::Work),
            "business" => Ok(Self::Business),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown category: {other}")),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored contact/form record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub category: Category,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Record {
    /// Builds a record from user input, stamping both timestamps with `now`.
    #[must_use]
    pub fn from_input(id: String, input: RecordInput, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            phone: non_blank(input.phone),
            category: input.category,
            note: non_blank(input.note),
            timestamp: now,
            last_modified: now,
        }
    }

    /// Overwrites every user-editable field and bumps `last_modified`.
    pub fn apply(&mut self, input: RecordInput, now: DateTime<Utc>) {
        self.name = input.name.trim().to_string();
        self.email = input.email.trim().to_string();
        self.phone = non_blank(input.phone);
        self.category = input.category;
        self.note = non_blank(input.note);
        self.last_modified = now;
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// User-supplied record fields, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordInput {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub category: Category,
    pub note: Option<String>,
}

impl RecordInput {
    /// Creates input with the two required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    #[must_use]
    pub const fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A calculator history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calculation {
    pub id: String,
    pub expression: String,
    pub result: f64,
    pub timestamp: DateTime<Utc>,
}

/// A payload queued for a later remote-sync attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSyncItem {
    pub id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Flat key/value settings map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Settings(Map<String, Value>);

/// Setting holding the remote sync endpoint URL.
pub const ENDPOINT_SETTING: &str = "googleScriptUrl";

impl Default for Settings {
    fn default() -> Self {
        let mut map = Map::new();
        map.insert("theme".into(), Value::from("default"));
        map.insert("fontSize".into(), Value::from("medium"));
        map.insert("language".into(), Value::from("th"));
        map.insert("notifications".into(), Value::from(true));
        map.insert("autoSync".into(), Value::from(true));
        map.insert("offlineMode".into(), Value::from(true));
        map.insert(ENDPOINT_SETTING.into(), Value::from(""));
        Self(map)
    }
}

impl Settings {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Overlays every key of `other` onto `self`.
    pub fn merge(&mut self, other: Self) {
        self.0.extend(other.0);
    }

    /// Returns a string setting, treating empty strings as unset.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Document bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub version: String,
    pub created: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_import: Option<DateTime<Utc>>,
}

impl Metadata {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            version: DOCUMENT_VERSION.to_string(),
            created: now,
            last_access: now,
            last_import: None,
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

/// The single persisted aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub users: Vec<Record>,
    #[serde(default)]
    pub calculations: Vec<Calculation>,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub pending_sync: Vec<PendingSyncItem>,
}

impl Document {
    /// A fresh document with empty collections and default settings.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            metadata: Metadata::new(now),
            ..Self::default()
        }
    }

    /// Appends a calculation, keeping only the most recent `MAX_CALCULATIONS`.
    pub fn push_calculation(&mut self, calculation: Calculation) {
        self.calculations.push(calculation);
        trim_front(&mut self.calculations, MAX_CALCULATIONS);
    }
}

/// Drops the oldest entries so at most `max` remain.
pub(crate) fn trim_front<T>(items: &mut Vec<T>, max: usize) {
    if items.len() > max {
        let excess = items.len() - max;
        items.drain(..excess);
    }
}

/// Metadata appended to a JSON export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportInfo {
    pub export_date: DateTime<Utc>,
    pub version: String,
    pub source: String,
}

/// A full document dump plus export metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedDocument {
    #[serde(flatten)]
    pub document: Document,
    pub export_info: ExportInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn category_parses_case_insensitively() {
        assert_eq!("Work".parse::<Category>().unwrap(), Category::Work);
        assert_eq!(" business ".parse::<Category>().unwrap(), Category::Business);
        assert!("friends".parse::<Category>().is_err());
    }

    #[test]
    fn unknown_category_deserializes_as_other() {
        let c: Category = serde_json::from_str("\"friends\"").unwrap();
        assert_eq!(c, Category::Other);
        assert_eq!(serde_json::to_string(&Category::Work).unwrap(), "\"work\"");
    }

    #[test]
    fn record_uses_camel_case_and_skips_empty_optionals() {
        let record = Record::from_input(
            "1".into(),
            RecordInput::new(" A ", "a@x.com").with_phone("  "),
            at(0),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "A");
        assert!(json.get("lastModified").is_some());
        assert!(json.get("phone").is_none());
        assert!(json.get("note").is_none());
    }

    #[test]
    fn record_apply_keeps_identity_and_creation_time() {
        let mut record = Record::from_input("1".into(), RecordInput::new("A", "a@x.com"), at(0));
        record.apply(
            RecordInput::new("B", "b@x.com").with_category(Category::Work),
            at(60),
        );
        assert_eq!(record.id, "1");
        assert_eq!(record.name, "B");
        assert_eq!(record.category, Category::Work);
        assert_eq!(record.timestamp, at(0));
        assert_eq!(record.last_modified, at(60));
    }

    #[test]
    fn default_settings_keys() {
        let settings = Settings::default();
        assert_eq!(settings.get("theme"), Some(&Value::from("default")));
        assert_eq!(settings.get("autoSync"), Some(&Value::from(true)));
        assert_eq!(settings.get_str(ENDPOINT_SETTING), None);
        assert_eq!(settings.len(), 7);
    }

    #[test]
    fn document_missing_collections_default_to_empty() {
        let doc: Document = serde_json::from_str(r#"{"settings": {"theme": "dark"}}"#).unwrap();
        assert!(doc.users.is_empty());
        assert!(doc.calculations.is_empty());
        assert!(doc.pending_sync.is_empty());
        assert_eq!(doc.settings.get_str("theme"), Some("dark"));
    }

    #[test]
    fn push_calculation_caps_history() {
        let mut doc = Document::new(at(0));
        for i in 0..105 {
            doc.push_calculation(Calculation {
                id: i.to_string(),
                expression: format!("{i} + 0"),
                result: f64::from(i),
                timestamp: at(i64::from(i)),
            });
        }
        assert_eq!(doc.calculations.len(), MAX_CALCULATIONS);
        assert_eq!(doc.calculations[0].id, "5");
        assert_eq!(doc.calculations[99].id, "104");
    }

    #[test]
    fn pending_item_type_field() {
        let item = PendingSyncItem {
            id: "1".into(),
            data: Value::Null,
            timestamp: at(0),
            kind: PENDING_USER_DATA.into(),
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "user_data");
    }

    #[test]
    fn export_flattens_document() {
        let export = ExportedDocument {
            document: Document::new(at(0)),
            export_info: ExportInfo {
                export_date: at(10),
                version: DOCUMENT_VERSION.into(),
                source: "offline-desk".into(),
            },
        };
        let json = serde_json::to_value(&export).unwrap();
        assert!(json.get("users").is_some());
        assert!(json.get("pendingSync").is_some());
        assert_eq!(json["exportInfo"]["version"], "1.0.0");
    }
}

//! Record search, filtering and sorting.

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::model::{Category, Record};

/// Record field to sort by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Email,
    Phone,
    Category,
    Timestamp,
    LastModified,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "name" => Ok(Self::Name),
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "category" => Ok(Self::Category),
            "timestamp" => Ok(Self::Timestamp),
            "lastModified" | "last_modified" => Ok(Self::LastModified),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Options for [`Store::advanced_search`](super::Store::advanced_search).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub query: Option<String>,
    pub category: Option<Category>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort_by: Option<SortKey>,
    pub sort_order: SortOrder,
}

impl SearchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub const fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub const fn with_date_range(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    #[must_use]
    pub const fn sorted_by(mut self, key: SortKey, order: SortOrder) -> Self {
        self.sort_by = Some(key);
        self.sort_order = order;
        self
    }
}

/// Case-insensitive match on name, email and note; substring match on phone.
pub(crate) fn matches_query(record: &Record, query: &str) -> bool {
    let term = query.to_lowercase();
    record.name.to_lowercase().contains(&term)
        || record.email.to_lowercase().contains(&term)
        || record.phone.as_deref().is_some_and(|p| p.contains(query))
        || record
            .note
            .as_deref()
            .is_some_and(|n| n.to_lowercase().contains(&term))
}

fn compare(a: &Record, b: &Record, key: SortKey) -> Ordering {
    let text = |s: &str| s.to_lowercase();
    match key {
        SortKey::Name => text(&a.name).cmp(&text(&b.name)),
        SortKey::Email => text(&a.email).cmp(&text(&b.email)),
        SortKey::Phone => a.phone.cmp(&b.phone),
        SortKey::Category => a.category.as_str().cmp(b.category.as_str()),
        SortKey::Timestamp => a.timestamp.cmp(&b.timestamp),
        SortKey::LastModified => a.last_modified.cmp(&b.last_modified),
    }
}

/// Applies every filter in `options`, then sorts (stable) if requested.
pub(crate) fn apply(mut records: Vec<Record>, options: &SearchOptions) -> Vec<Record> {
    if let Some(query) = options.query.as_deref().filter(|q| !q.is_empty()) {
        records.retain(|r| matches_query(r, query));
    }
    if let Some(category) = options.category {
        records.retain(|r| r.category == category);
    }
    if let Some(from) = options.date_from {
        records.retain(|r| r.timestamp >= from);
    }
    if let Some(to) = options.date_to {
        records.retain(|r| r.timestamp <= to);
    }
    if let Some(key) = options.sort_by {
        records.sort_by(|a, b| match options.sort_order {
            SortOrder::Asc => compare(a, b, key),
            SortOrder::Desc => compare(b, a, key),
        });
    }
    records
}

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum EntryError {
    #[error("entry at index {index} is not an object")]
    NotAnObject { index: usize },
    #[error("entry at index {index} is missing the 'id' field")]
    MissingId { index: usize },
    #[error("entry at index {index} has an 'id' that is not an integer or string")]
    UnsupportedId { index: usize },
    #[error("entry at index {index} (id {id}) is missing the 'text' field")]
    MissingText { index: usize, id: EntryId },
    #[error("duplicate id {id} found at index {index}")]
    DuplicateId { index: usize, id: EntryId },
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(untagged)]
pub enum EntryId {
    Integer(i64),
    Text(String),
}

impl EntryId {
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_i64().map(Self::Integer),
            Value::String(text) => Some(Self::Text(text.clone())),
            _ => None,
        }
    }
}

impl Display for EntryId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(id) => write!(f, "{id}"),
            Self::Text(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct SnapshotEntry {
    fields: Map<String, Value>,
    #[serde(skip)]
    id: EntryId,
}

impl SnapshotEntry {
    /// Parse one raw record into its canonical form.
    ///
    /// # Errors
    /// Returns [`EntryError`] when the record is not an object, has no usable
    /// 'id', or has no 'text' field.
    pub fn from_value(value: Value, index: usize) -> Result<Self, EntryError> {
        let Value::Object(fields) = value else {
            return Err(EntryError::NotAnObject { index });
        };
        let Some(raw_id) = fields.get("id") else {
            return Err(EntryError::MissingId { index });
        };
        let Some(id) = EntryId::from_value(raw_id) else {
            return Err(EntryError::UnsupportedId { index });
        };
        if !fields.contains_key("text") {
            return Err(EntryError::MissingText { index, id });
        }
        Ok(Self { fields, id })
    }

    #[must_use]
    pub fn id(&self) -> &EntryId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> Option<&Value> {
        self.fields.get("text")
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SnapshotStats {
    pub total_records: usize,
    pub deleted: usize,
    pub invalid: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSnapshot {
    entries: BTreeMap<EntryId, SnapshotEntry>,
    stats: SnapshotStats,
}

impl CanonicalSnapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &EntryId) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntryId, &SnapshotEntry)> {
        self.entries.iter()
    }

    #[must_use]
    pub fn stats(&self) -> SnapshotStats {
        self.stats
    }
}

/// True when a record carries the tombstone marker `deleted: true`.
///
/// Runs before validation, so tombstones missing 'id' or 'text' are skipped
/// silently instead of being reported as invalid. The check is strict about
/// the type: the boolean `true` counts, the number `1` or the string `"true"`
/// do not.
#[must_use]
pub fn is_marked_deleted(value: &Value) -> bool {
    matches!(value.get("deleted"), Some(Value::Bool(true)))
}

/// Build the canonical id to record view of one raw snapshot.
///
/// Tombstoned entries are skipped before validation (see
/// [`is_marked_deleted`]). Invalid entries are logged as warnings and
/// skipped. When two entries share an id the first occurrence wins and later
/// ones are logged and dropped. Data-quality problems never fail the pass;
/// skip totals are logged once per `label` after the pass and returned in
/// [`SnapshotStats`].
#[must_use]
pub fn canonicalize(raw_entries: Vec<Value>, label: &str) -> CanonicalSnapshot {
    use std::collections::btree_map::Entry;

    let mut entries: BTreeMap<EntryId, SnapshotEntry> = BTreeMap::new();
    let mut stats = SnapshotStats { total_records: raw_entries.len(), ..SnapshotStats::default() };

    for (index, value) in raw_entries.into_iter().enumerate() {
        if is_marked_deleted(&value) {
            stats.deleted += 1;
            continue;
        }

        let entry = match SnapshotEntry::from_value(value, index) {
            Ok(entry) => entry,
            Err(fault) => {
                tracing::warn!("{fault} in {label}");
                stats.invalid += 1;
                continue;
            }
        };

        match entries.entry(entry.id().clone()) {
            Entry::Occupied(_) => {
                let fault = EntryError::DuplicateId { index, id: entry.id().clone() };
                tracing::warn!("{fault} in {label}");
                stats.duplicates += 1;
            }
            Entry::Vacant(slot) => {
                slot.insert(entry);
            }
        }
    }

    if stats.invalid > 0 {
        tracing::warn!("skipped {} invalid entries in {label}", stats.invalid);
    }
    if stats.duplicates > 0 {
        tracing::warn!("skipped {} duplicate entries in {label}", stats.duplicates);
    }
    if stats.deleted > 0 {
        tracing::info!("skipped {} deleted entries in {label}", stats.deleted);
    }

    CanonicalSnapshot { entries, stats }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct ComparisonSummary {
    pub total_original: usize,
    pub total_updated: usize,
    pub new_entries: usize,
    pub updated_entries: usize,
    pub unchanged_entries: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SnapshotComparison {
    pub new_entries: Vec<SnapshotEntry>,
    pub updated_entries: Vec<SnapshotEntry>,
    pub summary: ComparisonSummary,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComparisonReport {
    #[serde(with = "time::serde::rfc3339")]
    pub comparison_date: OffsetDateTime,
    pub original_file: String,
    pub updated_file: String,
    pub summary: ComparisonSummary,
    pub new_entries: Vec<SnapshotEntry>,
    pub updated_entries: Vec<SnapshotEntry>,
}

impl ComparisonReport {
    #[must_use]
    pub fn new(
        comparison: SnapshotComparison,
        original_file: String,
        updated_file: String,
        comparison_date: OffsetDateTime,
    ) -> Self {
        Self {
            comparison_date,
            original_file,
            updated_file,
            summary: comparison.summary,
            new_entries: comparison.new_entries,
            updated_entries: comparison.updated_entries,
        }
    }
}

/// Classify every identity in the updated snapshot against the original one.
///
/// Identities missing from the original are new. Identities whose 'text'
/// differs are updated, where a missing 'text' compares as the empty string.
/// Matching 'text' is counted as unchanged. Identities that disappeared from
/// the updated snapshot are never visited and never reported.
///
/// Consumes the updated mapping so the bucketed records are the canonical
/// records themselves, not copies.
#[must_use]
pub fn compare_snapshots(
    original: &CanonicalSnapshot,
    updated: CanonicalSnapshot,
) -> SnapshotComparison {
    let total_original = original.len();
    let total_updated = updated.len();

    let mut new_entries = Vec::new();
    let mut updated_entries = Vec::new();
    let mut unchanged_entries = 0_usize;

    for (id, entry) in updated.entries {
        match original.get(&id) {
            None => new_entries.push(entry),
            Some(previous) => {
                if text_differs(previous, &entry) {
                    updated_entries.push(entry);
                } else {
                    unchanged_entries += 1;
                }
            }
        }
    }

    tracing::info!(
        "comparison complete: {} new, {} updated, {} unchanged",
        new_entries.len(),
        updated_entries.len(),
        unchanged_entries
    );

    let summary = ComparisonSummary {
        total_original,
        total_updated,
        new_entries: new_entries.len(),
        updated_entries: updated_entries.len(),
        unchanged_entries,
    };

    SnapshotComparison { new_entries, updated_entries, summary }
}

fn text_differs(original: &SnapshotEntry, updated: &SnapshotEntry) -> bool {
    let empty = Value::String(String::new());
    original.text().unwrap_or(&empty) != updated.text().unwrap_or(&empty)
}

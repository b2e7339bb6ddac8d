use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// In-memory entity instance with change tracking.
///
/// A record is either new (no original row) or persisted (loaded from, or
/// written to, storage). `modified_fields` drives partial updates. Related
/// records attached under a relation name are what the cascade persists
/// before the parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    /// State last read from or written to storage (None for new records)
    original: Option<Map<String, Value>>,
    /// Current field values
    fields: Map<String, Value>,
    /// Fields set since the record was last clean
    modified: BTreeSet<String>,
    /// Related instances keyed by relation name (`question` for `question_id`)
    related: BTreeMap<String, Record>,
}

impl Record {
    /// Create a new empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a persisted record from a storage row
    pub fn from_row(row: Map<String, Value>) -> Self {
        Self {
            original: Some(row.clone()),
            fields: row,
            modified: BTreeSet::new(),
            related: BTreeMap::new(),
        }
    }

    /// Get field value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(Value::as_i64)
    }

    /// Set field value with change tracking
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        self.modified.insert(key.clone());
        self.fields.insert(key, value.into());
        self
    }

    /// Set field only if it's currently absent or null
    pub fn set_if_empty(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let key = key.into();
        if self.is_null(&key) {
            self.set(key, value);
        }
        self
    }

    /// True when the field is absent or explicitly null
    pub fn is_null(&self, key: &str) -> bool {
        matches!(self.fields.get(key), None | Some(Value::Null))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    // ========================================
    // Related records
    // ========================================

    pub fn related(&self, relation: &str) -> Option<&Record> {
        self.related.get(relation)
    }

    pub fn related_mut(&mut self, relation: &str) -> Option<&mut Record> {
        self.related.get_mut(relation)
    }

    pub fn attach_related(&mut self, relation: impl Into<String>, record: Record) -> &mut Self {
        self.related.insert(relation.into(), record);
        self
    }

    pub fn take_related(&mut self, relation: &str) -> Option<Record> {
        self.related.remove(relation)
    }

    // ========================================
    // Change tracking
    // ========================================

    pub fn is_persisted(&self) -> bool {
        self.original.is_some()
    }

    /// Fields set since the record was last clean, in name order
    pub fn modified_fields(&self) -> impl Iterator<Item = &str> {
        self.modified.iter().map(String::as_str)
    }

    pub fn has_changes(&self) -> bool {
        !self.modified.is_empty() || self.original.is_none()
    }

    /// Adopt the row storage now holds for this record.
    pub fn mark_clean(&mut self, row: Map<String, Value>) -> &mut Self {
        for (key, value) in &row {
            self.fields.insert(key.clone(), value.clone());
        }
        self.original = Some(row);
        self.modified.clear();
        self
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self::from_row(map)
    }
}

impl std::fmt::Display for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Record(id: {:?}, fields: {}, related: {}, changed: {})",
            self.get("id"),
            self.fields.len(),
            self.related.len(),
            self.has_changes()
        )
    }
}

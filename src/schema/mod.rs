pub mod field;
pub mod model;

pub use field::{Field, FieldKind};
pub use model::ModelSchema;

use serde_json::Value;

use crate::database::record::Record;
use crate::error::FieldErrors;

/// Serializer bridge between wire payloads and records.
pub trait Schema: Send + Sync {
    /// Build a record from `payload`, or merge it into `instance` when one is
    /// given. Failures come back as field-level codes, never as a panic.
    fn load(&self, payload: &Value, instance: Option<Record>) -> Result<Record, FieldErrors>;

    fn dump(&self, record: &Record) -> Value;

    fn dump_many(&self, records: &[Record]) -> Value {
        Value::Array(records.iter().map(|r| self.dump(r)).collect())
    }
}

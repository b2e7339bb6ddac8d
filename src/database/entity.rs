use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::net::IpAddr;
use thiserror::Error;

/// Column holding the client address a row was created from.
pub const CREATED_FROM: &str = "created_from";
/// Column holding the id of the user that created a row.
pub const CREATED_BY: &str = "created_by_id";
/// Column holding the id of the user that last updated a row.
pub const UPDATED_BY: &str = "updated_by_id";

/// Suffixes marking a column as a reference to another entity.
const FOREIGN_KEY_SUFFIXES: &[&str] = &["_id", "_fk"];

#[derive(Debug, Error, PartialEq)]
pub enum EntityError {
    #[error("{entity}: unknown column '{column}'")]
    UnknownColumn { entity: &'static str, column: &'static str },

    #[error("{entity}: foreign key column '{column}' must end in _id or _fk")]
    BadForeignKeySuffix { entity: &'static str, column: &'static str },

    #[error("{entity}: foreign key '{column}' targets unknown column {target}.{target_column}")]
    UnknownTargetColumn {
        entity: &'static str,
        column: &'static str,
        target: &'static str,
        target_column: &'static str,
    },

    #[error("{entity}: relation '{relation}' declared twice")]
    DuplicateRelation { entity: &'static str, relation: String },

    #[error("{entity}: owner column '{column}' is not declared")]
    UnknownOwner { entity: &'static str, column: &'static str },

    #[error("{entity}: column '{column}' declared twice")]
    DuplicateColumn { entity: &'static str, column: &'static str },
}

/// Storage type of a column. Drives DDL, parameter casts and value coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Serial,
    Integer,
    Text,
    Varchar(u16),
    Boolean,
    Float,
    Timestamp,
    Inet,
    Json,
}

impl ColumnKind {
    /// Type used in `CREATE TABLE`.
    pub fn ddl_type(&self) -> String {
        match self {
            ColumnKind::Serial => "SERIAL".to_string(),
            ColumnKind::Varchar(len) => format!("VARCHAR({})", len),
            other => other.cast_type().to_string(),
        }
    }

    /// Type a bound parameter is cast to before it reaches the column.
    pub fn cast_type(&self) -> &'static str {
        match self {
            ColumnKind::Serial | ColumnKind::Integer => "INTEGER",
            ColumnKind::Text => "TEXT",
            ColumnKind::Varchar(_) => "VARCHAR",
            ColumnKind::Boolean => "BOOLEAN",
            ColumnKind::Float => "DOUBLE PRECISION",
            ColumnKind::Timestamp => "TIMESTAMPTZ",
            ColumnKind::Inet => "INET",
            ColumnKind::Json => "JSONB",
        }
    }

    /// Convert a JSON value into the canonical representation stored for this kind.
    /// Mirrors the casts the relational store would apply to a bound parameter.
    pub fn coerce(&self, value: &Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            ColumnKind::Serial | ColumnKind::Integer => match value {
                Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                    (Some(i), _) => Ok(Value::from(i)),
                    (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::from(f as i64)),
                    _ => Err(format!("invalid input syntax for type integer: \"{}\"", n)),
                },
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::from)
                    .map_err(|_| format!("invalid input syntax for type integer: \"{}\"", s)),
                other => Err(format!("cannot cast {} to integer", json_type(other))),
            },
            ColumnKind::Text => match value {
                Value::String(_) => Ok(value.clone()),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                other => Err(format!("cannot cast {} to text", json_type(other))),
            },
            ColumnKind::Varchar(len) => {
                let text = ColumnKind::Text.coerce(value)?;
                match text.as_str() {
                    Some(s) if s.chars().count() > *len as usize => {
                        Err(format!("value too long for type character varying({})", len))
                    }
                    _ => Ok(text),
                }
            }
            ColumnKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "t" | "yes" | "y" | "on" | "1" => Ok(Value::Bool(true)),
                    "false" | "f" | "no" | "n" | "off" | "0" => Ok(Value::Bool(false)),
                    _ => Err(format!("invalid input syntax for type boolean: \"{}\"", s)),
                },
                other => Err(format!("cannot cast {} to boolean", json_type(other))),
            },
            ColumnKind::Float => match value {
                Value::Number(n) => n
                    .as_f64()
                    .map(Value::from)
                    .ok_or_else(|| format!("invalid input syntax for type double precision: \"{}\"", n)),
                Value::String(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::from)
                    .map_err(|_| format!("invalid input syntax for type double precision: \"{}\"", s)),
                other => Err(format!("cannot cast {} to double precision", json_type(other))),
            },
            ColumnKind::Timestamp => match value {
                Value::String(s) => parse_timestamp(s)
                    .map(|ts| Value::String(ts.to_rfc3339()))
                    .ok_or_else(|| format!("invalid input syntax for type timestamp: \"{}\"", s)),
                other => Err(format!("cannot cast {} to timestamp", json_type(other))),
            },
            ColumnKind::Inet => match value {
                Value::String(s) => s
                    .trim()
                    .parse::<IpAddr>()
                    .map(|ip| Value::String(ip.to_string()))
                    .map_err(|_| format!("invalid input syntax for type inet: \"{}\"", s)),
                other => Err(format!("cannot cast {} to inet", json_type(other))),
            },
            ColumnKind::Json => Ok(value.clone()),
        }
    }
}

/// Accepts RFC 3339 or a naive ISO 8601 timestamp (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Server-side default applied on insert when the record leaves the column unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    Now,
    Text(&'static str),
}

impl ColumnDefault {
    pub fn value(&self) -> Value {
        match self {
            ColumnDefault::Now => Value::String(Utc::now().to_rfc3339()),
            ColumnDefault::Text(text) => Value::String((*text).to_string()),
        }
    }

    pub fn ddl(&self) -> String {
        match self {
            ColumnDefault::Now => "now()".to_string(),
            ColumnDefault::Text(text) => format!("'{}'", text.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
}

impl ColumnDef {
    pub fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self {
            name,
            kind,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(ColumnDefault::Now);
        self
    }

    pub fn default_text(mut self, text: &'static str) -> Self {
        self.default = Some(ColumnDefault::Text(text));
        self
    }
}

/// `{column, target entity, target column}`. The target is an accessor so
/// entities may reference each other (or themselves) from static declarations.
#[derive(Clone)]
pub struct ForeignKey {
    pub column: &'static str,
    pub target: fn() -> &'static EntityMeta,
    pub target_column: &'static str,
}

impl ForeignKey {
    /// Attribute name of the related object: the column with its suffix stripped.
    pub fn relation(&self) -> &'static str {
        FOREIGN_KEY_SUFFIXES
            .iter()
            .find_map(|suffix| self.column.strip_suffix(suffix))
            .unwrap_or(self.column)
    }

    pub fn target(&self) -> &'static EntityMeta {
        (self.target)()
    }

    fn has_reference_suffix(&self) -> bool {
        FOREIGN_KEY_SUFFIXES
            .iter()
            .any(|suffix| self.column.len() > suffix.len() && self.column.ends_with(suffix))
    }
}

impl std::fmt::Debug for ForeignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForeignKey")
            .field("column", &self.column)
            .field("target_column", &self.target_column)
            .finish()
    }
}

/// Entity metadata: table name, primary key, columns, foreign keys in
/// declaration order and the optional owner column.
#[derive(Debug, Clone)]
pub struct EntityMeta {
    pub name: &'static str,
    pub primary_key: &'static str,
    pub columns: Vec<ColumnDef>,
    pub foreign_keys: Vec<ForeignKey>,
    pub owner_column: Option<&'static str>,
}

impl EntityMeta {
    /// Start a declaration with the integer `id` primary key every entity carries.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            primary_key: "id",
            columns: vec![ColumnDef::new("id", ColumnKind::Serial).not_null()],
            foreign_keys: Vec::new(),
            owner_column: None,
        }
    }

    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn foreign_key(
        mut self,
        column: &'static str,
        target: fn() -> &'static EntityMeta,
        target_column: &'static str,
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            column,
            target,
            target_column,
        });
        self
    }

    pub fn owned_by(mut self, column: &'static str) -> Self {
        self.owner_column = Some(column);
        self
    }

    /// Creation audit columns: timestamp, client address and the creating user,
    /// who also becomes the owner.
    pub fn with_audit(self, user: fn() -> &'static EntityMeta) -> Self {
        self.column(ColumnDef::new("created_at", ColumnKind::Timestamp).default_now())
            .column(ColumnDef::new(CREATED_FROM, ColumnKind::Inet).not_null())
            .column(ColumnDef::new(CREATED_BY, ColumnKind::Integer).not_null())
            .foreign_key(CREATED_BY, user, "id")
            .owned_by(CREATED_BY)
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_def(name).is_some()
    }

    pub fn foreign_key_for(&self, relation: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.relation() == relation)
    }

    pub fn has_related(&self, relation: &str) -> bool {
        self.foreign_key_for(relation).is_some()
    }

    /// Startup check of the static declaration.
    pub fn validate(&self) -> Result<(), EntityError> {
        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.name) {
                return Err(EntityError::DuplicateColumn {
                    entity: self.name,
                    column: column.name,
                });
            }
        }

        let mut relations = HashSet::new();
        for fk in &self.foreign_keys {
            if !self.has_column(fk.column) {
                return Err(EntityError::UnknownColumn {
                    entity: self.name,
                    column: fk.column,
                });
            }
            if !fk.has_reference_suffix() {
                return Err(EntityError::BadForeignKeySuffix {
                    entity: self.name,
                    column: fk.column,
                });
            }
            let target = fk.target();
            if !target.has_column(fk.target_column) {
                return Err(EntityError::UnknownTargetColumn {
                    entity: self.name,
                    column: fk.column,
                    target: target.name,
                    target_column: fk.target_column,
                });
            }
            if !relations.insert(fk.relation()) {
                return Err(EntityError::DuplicateRelation {
                    entity: self.name,
                    relation: fk.relation().to_string(),
                });
            }
        }

        if let Some(owner) = self.owner_column {
            if !self.has_column(owner) {
                return Err(EntityError::UnknownOwner {
                    entity: self.name,
                    column: owner,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static AUTHOR: Lazy<EntityMeta> =
        Lazy::new(|| EntityMeta::new("author").column(ColumnDef::new("name", ColumnKind::Varchar(10)).unique()));

    static BOOK: Lazy<EntityMeta> = Lazy::new(|| {
        EntityMeta::new("book")
            .column(ColumnDef::new("title", ColumnKind::Text).not_null())
            .column(ColumnDef::new("author_id", ColumnKind::Integer))
            .foreign_key("author_id", || &*AUTHOR, "id")
            .with_audit(|| &*AUTHOR)
    });

    #[test]
    fn relation_strips_suffix() {
        let fk = &BOOK.foreign_keys[0];
        assert_eq!(fk.relation(), "author");
        assert_eq!(BOOK.foreign_keys[1].relation(), "created_by");
        assert!(BOOK.has_related("author"));
        assert!(!BOOK.has_related("title"));
        assert_eq!(BOOK.owner_column, Some(CREATED_BY));
    }

    #[test]
    fn validates_declarations() {
        assert!(AUTHOR.validate().is_ok());
        assert!(BOOK.validate().is_ok());

        let unknown = EntityMeta::new("bad").foreign_key("owner_id", || &*AUTHOR, "id");
        assert!(matches!(unknown.validate(), Err(EntityError::UnknownColumn { .. })));

        let suffix = EntityMeta::new("bad")
            .column(ColumnDef::new("owner", ColumnKind::Integer))
            .foreign_key("owner", || &*AUTHOR, "id");
        assert!(matches!(suffix.validate(), Err(EntityError::BadForeignKeySuffix { .. })));

        let target = EntityMeta::new("bad")
            .column(ColumnDef::new("owner_id", ColumnKind::Integer))
            .foreign_key("owner_id", || &*AUTHOR, "uuid");
        assert!(matches!(target.validate(), Err(EntityError::UnknownTargetColumn { .. })));

        let duplicate = EntityMeta::new("bad")
            .column(ColumnDef::new("owner_id", ColumnKind::Integer))
            .column(ColumnDef::new("owner_fk", ColumnKind::Integer))
            .foreign_key("owner_id", || &*AUTHOR, "id")
            .foreign_key("owner_fk", || &*AUTHOR, "id");
        assert!(matches!(duplicate.validate(), Err(EntityError::DuplicateRelation { .. })));

        let owner = EntityMeta::new("bad").owned_by("creator_id");
        assert!(matches!(owner.validate(), Err(EntityError::UnknownOwner { .. })));
    }

    #[test]
    fn coerces_like_the_store() {
        assert_eq!(ColumnKind::Integer.coerce(&json!("42")).unwrap(), json!(42));
        assert_eq!(ColumnKind::Integer.coerce(&json!(7.0)).unwrap(), json!(7));
        assert!(ColumnKind::Integer.coerce(&json!("abc")).is_err());
        assert_eq!(ColumnKind::Boolean.coerce(&json!("t")).unwrap(), json!(true));
        assert_eq!(ColumnKind::Inet.coerce(&json!("::1")).unwrap(), json!("::1"));
        assert!(ColumnKind::Inet.coerce(&json!("localhost")).is_err());
        assert!(ColumnKind::Varchar(3).coerce(&json!("four")).is_err());
        assert_eq!(ColumnKind::Text.coerce(&Value::Null).unwrap(), Value::Null);
        assert_eq!(
            ColumnKind::Timestamp.coerce(&json!("2024-03-01T10:00:00")).unwrap(),
            json!("2024-03-01T10:00:00+00:00")
        );
    }

    #[test]
    fn ddl_types() {
        assert_eq!(ColumnKind::Serial.ddl_type(), "SERIAL");
        assert_eq!(ColumnKind::Varchar(40).ddl_type(), "VARCHAR(40)");
        assert_eq!(ColumnKind::Timestamp.ddl_type(), "TIMESTAMPTZ");
        assert_eq!(ColumnDefault::Text("it's").ddl(), "'it''s'");
    }
}

use serde_json::Value;

use super::ModelSchema;
use crate::database::entity::parse_timestamp;
use crate::error::ErrorCode;

/// Wire type of a schema field.
#[derive(Clone, Copy)]
pub enum FieldKind {
    Integer,
    Float,
    String { max_length: Option<usize> },
    Boolean,
    DateTime,
    Email,
    Enum(&'static [&'static str]),
    /// Another schema, loaded into the related record attached under the field name
    Nested(fn() -> &'static ModelSchema),
}

impl std::fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldKind::Integer => f.write_str("Integer"),
            FieldKind::Float => f.write_str("Float"),
            FieldKind::String { max_length } => write!(f, "String({:?})", max_length),
            FieldKind::Boolean => f.write_str("Boolean"),
            FieldKind::DateTime => f.write_str("DateTime"),
            FieldKind::Email => f.write_str("Email"),
            FieldKind::Enum(choices) => write!(f, "Enum({:?})", choices),
            FieldKind::Nested(_) => f.write_str("Nested"),
        }
    }
}

impl FieldKind {
    /// Validate and normalize a non-null wire value.
    pub(crate) fn convert(&self, value: &Value) -> Result<Value, ErrorCode> {
        match self {
            FieldKind::Integer => match value {
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(Value::from(i))
                    } else {
                        match n.as_f64() {
                            Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Value::from(f as i64)),
                            _ => Err(ErrorCode::InvalidValue),
                        }
                    }
                }
                _ => Err(ErrorCode::InvalidInputType),
            },
            FieldKind::Float => match value {
                Value::Number(n) => n.as_f64().map(Value::from).ok_or(ErrorCode::InvalidValue),
                _ => Err(ErrorCode::InvalidInputType),
            },
            FieldKind::String { max_length } => match value {
                Value::String(s) => match max_length {
                    Some(max) if s.chars().count() > *max => Err(ErrorCode::InvalidValue),
                    _ => Ok(value.clone()),
                },
                _ => Err(ErrorCode::InvalidInputType),
            },
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(value.clone()),
                _ => Err(ErrorCode::InvalidInputType),
            },
            FieldKind::DateTime => match value {
                Value::String(s) => parse_timestamp(s)
                    .map(|ts| Value::String(ts.to_rfc3339()))
                    .ok_or(ErrorCode::InvalidValue),
                _ => Err(ErrorCode::InvalidInputType),
            },
            FieldKind::Email => match value {
                Value::String(s) if is_email(s) => Ok(Value::String(s.trim().to_string())),
                Value::String(_) => Err(ErrorCode::InvalidValue),
                _ => Err(ErrorCode::InvalidInputType),
            },
            FieldKind::Enum(choices) => match value {
                Value::String(s) if choices.contains(&s.as_str()) => Ok(value.clone()),
                Value::String(_) => Err(ErrorCode::InvalidValue),
                _ => Err(ErrorCode::InvalidInputType),
            },
            FieldKind::Nested(_) => match value {
                Value::Object(_) => Ok(value.clone()),
                _ => Err(ErrorCode::InvalidInputType),
            },
        }
    }
}

fn is_email(raw: &str) -> bool {
    let raw = raw.trim();
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !raw.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}

/// One declared schema field and its load/dump flags.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub dump_only: bool,
    pub load_only: bool,
    pub allow_none: bool,
}

impl Field {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            dump_only: false,
            load_only: false,
            allow_none: false,
        }
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn float(name: &'static str) -> Self {
        Self::new(name, FieldKind::Float)
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String { max_length: None })
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn datetime(name: &'static str) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub fn email(name: &'static str) -> Self {
        Self::new(name, FieldKind::Email)
    }

    pub fn choice(name: &'static str, choices: &'static [&'static str]) -> Self {
        Self::new(name, FieldKind::Enum(choices))
    }

    pub fn nested(name: &'static str, schema: fn() -> &'static ModelSchema) -> Self {
        Self::new(name, FieldKind::Nested(schema))
    }

    pub fn max_length(mut self, max: usize) -> Self {
        if let FieldKind::String { .. } = self.kind {
            self.kind = FieldKind::String { max_length: Some(max) };
        }
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn dump_only(mut self) -> Self {
        self.dump_only = true;
        self
    }

    pub fn load_only(mut self) -> Self {
        self.load_only = true;
        self
    }

    pub fn allow_none(mut self) -> Self {
        self.allow_none = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn integer_rules() {
        assert_eq!(FieldKind::Integer.convert(&json!(4)), Ok(json!(4)));
        assert_eq!(FieldKind::Integer.convert(&json!(4.0)), Ok(json!(4)));
        assert_eq!(FieldKind::Integer.convert(&json!(4.5)), Err(ErrorCode::InvalidValue));
        assert_eq!(FieldKind::Integer.convert(&json!("4")), Err(ErrorCode::InvalidInputType));
    }

    #[test]
    fn string_and_choice_rules() {
        let short = FieldKind::String { max_length: Some(3) };
        assert_eq!(short.convert(&json!("abc")), Ok(json!("abc")));
        assert_eq!(short.convert(&json!("abcd")), Err(ErrorCode::InvalidValue));
        assert_eq!(short.convert(&json!(12)), Err(ErrorCode::InvalidInputType));

        let kinds = FieldKind::Enum(&["string", "date"]);
        assert_eq!(kinds.convert(&json!("date")), Ok(json!("date")));
        assert_eq!(kinds.convert(&json!("number")), Err(ErrorCode::InvalidValue));
    }

    #[test]
    fn email_and_datetime_rules() {
        assert!(FieldKind::Email.convert(&json!("a@example.com")).is_ok());
        assert_eq!(FieldKind::Email.convert(&json!("a@b")), Err(ErrorCode::InvalidValue));
        assert_eq!(FieldKind::Email.convert(&json!("no at sign")), Err(ErrorCode::InvalidValue));
        assert_eq!(
            FieldKind::DateTime.convert(&json!("2024-05-01T08:30:00Z")),
            Ok(json!("2024-05-01T08:30:00+00:00"))
        );
        assert_eq!(FieldKind::DateTime.convert(&json!("yesterday")), Err(ErrorCode::InvalidValue));
    }
}

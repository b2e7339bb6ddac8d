use serde_json::{Map, Value};

use super::{Field, FieldKind, Schema};
use crate::database::record::Record;
use crate::error::{ErrorCode, FieldErrors};

/// Declarative schema: an ordered list of fields. Validation errors are
/// reported in field declaration order.
#[derive(Debug, Clone, Default)]
pub struct ModelSchema {
    pub fields: Vec<Field>,
}

impl ModelSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl Schema for ModelSchema {
    fn load(&self, payload: &Value, instance: Option<Record>) -> Result<Record, FieldErrors> {
        let mut errors = FieldErrors::new();
        let Value::Object(map) = payload else {
            errors.add("_schema", ErrorCode::InvalidInputType);
            return Err(errors);
        };

        let mut record = instance.unwrap_or_default();
        for field in self.fields.iter().filter(|f| !f.dump_only) {
            match (map.get(field.name), field.kind) {
                (None, FieldKind::Nested(_)) => {
                    if field.required && record.related(field.name).is_none() && !record.is_persisted() {
                        errors.add(field.name, ErrorCode::MissingRequiredField);
                    }
                }
                (None, _) => {
                    if field.required && record.is_null(field.name) {
                        errors.add(field.name, ErrorCode::MissingRequiredField);
                    }
                }
                (Some(Value::Null), kind) => {
                    if !field.allow_none {
                        errors.add(field.name, ErrorCode::NullFieldNotAllowed);
                    } else if let FieldKind::Nested(_) = kind {
                        record.take_related(field.name);
                    } else {
                        record.set(field.name, Value::Null);
                    }
                }
                (Some(value @ Value::Object(_)), FieldKind::Nested(schema)) => {
                    let existing = record.take_related(field.name);
                    match schema().load(value, existing) {
                        Ok(related) => {
                            record.attach_related(field.name, related);
                        }
                        Err(nested) => {
                            errors.nest(field.name, nested);
                        }
                    }
                }
                (Some(value), kind) => match kind.convert(value) {
                    Ok(value) => {
                        record.set(field.name, value);
                    }
                    Err(code) => {
                        errors.add(field.name, code);
                    }
                },
            }
        }

        if errors.is_empty() {
            Ok(record)
        } else {
            Err(errors)
        }
    }

    fn dump(&self, record: &Record) -> Value {
        let mut out = Map::new();
        for field in self.fields.iter().filter(|f| !f.load_only) {
            match field.kind {
                FieldKind::Nested(schema) => {
                    if let Some(related) = record.related(field.name) {
                        out.insert(field.name.to_string(), schema().dump(related));
                    }
                }
                _ => {
                    if let Some(value) = record.get(field.name) {
                        out.insert(field.name.to_string(), value.clone());
                    }
                }
            }
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use once_cell::sync::Lazy;
    use serde_json::json;

    static OWNER: Lazy<ModelSchema> = Lazy::new(|| {
        ModelSchema::new(vec![
            Field::integer("id").dump_only(),
            Field::string("username").max_length(40).required(),
        ])
    });

    static ENTRY: Lazy<ModelSchema> = Lazy::new(|| {
        ModelSchema::new(vec![
            Field::integer("id").dump_only(),
            Field::string("text").max_length(40).required(),
            Field::choice("data_type", &["category", "string"]).required(),
            Field::string("hint").allow_none(),
            Field::string("secret").load_only(),
            Field::nested("owner", || &*OWNER),
        ])
    });

    #[test]
    fn loads_valid_payload_and_ignores_unknown_keys() {
        let record = ENTRY
            .load(&json!({"text": "Q1", "data_type": "string", "id": 99, "extra": true}), None)
            .unwrap();
        assert_eq!(record.get("text"), Some(&json!("Q1")));
        assert_eq!(record.get("id"), None);
        assert_eq!(record.get("extra"), None);
    }

    #[test]
    fn reports_codes_per_field_in_declaration_order() {
        let errors = ENTRY
            .load(&json!({"text": 5, "hint": null, "secret": null, "owner": {}}), None)
            .unwrap_err();
        let fields: Vec<_> = errors.iter().map(|(name, _)| name).collect();
        assert_eq!(fields, vec!["text", "data_type", "secret", "owner"]);
        assert_eq!(errors.get("text"), Some(&FieldError::Codes(vec![ErrorCode::InvalidInputType])));
        assert_eq!(errors.get("data_type"), Some(&FieldError::Codes(vec![ErrorCode::MissingRequiredField])));
        assert_eq!(errors.get("secret"), Some(&FieldError::Codes(vec![ErrorCode::NullFieldNotAllowed])));
        match errors.get("owner") {
            Some(FieldError::Nested(nested)) => {
                assert_eq!(nested.get("username"), Some(&FieldError::Codes(vec![ErrorCode::MissingRequiredField])))
            }
            other => panic!("expected nested errors, got {:?}", other),
        }
    }

    #[test]
    fn non_object_payload_is_a_schema_level_error() {
        let errors = ENTRY.load(&json!([1, 2]), None).unwrap_err();
        assert_eq!(errors.get("_schema"), Some(&FieldError::Codes(vec![ErrorCode::InvalidInputType])));
    }

    #[test]
    fn merge_into_instance_keeps_existing_required_values() {
        let existing = Record::from_row(
            json!({"id": 1, "text": "Q1", "data_type": "string", "hint": "h"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let record = ENTRY.load(&json!({"hint": null}), Some(existing)).unwrap();
        assert_eq!(record.get("text"), Some(&json!("Q1")));
        assert_eq!(record.get("hint"), Some(&Value::Null));
        assert_eq!(record.modified_fields().collect::<Vec<_>>(), vec!["hint"]);
    }

    #[test]
    fn nested_payload_becomes_related_record() {
        let record = ENTRY
            .load(&json!({"text": "Q1", "data_type": "string", "owner": {"username": "ann"}}), None)
            .unwrap();
        assert_eq!(record.related("owner").unwrap().get("username"), Some(&json!("ann")));
        assert_eq!(ENTRY.dump(&record)["owner"], json!({"username": "ann"}));
    }

    #[test]
    fn dump_round_trips_loadable_fields() {
        let payload = json!({"text": "Q1", "data_type": "category", "hint": "first pet"});
        let record = ENTRY.load(&payload, None).unwrap();
        assert_eq!(ENTRY.dump(&record), payload);

        let with_secret = ENTRY
            .load(&json!({"text": "Q1", "data_type": "string", "secret": "s"}), None)
            .unwrap();
        assert!(ENTRY.dump(&with_secret).get("secret").is_none());
    }
}

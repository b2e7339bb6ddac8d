use serde_json::{Map, Value};

/// Ordered equality constraints scoping a fetch to specific rows.
/// A null value matches rows where the column is null.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    constraints: Vec<(String, Value)>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.constraints.push((field.into(), value.into()));
        self
    }

    /// Chainable `push` for building a set inline.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(field, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.constraints.iter().map(|(field, value)| (field.as_str(), value))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.constraints.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Evaluate the set against a stored row.
    pub fn matches(&self, row: &Map<String, Value>) -> bool {
        self.constraints
            .iter()
            .all(|(field, expected)| row.get(field).unwrap_or(&Value::Null) == expected)
    }
}

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Declared type of a normalized column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum FieldKind {
    #[default]
    Text,
    Number,
    Bool,
    /// Irregular nested data, kept as a serialized JSON string.
    Json,
}

/// One cell of a normalized row. `Empty` is the sentinel for missing data.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Json(String),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, FieldValue::Empty)
    }

    /// Raw JSON form of the cell. `Empty` becomes `null`.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Empty => Value::Null,
            FieldValue::Text(text) | FieldValue::Json(text) => Value::String(text.clone()),
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Bool(b) => Value::Bool(*b),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Empty => Ok(()),
            FieldValue::Text(text) | FieldValue::Json(text) => f.write_str(text),
            FieldValue::Number(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Ordered column set shared by every row of a harvest.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSchema {
    columns: Vec<(String, FieldKind)>,
}

impl RowSchema {
    pub fn new(columns: Vec<(String, FieldKind)>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn columns(&self) -> &[(String, FieldKind)] {
        &self.columns
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|(column, _)| column == name)
    }
}

/// A fixed-shape output row. Every schema column is always present.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    fields: Vec<(String, FieldValue)>,
}

impl NormalizedRow {
    pub(crate) fn from_fields(fields: Vec<(String, FieldValue)>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    /// Renders the row as a raw record keyed by column name.
    pub fn to_raw(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        Value::Object(map)
    }
}

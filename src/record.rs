//! Flat key-value records flowing through the pipeline
//!
//! A [`Record`] is an insertion-ordered mapping from field name to a scalar
//! [`FieldValue`]. The field set is open: columns are discovered at runtime
//! unless a pipeline is configured with an explicit column list.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Record conversion errors
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RecordError {
    /// Input was not a key-value mapping
    #[error("item must be a mapping, got {0}")]
    NotAMapping(&'static str),

    /// A field held a nested object or array
    #[error("field '{field}' is not a scalar value")]
    NonScalar {
        /// Offending field name
        field: String,
    },
}

/// A single scalar cell value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    /// Missing / null value, written as an empty cell
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Free text
    Text(String),
}

impl FieldValue {
    /// Borrow the text content, if this is a text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer content, if this is an integer value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Whether this is [`FieldValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    fn from_json(field: &str, value: &Value) -> Result<Self, RecordError> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Bool(b) => Ok(FieldValue::Bool(*b)),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) => FieldValue::Int(i),
                None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            }),
            Value::String(s) => Ok(FieldValue::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => Err(RecordError::NonScalar {
                field: field.to_string(),
            }),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(n) => write!(f, "{n}"),
            FieldValue::Float(x) => write!(f, "{x}"),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_none(),
            FieldValue::Bool(b) => serializer.serialize_bool(*b),
            FieldValue::Int(n) => serializer.serialize_i64(*n),
            FieldValue::Float(x) => serializer.serialize_f64(*x),
            FieldValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        FieldValue::Text(value.clone())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        // Values above i64::MAX are kept as text
        i64::try_from(value)
            .map(FieldValue::Int)
            .unwrap_or_else(|_| FieldValue::Text(value.to_string()))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Insertion-ordered flat record
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field, returning the previous value
    ///
    /// Replacing keeps the field at its original position.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Option<FieldValue> {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((key, value));
                None
            }
        }
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a field value
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether the record has a field named `key`
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// Field names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    /// Iterate over (name, value) pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Merge `other` into this record; fields from `other` win
    pub fn merge(&mut self, other: Record) {
        for (key, value) in other.fields {
            self.insert(key, value);
        }
    }

    /// Convert an untyped JSON value into a record
    ///
    /// # Errors
    /// Returns [`RecordError::NotAMapping`] unless `value` is a JSON object,
    /// and [`RecordError::NonScalar`] for nested objects or arrays.
    pub fn from_json(value: &Value) -> Result<Self, RecordError> {
        let object = match value {
            Value::Object(map) => map,
            Value::Null => return Err(RecordError::NotAMapping("null")),
            Value::Bool(_) => return Err(RecordError::NotAMapping("bool")),
            Value::Number(_) => return Err(RecordError::NotAMapping("number")),
            Value::String(_) => return Err(RecordError::NotAMapping("string")),
            Value::Array(_) => return Err(RecordError::NotAMapping("array")),
        };

        let mut record = Record::new();
        for (key, value) in object {
            record.insert(key.clone(), FieldValue::from_json(key, value)?);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Union of the keys of `records`, in first-seen order
pub fn collect_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.to_string());
            }
        }
    }
    columns
}

//! Records exchanged between fetchers, the writer and destinations.
//!
//! A [`Record`] is a flat mapping from field name to a [`Value`] drawn from a
//! closed set of variants. Fetchers usually produce records from decoded JSON
//! via [`records_from_json`]; the writer later upgrades datetime-looking
//! strings into [`Value::DateTime`].

use std::collections::{BTreeMap, btree_map};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use snafu::prelude::*;

use crate::schema::FieldType;

/// A single typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// UTF-8 text.
    String(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// Boolean.
    Boolean(bool),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Calendar date.
    Date(NaiveDate),
    /// Wall-clock time of day.
    Time(NaiveTime),
    /// Calendar date plus wall-clock time, no timezone attached.
    DateTime(NaiveDateTime),
    /// Absent value (JSON `null`).
    Null,
}

impl Value {
    /// Destination field type this value would be declared as.
    ///
    /// `Null` carries no type information and falls back to
    /// [`FieldType::default`].
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::String(_) => FieldType::String,
            Value::Integer(_) => FieldType::Integer,
            Value::Float(_) => FieldType::Float,
            Value::Boolean(_) => FieldType::Boolean,
            Value::Bytes(_) => FieldType::Bytes,
            Value::Date(_) => FieldType::Date,
            Value::Time(_) => FieldType::Time,
            Value::DateTime(_) => FieldType::DateTime,
            Value::Null => FieldType::default(),
        }
    }

    /// Borrow the text if this is a `String` value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The date-time if this is a `DateTime` value.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Value::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// True for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<serde_json::Value> for Value {
    /// Numbers become `Integer` when they fit in `i64`, otherwise `Float`.
    /// Arrays and objects are kept as their compact JSON text.
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Value::Integer(i),
                (None, Some(f)) => Value::Float(f),
                (None, None) => Value::String(n.to_string()),
            },
            serde_json::Value::String(s) => Value::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Value::String(nested.to_string())
            }
        }
    }
}

/// One row: field name to value, iterated in field-name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    /// Empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` to `value`, returning the previous value if any.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Builder-style [`Record::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    /// Mutable iteration over values in name order.
    pub fn values_mut(&mut self) -> btree_map::ValuesMut<'_, String, Value> {
        self.fields.values_mut()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert a decoded JSON object into a record.
    pub fn from_json_object(object: serde_json::Map<String, serde_json::Value>) -> Self {
        object.into_iter().map(|(k, v)| (k, Value::from(v))).collect()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

/// Errors converting a decoded JSON payload into records.
#[derive(Debug, Snafu, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum RecordError {
    /// The payload was not a JSON array.
    #[snafu(display("Expected a JSON array of objects, got {kind}"))]
    NotAnArray {
        /// JSON kind that was found instead.
        kind: &'static str,
    },

    /// An array element was not a JSON object.
    #[snafu(display("Expected a JSON object at index {index}, got {kind}"))]
    NotAnObject {
        /// Position of the offending element.
        index: usize,
        /// JSON kind that was found instead.
        kind: &'static str,
    },
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Convert a decoded JSON array of objects into a batch of records.
pub fn records_from_json(payload: serde_json::Value) -> Result<Vec<Record>, RecordError> {
    let items = match payload {
        serde_json::Value::Array(items) => items,
        other => {
            return NotAnArraySnafu {
                kind: json_kind(&other),
            }
            .fail();
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            serde_json::Value::Object(object) => Ok(Record::from_json_object(object)),
            other => NotAnObjectSnafu {
                index,
                kind: json_kind(&other),
            }
            .fail(),
        })
        .collect()
}

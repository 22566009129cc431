//! Field values and field reads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single field value. Records hold flat scalars only.
///
/// Serializes as the bare JSON scalar, so a stored document reads
/// `{"_id": "u1", "name": "ada", "age": 36, "admin": false, "nick": null}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Number(f64),
    Boolean(bool),
    #[default]
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the value survives storage unchanged. Non-finite numbers do not.
    pub fn is_storable(&self) -> bool {
        match self {
            Value::Number(n) => n.is_finite(),
            _ => true,
        }
    }

    /// Name of the variant, for log fields and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Number(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        // Numbers are doubles on the wire; large magnitudes lose precision.
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Outcome of reading one field of a materialized record.
///
/// Keeps "stored null" and "never written" apart; the provider contract
/// merges both into [`Value::Null`] via [`FieldRead::into_value`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRead {
    Found(Value),
    Absent,
}

impl FieldRead {
    pub fn is_found(&self) -> bool {
        matches!(self, FieldRead::Found(_))
    }

    pub fn into_value(self) -> Value {
        match self {
            FieldRead::Found(value) => value,
            FieldRead::Absent => Value::Null,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldRead::Found(value) => Some(value),
            FieldRead::Absent => None,
        }
    }
}

impl From<Option<Value>> for FieldRead {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(value) => FieldRead::Found(value),
            None => FieldRead::Absent,
        }
    }
}

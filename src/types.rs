use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;

use crate::error::AccessError;

/// Values that can be stored in a database row or used as query parameters.
///
/// The same enum is used for arguments and for result cells:
/// ```rust
/// use pg_access::prelude::*;
///
/// let args = vec![
///     RowValues::Int(7),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = args;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            RowValues::Timestamp(value) => Some(*value),
            RowValues::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let RowValues::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Convert a JSON scalar into an argument value.
    ///
    /// Arrays and objects are kept as `JSON` so they can bind to `json`/`jsonb` columns.
    ///
    /// # Errors
    /// Returns `AccessError::Execution` for numbers that fit neither `i64` nor `f64`.
    pub fn from_json(value: JsonValue) -> Result<Self, AccessError> {
        match value {
            JsonValue::Null => Ok(RowValues::Null),
            JsonValue::Bool(b) => Ok(RowValues::Bool(b)),
            JsonValue::Number(n) => n
                .as_i64()
                .map(RowValues::Int)
                .or_else(|| n.as_f64().map(RowValues::Float))
                .ok_or_else(|| AccessError::Execution(format!("unsupported number {n}"))),
            JsonValue::String(s) => Ok(RowValues::Text(s)),
            other => Ok(RowValues::JSON(other)),
        }
    }
}

impl From<i64> for RowValues {
    fn from(value: i64) -> Self {
        RowValues::Int(value)
    }
}

impl From<i32> for RowValues {
    fn from(value: i32) -> Self {
        RowValues::Int(i64::from(value))
    }
}

impl From<f64> for RowValues {
    fn from(value: f64) -> Self {
        RowValues::Float(value)
    }
}

impl From<bool> for RowValues {
    fn from(value: bool) -> Self {
        RowValues::Bool(value)
    }
}

impl From<&str> for RowValues {
    fn from(value: &str) -> Self {
        RowValues::Text(value.to_string())
    }
}

impl From<String> for RowValues {
    fn from(value: String) -> Self {
        RowValues::Text(value)
    }
}

impl From<NaiveDateTime> for RowValues {
    fn from(value: NaiveDateTime) -> Self {
        RowValues::Timestamp(value)
    }
}

impl<T: Into<RowValues>> From<Option<T>> for RowValues {
    fn from(value: Option<T>) -> Self {
        value.map_or(RowValues::Null, Into::into)
    }
}

// Plain JSON, no enum tagging: rows render the way a client expects them.
impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowValues::Int(i) => serializer.serialize_i64(*i),
            RowValues::Float(f) => serializer.serialize_f64(*f),
            RowValues::Text(s) => serializer.serialize_str(s),
            RowValues::Bool(b) => serializer.serialize_bool(*b),
            RowValues::Timestamp(ts) => ts.serialize(serializer),
            RowValues::Null => serializer.serialize_none(),
            RowValues::JSON(v) => v.serialize(serializer),
            RowValues::Blob(bytes) => serializer.collect_seq(bytes),
        }
    }
}

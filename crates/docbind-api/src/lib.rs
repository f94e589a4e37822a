use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod document;
pub mod streaming;

pub use document::{CollectionRef, Document, DocumentId, DocumentRef, DEFAULT_DOCUMENT_ID};

pub use streaming::{Change, ChangeOrigin, DocumentChange, DocumentStore, DocumentStream};

/// Field map of a document, and the contents of a bound state slot.
pub type Record = HashMap<String, Value>;

/// Field value of a remote document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    // Stored as RFC3339 string; use as_datetime() to get the parsed chrono::DateTime
    DateTime(String),
    // Path of another document, e.g. "robocon/current"
    Reference(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Null,
}

impl Value {
    /// Create a Value from a serde_json::Value
    pub fn from_json_value(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from_json_value).collect())
            }
            serde_json::Value::Object(obj) => Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_json_value(v)))
                    .collect(),
            ),
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get datetime value as parsed chrono::DateTime
    pub fn as_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match self {
            Value::DateTime(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&chrono::Utc)),
            _ => None,
        }
    }

    pub fn from_datetime(dt: chrono::DateTime<chrono::Utc>) -> Self {
        Value::DateTime(dt.to_rfc3339())
    }

    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Value::Reference(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<HashMap<String, Value>> for Value {
    fn from(map: HashMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json_value(v)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) | Value::DateTime(s) | Value::Reference(s) => {
                serde_json::Value::String(s)
            }
            Value::Integer(i) => serde_json::Value::Number(serde_json::Number::from(i)),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(Into::into).collect())
            }
            Value::Object(obj) => {
                serde_json::Value::Object(obj.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Null => serde_json::Value::Null,
        }
    }
}

/// Build a `Record` from a JSON object literal. Non-object input yields an empty record.
pub fn record_from_json(v: serde_json::Value) -> Record {
    match Value::from_json_value(v) {
        Value::Object(map) => map,
        _ => Record::new(),
    }
}

/// Structured error types for binding operations.
///
/// `Clone + Serialize` so they can travel through change streams and across
/// FFI boundaries unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum ApiError {
    #[error("Document not found: {path}")]
    DocumentNotFound { path: String },

    #[error("Permission denied for {path}: {message}")]
    PermissionDenied { path: String, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Unknown state slot: {key}")]
    UnknownSlot { key: String },

    #[error("State slot already declared: {key}")]
    SlotAlreadyDeclared { key: String },

    #[error("State slot {key} is bound to {reference} and cannot be written locally")]
    SlotBound { key: String, reference: String },

    #[error("Stale claim on state slot {key} (generation {generation})")]
    StaleClaim { key: String, generation: u64 },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

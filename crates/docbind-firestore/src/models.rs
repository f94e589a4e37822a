//! Firestore REST document representation
//!
//! Field values arrive as single-key objects naming their type, e.g.
//! `{"integerValue": "2"}`. 64-bit integers are encoded as strings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use docbind_api::{Document, DocumentRef, Record, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirestoreDocument {
    /// Full resource name, `projects/{p}/databases/{d}/documents/{path}`
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, FirestoreValue>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirestoreValue {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    /// Base64-encoded
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FirestoreValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, FirestoreValue>,
}

impl FirestoreValue {
    pub fn to_value(&self) -> Value {
        match self {
            FirestoreValue::NullValue(()) => Value::Null,
            FirestoreValue::BooleanValue(b) => Value::Boolean(*b),
            // Out-of-range integers keep their text
            FirestoreValue::IntegerValue(s) => s
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::String(s.clone())),
            FirestoreValue::DoubleValue(f) => Value::Float(*f),
            FirestoreValue::TimestampValue(s) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| Value::from_datetime(dt.with_timezone(&chrono::Utc)))
                .unwrap_or_else(|_| Value::DateTime(s.clone())),
            FirestoreValue::StringValue(s) | FirestoreValue::BytesValue(s) => {
                Value::String(s.clone())
            }
            FirestoreValue::ReferenceValue(name) => Value::Reference(document_path(name)),
            FirestoreValue::GeoPointValue(point) => Value::Object(HashMap::from([
                ("latitude".to_string(), Value::Float(point.latitude)),
                ("longitude".to_string(), Value::Float(point.longitude)),
            ])),
            FirestoreValue::ArrayValue(array) => {
                Value::Array(array.values.iter().map(FirestoreValue::to_value).collect())
            }
            FirestoreValue::MapValue(map) => Value::Object(decode_fields(&map.fields)),
        }
    }
}

pub fn decode_fields(fields: &HashMap<String, FirestoreValue>) -> Record {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_value()))
        .collect()
}

/// Strip the `projects/.../documents/` prefix from a resource name
pub fn document_path(name: &str) -> String {
    match name.split_once("/documents/") {
        Some((_, path)) => path.to_string(),
        None => name.to_string(),
    }
}

impl FirestoreDocument {
    pub fn path(&self) -> String {
        document_path(&self.name)
    }

    pub fn into_document(self, reference: DocumentRef) -> Document {
        let mut document = Document::new(reference, decode_fields(&self.fields));
        document.update_time = self.update_time;
        document
    }
}

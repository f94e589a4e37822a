use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Record;

/// Identifier used when a collection holds a single well-known document.
pub const DEFAULT_DOCUMENT_ID: &str = "current";

// =============================================================================
// DocumentId
// =============================================================================

/// Identifier of a document inside a collection.
///
/// `DocumentId::default()` is the conventional `current` document; anything
/// else is an explicit identifier (e.g. an auto-generated key).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == DEFAULT_DOCUMENT_ID
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self(DEFAULT_DOCUMENT_ID.to_string())
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// References
// =============================================================================

/// Handle naming a collection in the remote store.
///
/// Pure path construction: building a reference never touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    name: String,
}

impl CollectionRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve a single document in this collection.
    pub fn doc(&self, id: impl Into<DocumentId>) -> DocumentRef {
        DocumentRef {
            collection: self.name.clone(),
            id: id.into(),
        }
    }
}

/// Opaque handle identifying one document in the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    collection: String,
    id: DocumentId,
}

impl DocumentRef {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Slash-separated path, e.g. `robocon/current`
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// =============================================================================
// Document
// =============================================================================

/// A document as delivered by the remote store: its reference plus fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub reference: DocumentRef,
    pub fields: Record,
    /// Remote update timestamp (RFC3339), when the backend reports one
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(reference: DocumentRef, fields: Record) -> Self {
        Self {
            reference,
            fields,
            update_time: None,
        }
    }

    pub fn id(&self) -> &str {
        self.reference.id().as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_path() {
        let r = CollectionRef::new("robovoyage").doc("EWJQ4H3MZyt1Vkd6Xd0A");
        assert_eq!(r.path(), "robovoyage/EWJQ4H3MZyt1Vkd6Xd0A");
        assert_eq!(r.collection(), "robovoyage");
        assert!(!r.id().is_default());
    }

    #[test]
    fn test_default_document_id() {
        let r = CollectionRef::new("robocon").doc(DocumentId::default());
        assert_eq!(r.to_string(), "robocon/current");
        assert!(r.id().is_default());
    }

    #[test]
    fn test_refs_compare_by_path() {
        let a = CollectionRef::new("robocon").doc("current");
        let b = CollectionRef::new("robocon").doc(DocumentId::default());
        let c = CollectionRef::new("robovoyage").doc("current");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

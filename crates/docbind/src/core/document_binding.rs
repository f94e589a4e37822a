use docbind_api::{ApiError, CollectionRef, DocumentId, DocumentRef, DocumentStore, Record};

use super::binding::BindingAdapter;
use super::state::StateStore;

/// Declaration of a live link between one state slot and one remote document.
///
/// The reference is resolved once, when the binding is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentBinding {
    key: String,
    reference: DocumentRef,
}

impl DocumentBinding {
    /// Bind `key` to `collection/document_id`
    pub fn new(
        collection: impl Into<String>,
        document_id: impl Into<DocumentId>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            reference: CollectionRef::new(collection).doc(document_id),
        }
    }

    /// Resolve the reference through a document store client
    pub fn resolve(
        client: &dyn DocumentStore,
        collection: &str,
        document_id: impl Into<DocumentId>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            reference: client.collection(collection).doc(document_id),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn reference(&self) -> &DocumentRef {
        &self.reference
    }

    /// Declare this binding's slot in the store, initially an empty record
    pub async fn declare(&self, store: &StateStore) -> Result<(), ApiError> {
        store.declare(&self.key, Record::new()).await
    }

    /// Attach the slot to the remote document.
    ///
    /// Resolves with the slot contents once the first snapshot has been
    /// applied. Errors from the adapter are returned as-is.
    pub async fn activate(
        &self,
        store: &StateStore,
        adapter: &dyn BindingAdapter,
    ) -> Result<Record, ApiError> {
        adapter.bind(store, &self.key, &self.reference).await
    }
}

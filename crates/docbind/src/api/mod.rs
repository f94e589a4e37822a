pub mod memory_store;

pub use memory_store::MemoryDocumentStore;

// Re-export the client-facing types from docbind-api
pub use docbind_api::{
    ApiError, Change, ChangeOrigin, CollectionRef, Document, DocumentChange, DocumentId,
    DocumentRef, DocumentStore, DocumentStream, Record, Value,
};

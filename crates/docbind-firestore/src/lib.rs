//! Firestore backend for docbind
//!
//! Polls single documents through the Firestore REST API and exposes them as
//! a `DocumentStore`.

pub mod client;
pub mod config;
pub mod models;
pub mod store;

pub use client::{error_for_status, FirestoreClient};
pub use config::FirestoreConfig;
pub use models::{FirestoreDocument, FirestoreValue};
pub use store::FirestoreDocumentStore;

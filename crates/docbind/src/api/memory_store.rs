//! In-memory implementation of DocumentStore
//!
//! HashMap-based document store for tests, offline mode and as a reference
//! implementation of the watch contract. Mutations notify every watcher of
//! the affected document.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use docbind_api::{
    ApiError, Change, ChangeOrigin, Document, DocumentChange, DocumentRef, DocumentStore,
    DocumentStream, Record,
};

// Unbounded: writes are never dropped for a slow watcher
type Watcher = mpsc::UnboundedSender<Result<Vec<DocumentChange>, ApiError>>;

#[derive(Default)]
struct MemoryState {
    documents: HashMap<DocumentRef, Document>,
    watchers: HashMap<DocumentRef, Vec<Watcher>>,
    denied: HashSet<DocumentRef>,
    version_counter: u64,
}

/// In-memory document store.
///
/// # Example
///
/// ```rust,no_run
/// use docbind::api::MemoryDocumentStore;
/// use docbind_api::{record_from_json, CollectionRef};
///
/// async fn example() {
///     let store = MemoryDocumentStore::new();
///     let reference = CollectionRef::new("robocon").doc("current");
///     store
///         .set_document(&reference, record_from_json(serde_json::json!({"status": "idle"})))
///         .await;
/// }
/// ```
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a document
    pub async fn set_document(&self, reference: &DocumentRef, fields: Record) {
        let mut state = self.state.lock().await;
        state.version_counter += 1;
        let document = Document::new(reference.clone(), fields);
        let existed = state
            .documents
            .insert(reference.clone(), document.clone())
            .is_some();

        let change = if existed {
            Change::Updated {
                id: reference.id().to_string(),
                data: document,
                origin: ChangeOrigin::remote_with_current_span(),
            }
        } else {
            Change::Created {
                data: document,
                origin: ChangeOrigin::remote_with_current_span(),
            }
        };
        Self::notify_watchers(&mut state, reference, change);
    }

    /// Merge fields into an existing document.
    ///
    /// # Errors
    ///
    /// `ApiError::DocumentNotFound` if the document does not exist.
    pub async fn update_fields(
        &self,
        reference: &DocumentRef,
        fields: Record,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        let document = state
            .documents
            .get_mut(reference)
            .ok_or_else(|| ApiError::DocumentNotFound {
                path: reference.path(),
            })?;
        document.fields.extend(fields);
        let document = document.clone();
        state.version_counter += 1;

        let change = Change::Updated {
            id: reference.id().to_string(),
            data: document,
            origin: ChangeOrigin::remote_with_current_span(),
        };
        Self::notify_watchers(&mut state, reference, change);
        Ok(())
    }

    /// Delete a document. Returns whether it existed.
    pub async fn delete_document(&self, reference: &DocumentRef) -> bool {
        let mut state = self.state.lock().await;
        if state.documents.remove(reference).is_none() {
            return false;
        }
        state.version_counter += 1;

        let change = Change::Deleted {
            id: reference.id().to_string(),
            origin: ChangeOrigin::remote_with_current_span(),
        };
        Self::notify_watchers(&mut state, reference, change);
        true
    }

    /// Make reads and watches of a document fail with `PermissionDenied`
    pub async fn deny_access(&self, reference: &DocumentRef) {
        let mut state = self.state.lock().await;
        state.denied.insert(reference.clone());
    }

    /// Number of open watch streams for a document
    pub async fn watcher_count(&self, reference: &DocumentRef) -> usize {
        let mut state = self.state.lock().await;
        match state.watchers.get_mut(reference) {
            Some(watchers) => {
                watchers.retain(|tx| !tx.is_closed());
                watchers.len()
            }
            None => 0,
        }
    }

    /// Mutation counter, incremented on every write
    pub async fn version(&self) -> u64 {
        self.state.lock().await.version_counter
    }

    /// Send a change to every watcher of `reference`, dropping closed ones.
    /// Called with the state lock held so watchers see mutations in order.
    fn notify_watchers(state: &mut MemoryState, reference: &DocumentRef, change: DocumentChange) {
        if let Some(watchers) = state.watchers.get_mut(reference) {
            let batch = vec![change];
            // send only fails once the receiving stream is dropped
            watchers.retain(|tx| tx.send(Ok(batch.clone())).is_ok());
            debug!(
                "[MemoryDocumentStore] Notified {} watcher(s) of {}",
                watchers.len(),
                reference
            );
        }
    }

    fn permission_denied(reference: &DocumentRef) -> ApiError {
        ApiError::PermissionDenied {
            path: reference.path(),
            message: "Missing or insufficient permissions".to_string(),
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, reference: &DocumentRef) -> Result<Option<Document>, ApiError> {
        let state = self.state.lock().await;
        if state.denied.contains(reference) {
            return Err(Self::permission_denied(reference));
        }
        Ok(state.documents.get(reference).cloned())
    }

    async fn watch_document(&self, reference: &DocumentRef) -> DocumentStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.lock().await;

        let first = if state.denied.contains(reference) {
            Err(Self::permission_denied(reference))
        } else {
            match state.documents.get(reference) {
                Some(document) => Ok(vec![Change::Created {
                    data: document.clone(),
                    origin: ChangeOrigin::remote_with_current_span(),
                }]),
                None => Err(ApiError::DocumentNotFound {
                    path: reference.path(),
                }),
            }
        };

        // Registered under the same lock as the initial read, so no write is missed
        state
            .watchers
            .entry(reference.clone())
            .or_default()
            .push(tx);

        let initial_stream = tokio_stream::iter(vec![first]);
        Box::pin(initial_stream.chain(UnboundedReceiverStream::new(rx)))
    }
}

//! Binding adapters: attach a state slot to a remote document
//!
//! Architecture:
//! - The adapter claims the slot (exclusive write access)
//! - Subscribes to the document's snapshot stream
//! - The first stream item decides the outcome of `bind`
//! - A background task applies every later snapshot in delivery order

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use docbind_api::{ApiError, Change, DocumentChange, DocumentRef, DocumentStore, Record};

use super::state::{SlotWriter, StateStore};

/// Attaches slots to remote documents.
///
/// `bind` resolves once the first snapshot has been applied to the slot and
/// returns the applied record. Failures from the document store are returned
/// unchanged.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait BindingAdapter: Send + Sync {
    async fn bind(
        &self,
        store: &StateStore,
        key: &str,
        reference: &DocumentRef,
    ) -> Result<Record, ApiError>;

    /// Stop updating the slot and release it. With `reset`, the slot is
    /// emptied. Unbinding an unbound key is a no-op.
    async fn unbind(&self, store: &StateStore, key: &str, reset: bool) -> Result<(), ApiError>;
}

struct ActiveBinding {
    writer: SlotWriter,
    handle: JoinHandle<()>,
}

impl ActiveBinding {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }

    async fn stop(self, reset: bool) -> Result<(), ApiError> {
        self.handle.abort();
        self.writer.release(reset).await
    }
}

type BindingSlot = Arc<Mutex<Option<ActiveBinding>>>;

/// `BindingAdapter` over any `DocumentStore` snapshot stream.
///
/// Keeps at most one binding per key. Activations of the same key are
/// serialised; different keys proceed independently.
pub struct SnapshotBindingAdapter {
    client: Arc<dyn DocumentStore>,
    bindings: Mutex<HashMap<String, BindingSlot>>,
}

impl SnapshotBindingAdapter {
    pub fn new(client: Arc<dyn DocumentStore>) -> Self {
        Self {
            client,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Number of keys with a live snapshot subscription
    pub async fn active_count(&self) -> usize {
        let entries: Vec<BindingSlot> = self.bindings.lock().await.values().cloned().collect();
        let mut count = 0;
        for entry in entries {
            if entry.lock().await.as_ref().is_some_and(ActiveBinding::is_live) {
                count += 1;
            }
        }
        count
    }

    async fn entry(&self, key: &str) -> BindingSlot {
        let mut bindings = self.bindings.lock().await;
        bindings
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl BindingAdapter for SnapshotBindingAdapter {
    #[tracing::instrument(name = "binding.bind", skip(self, store), fields(path = %reference))]
    async fn bind(
        &self,
        store: &StateStore,
        key: &str,
        reference: &DocumentRef,
    ) -> Result<Record, ApiError> {
        let entry = self.entry(key).await;
        let mut guard = entry.lock().await;

        if let Some(active) = guard.as_ref() {
            if active.writer.reference() == reference && active.is_live() {
                debug!(
                    "[SnapshotBindingAdapter] '{}' already bound to {}, reusing subscription",
                    key, reference
                );
                return store.get(key).await.ok_or_else(|| ApiError::UnknownSlot {
                    key: key.to_string(),
                });
            }
        }

        if let Some(previous) = guard.take() {
            // A finished stream for the same document keeps its last value
            let reset = previous.writer.reference() != reference;
            info!(
                "[SnapshotBindingAdapter] Replacing binding of '{}' ({} -> {}, reset={})",
                key,
                previous.writer.reference(),
                reference,
                reset
            );
            previous.stop(reset).await?;
        }

        let writer = store.claim(key, reference.clone()).await?;
        let mut stream = self.client.watch_document(reference).await;

        let first = match stream.next().await {
            Some(Ok(changes)) => changes,
            Some(Err(e)) => {
                warn!(
                    "[SnapshotBindingAdapter] Binding '{}' to {} failed: {}",
                    key, reference, e
                );
                release_after_failure(writer).await;
                return Err(e);
            }
            None => {
                release_after_failure(writer).await;
                return Err(ApiError::InternalError {
                    message: format!(
                        "Snapshot stream for {} closed before the first snapshot",
                        reference
                    ),
                });
            }
        };

        if let Err(e) = apply_changes(&writer, first).await {
            release_after_failure(writer).await;
            return Err(e);
        }
        let record = store.get(key).await.ok_or_else(|| ApiError::UnknownSlot {
            key: key.to_string(),
        })?;

        let task_writer = writer.clone();
        let path = reference.path();
        let handle = tokio::spawn(async move {
            while let Some(result) = stream.next().await {
                match result {
                    Ok(changes) => match apply_changes(&task_writer, changes).await {
                        Ok(()) => {}
                        Err(ApiError::StaleClaim { .. }) => {
                            debug!(
                                "[SnapshotBindingAdapter] Claim on '{}' replaced, stopping updates from {}",
                                task_writer.key(),
                                path
                            );
                            return;
                        }
                        Err(e) => warn!(
                            "[SnapshotBindingAdapter] Failed to apply snapshot from {}: {}",
                            path, e
                        ),
                    },
                    Err(e) => {
                        // Keep listening; the store decides whether the stream ends
                        warn!("[SnapshotBindingAdapter] Snapshot error for {}: {}", path, e);
                    }
                }
            }
            info!(
                "[SnapshotBindingAdapter] Snapshot stream for {} closed, '{}' keeps its last value",
                path,
                task_writer.key()
            );
        });

        info!(
            "[SnapshotBindingAdapter] Bound '{}' to {} ({} fields)",
            key,
            reference,
            record.len()
        );
        *guard = Some(ActiveBinding { writer, handle });
        Ok(record)
    }

    async fn unbind(&self, store: &StateStore, key: &str, reset: bool) -> Result<(), ApiError> {
        let entry = self.entry(key).await;
        let mut guard = entry.lock().await;
        match guard.take() {
            Some(active) => {
                info!(
                    "[SnapshotBindingAdapter] Unbinding '{}' from {} (reset={})",
                    key,
                    active.writer.reference(),
                    reset
                );
                active.stop(reset).await
            }
            None => {
                if store.get(key).await.is_none() {
                    return Err(ApiError::UnknownSlot {
                        key: key.to_string(),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Apply a batch of snapshot changes to a claimed slot, in order
async fn apply_changes(writer: &SlotWriter, changes: Vec<DocumentChange>) -> Result<(), ApiError> {
    for change in changes {
        let origin = change.origin();
        debug!(
            "[SnapshotBindingAdapter] Applying change to '{}' (trace_id={}, operation_id={})",
            writer.key(),
            origin.trace_id().unwrap_or("-"),
            origin.operation_id().unwrap_or("-")
        );
        match change {
            Change::Created { data, origin } | Change::Updated { data, origin, .. } => {
                writer.replace(data.fields, origin).await?;
            }
            Change::Deleted { id, origin } => {
                warn!(
                    "[SnapshotBindingAdapter] Document {} bound to '{}' was deleted, resetting slot",
                    id,
                    writer.key()
                );
                writer.reset(origin).await?;
            }
        }
    }
    Ok(())
}

async fn release_after_failure(writer: SlotWriter) {
    let key = writer.key().to_string();
    if let Err(e) = writer.release(false).await {
        warn!(
            "[SnapshotBindingAdapter] Failed to release claim on '{}': {}",
            key, e
        );
    }
}

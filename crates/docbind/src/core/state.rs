//! Reactive state store owning named slots
//!
//! Slots are declared once with an initial record and read by any consumer.
//! While a binding holds a claim on a slot, only that claim's `SlotWriter`
//! may write it; local `commit` calls are rejected.
//!
//! Every applied write is published on a broadcast channel as a
//! `SlotChange`, in the order the writes were applied.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use docbind_api::{ApiError, ChangeOrigin, DocumentRef, Record};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, trace};

const CHANGE_BUFFER: usize = 1000;

/// Notification emitted whenever a slot's record is replaced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotChange {
    pub key: String,
    pub record: Record,
    pub origin: ChangeOrigin,
}

#[derive(Debug, Clone)]
struct Claim {
    generation: u64,
    reference: DocumentRef,
}

#[derive(Debug, Default)]
struct Slot {
    record: Record,
    claim: Option<Claim>,
}

struct StoreInner {
    slots: RwLock<HashMap<String, Slot>>,
    change_tx: broadcast::Sender<SlotChange>,
    next_generation: AtomicU64,
}

/// Shared application state: a set of named slots.
///
/// Cloning is cheap and yields a handle to the same state.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore {
    pub fn new() -> Self {
        let (change_tx, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            inner: Arc::new(StoreInner {
                slots: RwLock::new(HashMap::new()),
                change_tx,
                next_generation: AtomicU64::new(1),
            }),
        }
    }

    /// Declare a slot with its initial record.
    ///
    /// # Errors
    ///
    /// `ApiError::SlotAlreadyDeclared` if the key exists.
    pub async fn declare(&self, key: &str, initial: Record) -> Result<(), ApiError> {
        let mut slots = self.inner.slots.write().await;
        if slots.contains_key(key) {
            return Err(ApiError::SlotAlreadyDeclared {
                key: key.to_string(),
            });
        }
        slots.insert(
            key.to_string(),
            Slot {
                record: initial,
                claim: None,
            },
        );
        debug!("[StateStore] Declared slot '{}'", key);
        Ok(())
    }

    /// Current record of a slot, `None` for an undeclared key
    pub async fn get(&self, key: &str) -> Option<Record> {
        let slots = self.inner.slots.read().await;
        slots.get(key).map(|slot| slot.record.clone())
    }

    /// All slots and their current records
    pub async fn snapshot(&self) -> HashMap<String, Record> {
        let slots = self.inner.slots.read().await;
        slots
            .iter()
            .map(|(key, slot)| (key.clone(), slot.record.clone()))
            .collect()
    }

    pub async fn keys(&self) -> Vec<String> {
        let slots = self.inner.slots.read().await;
        let mut keys: Vec<String> = slots.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn is_bound(&self, key: &str) -> bool {
        self.bound_reference(key).await.is_some()
    }

    /// Reference currently bound to the slot, if any
    pub async fn bound_reference(&self, key: &str) -> Option<DocumentRef> {
        let slots = self.inner.slots.read().await;
        slots
            .get(key)
            .and_then(|slot| slot.claim.as_ref())
            .map(|claim| claim.reference.clone())
    }

    /// Replace a slot's record from local code.
    ///
    /// # Errors
    ///
    /// - `ApiError::UnknownSlot` for an undeclared key
    /// - `ApiError::SlotBound` while a binding owns the slot
    pub async fn commit(&self, key: &str, record: Record) -> Result<(), ApiError> {
        let mut slots = self.inner.slots.write().await;
        let slot = slots.get_mut(key).ok_or_else(|| ApiError::UnknownSlot {
            key: key.to_string(),
        })?;
        if let Some(claim) = &slot.claim {
            return Err(ApiError::SlotBound {
                key: key.to_string(),
                reference: claim.reference.path(),
            });
        }
        slot.record = record;
        self.publish(key, &slot.record, ChangeOrigin::local_with_current_span());
        Ok(())
    }

    /// Subscribe to slot changes.
    ///
    /// A subscriber that falls more than the channel capacity behind receives
    /// an `ApiError::InternalError` describing the lag, then continues with
    /// the newest changes.
    pub fn subscribe(&self) -> Pin<Box<dyn Stream<Item = Result<SlotChange, ApiError>> + Send>> {
        let stream = BroadcastStream::new(self.inner.change_tx.subscribe()).map(|item| {
            item.map_err(|e: BroadcastStreamRecvError| ApiError::InternalError {
                message: format!("Slot change stream: {}", e),
            })
        });
        Box::pin(stream)
    }

    /// Take exclusive write access to a slot on behalf of a binding.
    ///
    /// # Errors
    ///
    /// - `ApiError::UnknownSlot` for an undeclared key
    /// - `ApiError::SlotBound` if another claim is active
    pub async fn claim(&self, key: &str, reference: DocumentRef) -> Result<SlotWriter, ApiError> {
        let mut slots = self.inner.slots.write().await;
        let slot = slots.get_mut(key).ok_or_else(|| ApiError::UnknownSlot {
            key: key.to_string(),
        })?;
        if let Some(existing) = &slot.claim {
            return Err(ApiError::SlotBound {
                key: key.to_string(),
                reference: existing.reference.path(),
            });
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        slot.claim = Some(Claim {
            generation,
            reference: reference.clone(),
        });
        debug!(
            "[StateStore] Slot '{}' claimed for {} (generation {})",
            key, reference, generation
        );

        Ok(SlotWriter {
            store: self.clone(),
            key: key.to_string(),
            generation,
            reference,
        })
    }

    async fn write_claimed(
        &self,
        key: &str,
        generation: u64,
        record: Record,
        origin: ChangeOrigin,
    ) -> Result<(), ApiError> {
        let mut slots = self.inner.slots.write().await;
        let slot = slots.get_mut(key).ok_or_else(|| ApiError::UnknownSlot {
            key: key.to_string(),
        })?;
        if !Self::holds_claim(slot, generation) {
            return Err(ApiError::StaleClaim {
                key: key.to_string(),
                generation,
            });
        }
        slot.record = record;
        self.publish(key, &slot.record, origin);
        Ok(())
    }

    async fn release_claim(&self, key: &str, generation: u64, reset: bool) -> Result<(), ApiError> {
        let mut slots = self.inner.slots.write().await;
        let slot = slots.get_mut(key).ok_or_else(|| ApiError::UnknownSlot {
            key: key.to_string(),
        })?;
        if !Self::holds_claim(slot, generation) {
            return Err(ApiError::StaleClaim {
                key: key.to_string(),
                generation,
            });
        }
        slot.claim = None;
        if reset {
            slot.record = Record::new();
            self.publish(key, &slot.record, ChangeOrigin::local_with_current_span());
        }
        debug!(
            "[StateStore] Slot '{}' released (generation {}, reset={})",
            key, generation, reset
        );
        Ok(())
    }

    fn holds_claim(slot: &Slot, generation: u64) -> bool {
        matches!(&slot.claim, Some(claim) if claim.generation == generation)
    }

    // Called with the slots write lock held so notifications follow write order
    fn publish(&self, key: &str, record: &Record, origin: ChangeOrigin) {
        let change = SlotChange {
            key: key.to_string(),
            record: record.clone(),
            origin,
        };
        if self.inner.change_tx.send(change).is_err() {
            trace!("[StateStore] No subscribers for change on '{}'", key);
        }
    }
}

/// Exclusive write handle for one claimed slot.
///
/// Clones share the same claim. Once the claim is released, or replaced by a
/// newer one, every clone's writes fail with `ApiError::StaleClaim`.
#[derive(Clone)]
pub struct SlotWriter {
    store: StateStore,
    key: String,
    generation: u64,
    reference: DocumentRef,
}

impl std::fmt::Debug for SlotWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotWriter")
            .field("key", &self.key)
            .field("generation", &self.generation)
            .field("reference", &self.reference)
            .finish()
    }
}

impl SlotWriter {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn reference(&self) -> &DocumentRef {
        &self.reference
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Overwrite the slot with a new record
    pub async fn replace(&self, record: Record, origin: ChangeOrigin) -> Result<(), ApiError> {
        self.store
            .write_claimed(&self.key, self.generation, record, origin)
            .await
    }

    /// Overwrite the slot with an empty record
    pub async fn reset(&self, origin: ChangeOrigin) -> Result<(), ApiError> {
        self.replace(Record::new(), origin).await
    }

    /// Give up the claim. With `reset`, the slot is emptied in the same step.
    pub async fn release(self, reset: bool) -> Result<(), ApiError> {
        self.store
            .release_claim(&self.key, self.generation, reset)
            .await
    }
}

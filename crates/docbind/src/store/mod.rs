//! Application store: the `robocon` and `robovoyage` modules over one state
//!
//! Each module contributes one slot (initially `{}`) and one action that
//! binds the slot to its remote document. The document store client is
//! passed in at construction; both modules share it and one binding adapter.

pub mod robocon;
pub mod robovoyage;

use std::sync::Arc;
use tracing::info;

use docbind_api::{ApiError, DocumentStore, Record};

use crate::core::{BindingAdapter, DocumentBinding, SnapshotBindingAdapter, StateStore};

pub use robocon::RoboconModule;
pub use robovoyage::RobovoyageModule;

/// A store module owning one bound slot
pub trait StoreModule: Send + Sync {
    /// Slot key in the shared state
    fn key(&self) -> &'static str;

    fn initial_state(&self) -> Record {
        Record::new()
    }

    /// Resolve the module's document binding through the client
    fn binding(&self, client: &dyn DocumentStore) -> DocumentBinding;
}

/// Declare a module's slot and resolve its binding
async fn register(
    state: &StateStore,
    module: &dyn StoreModule,
    client: &dyn DocumentStore,
) -> Result<DocumentBinding, ApiError> {
    state.declare(module.key(), module.initial_state()).await?;
    let binding = module.binding(client);
    info!(
        "[RoboStore] Registered module '{}' -> {}",
        module.key(),
        binding.reference()
    );
    Ok(binding)
}

pub struct RoboStore {
    state: StateStore,
    adapter: Arc<dyn BindingAdapter>,
    robocon: DocumentBinding,
    robovoyage: DocumentBinding,
}

impl RoboStore {
    /// Build the store over a document store client, with the snapshot
    /// binding adapter.
    pub async fn new(client: Arc<dyn DocumentStore>) -> Result<Self, ApiError> {
        let adapter: Arc<dyn BindingAdapter> =
            Arc::new(SnapshotBindingAdapter::new(Arc::clone(&client)));
        Self::with_adapter(client.as_ref(), adapter).await
    }

    pub async fn with_adapter(
        client: &dyn DocumentStore,
        adapter: Arc<dyn BindingAdapter>,
    ) -> Result<Self, ApiError> {
        let state = StateStore::new();
        let robocon = register(&state, &RoboconModule, client).await?;
        let robovoyage = register(&state, &RobovoyageModule, client).await?;

        Ok(Self {
            state,
            adapter,
            robocon,
            robovoyage,
        })
    }

    /// Bind `robocon` to its document; resolves after the first snapshot
    pub async fn set_robocon_ref(&self) -> Result<Record, ApiError> {
        self.robocon
            .activate(&self.state, self.adapter.as_ref())
            .await
    }

    /// Bind `robovoyage` to its document; resolves after the first snapshot
    pub async fn set_robovoyage_ref(&self) -> Result<Record, ApiError> {
        self.robovoyage
            .activate(&self.state, self.adapter.as_ref())
            .await
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn robocon_binding(&self) -> &DocumentBinding {
        &self.robocon
    }

    pub fn robovoyage_binding(&self) -> &DocumentBinding {
        &self.robovoyage
    }

    /// Current `robocon` slot contents
    pub async fn robocon(&self) -> Record {
        self.state.get(robocon::KEY).await.unwrap_or_default()
    }

    /// Current `robovoyage` slot contents
    pub async fn robovoyage(&self) -> Record {
        self.state.get(robovoyage::KEY).await.unwrap_or_default()
    }
}

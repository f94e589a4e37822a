//! Live bindings between remote documents and a reactive state store
//!
//! - `core` - StateStore (slots), BindingAdapter, DocumentBinding
//! - `api` - MemoryDocumentStore and re-exported client types
//! - `store` - the `robocon` / `robovoyage` modules assembled into RoboStore
//! - `telemetry` - tracing subscriber setup

pub mod api;
pub mod core;
pub mod store;
pub mod telemetry;

pub use crate::core::{
    BindingAdapter, DocumentBinding, SlotChange, SlotWriter, SnapshotBindingAdapter, StateStore,
};
pub use store::{RoboStore, StoreModule};

pub mod binding;
pub mod document_binding;
pub mod state;


pub use binding::{BindingAdapter, SnapshotBindingAdapter};
pub use document_binding::DocumentBinding;
pub use state::{SlotChange, SlotWriter, StateStore};

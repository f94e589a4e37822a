//! `robocon` store module: live view of the current robot contest document

use docbind_api::{DocumentId, DocumentStore};

use super::StoreModule;
use crate::core::DocumentBinding;

pub const KEY: &str = "robocon";
pub const COLLECTION: &str = "robocon";

pub struct RoboconModule;

impl StoreModule for RoboconModule {
    fn key(&self) -> &'static str {
        KEY
    }

    fn binding(&self, client: &dyn DocumentStore) -> DocumentBinding {
        DocumentBinding::resolve(client, COLLECTION, DocumentId::default(), KEY)
    }
}

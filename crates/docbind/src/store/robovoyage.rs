//! `robovoyage` store module

use docbind_api::DocumentStore;

use super::StoreModule;
use crate::core::DocumentBinding;

pub const KEY: &str = "robovoyage";
pub const COLLECTION: &str = "robovoyage";
pub const DOCUMENT_ID: &str = "EWJQ4H3MZyt1Vkd6Xd0A";

pub struct RobovoyageModule;

impl StoreModule for RobovoyageModule {
    fn key(&self) -> &'static str {
        KEY
    }

    fn binding(&self, client: &dyn DocumentStore) -> DocumentBinding {
        DocumentBinding::resolve(client, COLLECTION, DOCUMENT_ID, KEY)
    }
}

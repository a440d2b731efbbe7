//! In-memory inventory store for tests.

use database::sqlite::{SqliteConfig, connect_from_config};
use domain_inventory::InventoryStore;

/// An initialised inventory store backed by an in-memory SQLite database.
///
/// Each `TestStore` owns its own database; nothing leaks between tests.
pub struct TestStore {
    pub store: InventoryStore,
}

impl TestStore {
    pub async fn new() -> Self {
        let db = connect_from_config(SqliteConfig::in_memory())
            .await
            .expect("failed to open in-memory store");

        let store = InventoryStore::new(db);
        store.initialize().await.expect("failed to create schema");

        Self { store }
    }

    pub fn store(&self) -> InventoryStore {
        self.store.clone()
    }
}

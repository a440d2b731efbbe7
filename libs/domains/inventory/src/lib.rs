//! Inventory Domain
//!
//! The normalised multi-cloud resource inventory: canonical models, the
//! SQLite-backed store, and the read-only query surface.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ QueryEngine  │  ← named templates, guarded ad-hoc SELECT, TTL cache
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │InventoryStore│  ← schema, transactional batch upsert, change journal
//! └──────┬───────┘
//!        │
//! ┌──────▼───────┐
//! │    Models    │  ← Resource, Account, DiscoveryRun, enums
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_inventory::{InventoryStore, QueryEngine, ResourceFilter};
//! use database::sqlite::{self, SqliteConfig};
//! use resilience::TtlCache;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> resilience::ScanResult<()> {
//! let db = sqlite::connect_from_config_with_retry(SqliteConfig::new("inventory.db"), None).await?;
//!
//! let store = InventoryStore::new(db);
//! store.initialize().await?;
//!
//! let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
//! let queries = QueryEngine::new(store.clone(), cache);
//!
//! let public = queries.query_template("public_resources").await?;
//! let snapshot = store.get_resources(&ResourceFilter::default()).await?;
//! # Ok(())
//! # }
//! ```

pub mod models;
pub mod query;
pub mod store;

// Re-export commonly used types
pub use models::{
    Account, AccountKind, ChangeType, Credentials, Dependency, Direction, DiscoveryMethod,
    DiscoveryMode, DiscoveryResult, DiscoveryRun, DiscoveryStatus, ErrorRecord, RelationshipKind,
    Resource, ResourceChange, ResourceFilter, ResourceSummary, RunStatus,
};
pub use query::QueryEngine;
pub use store::InventoryStore;

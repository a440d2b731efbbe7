//! Database library providing the SQLite connector for the inventory store
//!
//! The inventory lives in a single SQLite file; this crate owns the
//! connection layer (pool options, PRAGMA setup, retrying connects, health
//! checks). Schema and queries live with the domain in `domain_inventory`.
//!
//! # Example
//!
//! ```ignore
//! use database::sqlite::{self, SqliteConfig};
//!
//! let config = SqliteConfig::new("inventory.db");
//! let db = sqlite::connect_from_config_with_retry(config, None).await?;
//! ```

pub mod sqlite;

pub use sqlite::{SqliteConfig, connect, connect_from_config, connect_from_config_with_retry};

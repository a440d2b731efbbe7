//! SQLite connection support for the inventory store.

pub mod config;
pub mod connector;
pub mod health;

pub use config::SqliteConfig;
pub use connector::{connect, connect_from_config, connect_from_config_with_retry};
pub use health::health_check;

use core_config::{ConfigError, env_or_default, env_parse_or};
use sea_orm::ConnectOptions;
use std::time::Duration;
use tracing::log::LevelFilter;

/// SQLite database configuration
///
/// Holds the store path and pool settings. It can be constructed manually
/// or loaded from environment variables.
///
/// # Example
///
/// ```ignore
/// use database::sqlite::SqliteConfig;
///
/// // Manual construction
/// let config = SqliteConfig::new("inventory.db");
///
/// // From environment variables
/// let config = SqliteConfig::from_env()?;
/// ```
#[derive(Clone, Debug)]
pub struct SqliteConfig {
    /// Path to the database file, or `:memory:` for an in-memory store
    pub path: String,

    /// Maximum number of connections in the pool.
    ///
    /// Writers serialise on SQLite's file lock regardless; extra
    /// connections only widen concurrent reads.
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout_secs: u64,

    /// SQLite busy handler timeout in milliseconds
    pub busy_timeout_ms: u64,

    /// Enable SQL query logging
    pub sqlx_logging: bool,
}

impl SqliteConfig {
    /// Create a new SqliteConfig with default pool settings
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_connections: 4,
            acquire_timeout_secs: 10,
            busy_timeout_ms: 10_000,
            sqlx_logging: false,
        }
    }

    /// In-memory database, single connection (each pooled connection would
    /// otherwise see its own empty database). Used by tests.
    pub fn in_memory() -> Self {
        Self {
            path: ":memory:".to_string(),
            max_connections: 1,
            acquire_timeout_secs: 10,
            busy_timeout_ms: 10_000,
            sqlx_logging: false,
        }
    }

    /// Set the pool size
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Enable SQL query logging
    pub fn with_sqlx_logging(mut self) -> Self {
        self.sqlx_logging = true;
        self
    }

    /// The sqlx connection URL for this config.
    ///
    /// `mode=rwc` creates the file on first use.
    pub fn url(&self) -> String {
        if self.path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{}?mode=rwc", self.path)
        }
    }

    /// Convert this config into SeaORM ConnectOptions
    pub fn into_connect_options(self) -> ConnectOptions {
        let mut opt = ConnectOptions::new(self.url());
        opt.max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .sqlx_logging(self.sqlx_logging)
            .sqlx_logging_level(LevelFilter::Debug);
        opt
    }
}

impl SqliteConfig {
    /// Load from environment variables:
    /// - `INVENTORY_DB_PATH` (default `inventory.db`)
    /// - `INVENTORY_DB_MAX_CONNECTIONS` (default 4)
    /// - `INVENTORY_DB_BUSY_TIMEOUT_MS` (default 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            path: env_or_default("INVENTORY_DB_PATH", "inventory.db"),
            max_connections: env_parse_or("INVENTORY_DB_MAX_CONNECTIONS", 4)?,
            acquire_timeout_secs: env_parse_or("INVENTORY_DB_ACQUIRE_TIMEOUT_SECS", 10)?,
            busy_timeout_ms: env_parse_or("INVENTORY_DB_BUSY_TIMEOUT_MS", 10_000)?,
            sqlx_logging: env_parse_or("INVENTORY_DB_SQLX_LOGGING", false)?,
        })
    }
}

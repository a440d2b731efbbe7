use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::SqliteConfig;
use resilience::{RetryPolicy, ScanError, ScanResult, retry_with_policy};

/// Connect to a SQLite database file, creating it if missing.
///
/// # Example
/// ```ignore
/// use database::sqlite::connect;
///
/// let db = connect("sqlite://inventory.db?mode=rwc").await?;
/// ```
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = sea_orm::ConnectOptions::new(database_url);
    options.max_connections(4).sqlx_logging(false);

    let db = Database::connect(options).await?;
    apply_pragmas(&db, 5_000).await?;

    info!("Successfully connected to SQLite database");

    Ok(db)
}

/// Connect using a SqliteConfig
///
/// This is the recommended way to connect when using configuration.
///
/// # Example
/// ```ignore
/// use database::sqlite::{SqliteConfig, connect_from_config};
///
/// let config = SqliteConfig::new("inventory.db");
/// let db = connect_from_config(config).await?;
/// ```
pub async fn connect_from_config(config: SqliteConfig) -> Result<DatabaseConnection, DbErr> {
    let busy_timeout_ms = config.busy_timeout_ms;
    let db = Database::connect(config.into_connect_options()).await?;
    apply_pragmas(&db, busy_timeout_ms).await?;

    info!("Successfully connected to SQLite database");

    Ok(db)
}

/// Connect from config with automatic retry on failure
///
/// Uses the `storage` retry profile (exponential backoff with jitter) to
/// ride out a store file briefly locked by another process.
///
/// # Example
/// ```ignore
/// use database::sqlite::{SqliteConfig, connect_from_config_with_retry};
/// use resilience::RetryPolicy;
///
/// let db = connect_from_config_with_retry(SqliteConfig::from_env()?, None).await?;
/// ```
pub async fn connect_from_config_with_retry(
    config: SqliteConfig,
    policy: Option<RetryPolicy>,
) -> ScanResult<DatabaseConnection> {
    let policy = policy.unwrap_or_else(RetryPolicy::storage);
    let cancel = CancellationToken::new();

    retry_with_policy(&policy, &cancel, || {
        let config = config.clone();
        async move {
            connect_from_config(config)
                .await
                .map_err(|e| ScanError::storage("failed to open inventory store").with_source(e))
        }
    })
    .await
}

/// Session PRAGMAs for a durable, concurrent-read store:
/// WAL journalling, enforced foreign keys, and a busy timeout instead of
/// immediate `SQLITE_BUSY` failures.
async fn apply_pragmas(db: &DatabaseConnection, busy_timeout_ms: u64) -> Result<(), DbErr> {
    for pragma in [
        "PRAGMA journal_mode = WAL".to_string(),
        "PRAGMA foreign_keys = ON".to_string(),
        format!("PRAGMA busy_timeout = {busy_timeout_ms}"),
    ] {
        db.execute_raw(Statement::from_string(db.get_database_backend(), pragma))
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_in_memory() {
        let db = connect_from_config(SqliteConfig::in_memory()).await.unwrap();

        let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_owned());
        let row = db.query_one_raw(stmt).await.unwrap();
        assert!(row.is_some());
    }

    #[tokio::test]
    async fn test_connect_with_retry_in_memory() {
        let config = SqliteConfig::in_memory();
        let db = connect_from_config_with_retry(config, None).await.unwrap();

        let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_owned());
        assert!(db.query_one_raw(stmt).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_from_env_config_connects() {
        let config = temp_env::with_var("INVENTORY_DB_PATH", Some(":memory:"), || {
            SqliteConfig::from_env().unwrap()
        });
        // from_env keeps the configured pool width; force the
        // single-connection shape required for :memory:.
        let db = connect_from_config(config.with_max_connections(1)).await.unwrap();

        let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_owned());
        assert!(db.query_one_raw(stmt).await.unwrap().is_some());
    }
}

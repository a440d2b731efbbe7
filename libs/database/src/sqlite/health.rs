use sea_orm::{ConnectionTrait, DatabaseConnection, Statement};
use resilience::{ScanError, ScanResult};

/// Check that the store answers a trivial query.
///
/// Used by the `status` surface and on startup after connecting.
pub async fn health_check(db: &DatabaseConnection) -> ScanResult<()> {
    let stmt = Statement::from_string(db.get_database_backend(), "SELECT 1".to_owned());
    db.query_one_raw(stmt)
        .await
        .map_err(|e| ScanError::storage("inventory store health check failed").with_source(e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::{SqliteConfig, connect_from_config};

    #[tokio::test]
    async fn test_health_check_on_fresh_store() {
        let db = connect_from_config(SqliteConfig::in_memory()).await.unwrap();
        health_check(&db).await.unwrap();
    }
}

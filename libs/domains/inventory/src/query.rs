//! Read-only query surface over the inventory store.
//!
//! Two shapes:
//! - **Named templates**: a closed set of fixed SQL bodies keyed by name.
//!   Templates never interpolate user input.
//! - **Ad-hoc queries**: arbitrary SQL admitted only through the guard
//!   below (SELECT-only, forbidden-token scan).
//!
//! Results are memoised per query string for five minutes, the summary for
//! one minute.

use observability::DiscoveryMetrics;
use resilience::{ScanError, ScanResult, TtlCache};
use sea_orm::{ConnectionTrait, Statement, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::models::{Resource, ResourceSummary};
use crate::store::{InventoryStore, row_to_resource};

/// Tokens that reject an ad-hoc query outright, wherever they appear.
const FORBIDDEN_TOKENS: &[&str] = &[
    "drop", "delete", "insert", "update", "alter", "create", "truncate", "exec", "execute", "sp_",
    "xp_", "cmdshell",
];

const QUERY_CACHE_TTL: Duration = Duration::from_secs(300);
const SUMMARY_CACHE_TTL: Duration = Duration::from_secs(60);

/// Deadline for one query execution.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// The closed template set. Names are part of the public contract.
fn template_sql(name: &str) -> Option<&'static str> {
    Some(match name {
        "public_resources" => {
            "SELECT * FROM resources WHERE public_access = 1 ORDER BY monthly_cost DESC"
        }
        "unused_resources" => {
            "SELECT * FROM resources
             WHERE configuration LIKE '%\"state\":\"stopped\"%'
                OR configuration LIKE '%\"status\":\"stopped\"%'
                OR configuration LIKE '%\"attached\":false%'
             ORDER BY monthly_cost DESC"
        }
        "unencrypted_databases" => {
            "SELECT * FROM resources
             WHERE encrypted = 0
               AND (service IN ('rds', 'dynamodb', 'sql', 'cloudsql', 'cosmosdb')
                    OR resource_type LIKE '%database%'
                    OR resource_type LIKE '%db_instance%')
             ORDER BY monthly_cost DESC"
        }
        "cost_optimization" => {
            "SELECT * FROM resources WHERE monthly_cost > 100 ORDER BY monthly_cost DESC LIMIT 50"
        }
        "security_issues" => {
            "SELECT * FROM resources
             WHERE public_access = 1 OR encrypted = 0
             ORDER BY public_access DESC, monthly_cost DESC"
        }
        "recent_resources" => {
            "SELECT * FROM resources ORDER BY discovered_at DESC LIMIT 100"
        }
        "high_cost_resources" => {
            "SELECT * FROM resources WHERE monthly_cost >= 500 ORDER BY monthly_cost DESC"
        }
        "by_provider" => "SELECT * FROM resources ORDER BY provider, service, resource_id",
        "by_service" => "SELECT * FROM resources ORDER BY service, provider, resource_id",
        "by_region" => "SELECT * FROM resources ORDER BY region, provider, resource_id",
        _ => return None,
    })
}

/// Guarded, cached query engine.
pub struct QueryEngine {
    store: InventoryStore,
    results: Arc<TtlCache<String, Vec<Resource>>>,
    summaries: TtlCache<&'static str, ResourceSummary>,
}

impl QueryEngine {
    /// `results` is the process-wide snapshot cache shared with the
    /// analysis orchestrator.
    pub fn new(store: InventoryStore, results: Arc<TtlCache<String, Vec<Resource>>>) -> Self {
        Self {
            store,
            results,
            summaries: TtlCache::new(SUMMARY_CACHE_TTL),
        }
    }

    /// Run an ad-hoc query after validation.
    pub async fn query(&self, sql: &str) -> ScanResult<Vec<Resource>> {
        self.query_with_args(sql, Vec::new()).await
    }

    /// Run an ad-hoc query with bind values. Results are memoised per
    /// `(query, args)` pair.
    pub async fn query_with_args(&self, sql: &str, args: Vec<Value>) -> ScanResult<Vec<Resource>> {
        validate_query(sql)?;

        let cache_key = if args.is_empty() {
            sql.to_string()
        } else {
            format!("{sql}|{args:?}")
        };
        if let Some(cached) = self.results.get(&cache_key) {
            DiscoveryMetrics::record_cache_event(true);
            return Ok(cached);
        }
        DiscoveryMetrics::record_cache_event(false);

        let db = self.store.connection();
        let stmt = if args.is_empty() {
            Statement::from_string(db.get_database_backend(), sql.to_owned())
        } else {
            Statement::from_sql_and_values(db.get_database_backend(), sql, args)
        };
        let resources = self.run(stmt).await?;
        self.results
            .put_with_ttl(cache_key, resources.clone(), QUERY_CACHE_TTL);
        Ok(resources)
    }

    /// Run a named template.
    pub async fn query_template(&self, name: &str) -> ScanResult<Vec<Resource>> {
        let sql = template_sql(name)
            .ok_or_else(|| ScanError::not_found(format!("unknown query template '{name}'")))?;

        let cache_key = format!("template:{name}");
        if let Some(cached) = self.results.get(&cache_key) {
            DiscoveryMetrics::record_cache_event(true);
            return Ok(cached);
        }
        DiscoveryMetrics::record_cache_event(false);

        let db = self.store.connection();
        let stmt = Statement::from_string(db.get_database_backend(), sql.to_owned());
        let resources = self.run(stmt).await?;
        self.results
            .put_with_ttl(cache_key, resources.clone(), QUERY_CACHE_TTL);
        Ok(resources)
    }

    /// Aggregate summary, cached for one minute.
    pub async fn summary(&self) -> ScanResult<ResourceSummary> {
        if let Some(cached) = self.summaries.get(&"summary") {
            return Ok(cached);
        }

        let summary = self.store.get_summary().await?;
        self.summaries.put("summary", summary.clone());
        Ok(summary)
    }

    /// Drop all memoised results (used after a fresh discovery run).
    pub fn invalidate(&self) {
        self.results.clear();
        self.summaries.clear();
    }

    async fn run(&self, stmt: Statement) -> ScanResult<Vec<Resource>> {
        let db = self.store.connection();
        let rows = tokio::time::timeout(QUERY_TIMEOUT, db.query_all_raw(stmt))
            .await
            .map_err(|_| ScanError::timeout("query deadline exceeded"))?
            .map_err(|e| ScanError::storage("query execution failed").with_source(e))?;

        debug!(rows = rows.len(), "query executed");
        Ok(rows.iter().map(row_to_resource).collect())
    }
}

/// The ad-hoc guard: SELECT-only, and none of the forbidden tokens may
/// appear anywhere in the statement.
pub fn validate_query(sql: &str) -> ScanResult<()> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(ScanError::validation("query is empty"));
    }

    let lowered = trimmed.to_lowercase();
    if !lowered.starts_with("select") {
        return Err(ScanError::validation("only SELECT queries are allowed"));
    }

    for token in FORBIDDEN_TOKENS {
        if lowered.contains(token) {
            return Err(ScanError::validation(format!(
                "query contains forbidden token '{token}'"
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use resilience::ErrorKind;

    #[test]
    fn test_guard_accepts_plain_selects() {
        validate_query("SELECT * FROM resources").unwrap();
        validate_query("  select provider, name FROM resources WHERE public_access = 1").unwrap();
    }

    #[test]
    fn test_guard_rejects_non_select_prefix() {
        for sql in [
            "PRAGMA journal_mode = DELETE",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "",
            "   ",
        ] {
            let err = validate_query(sql).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "sql: {sql}");
        }
    }

    #[test]
    fn test_guard_rejects_every_forbidden_token() {
        for token in FORBIDDEN_TOKENS {
            let sql = format!("SELECT * FROM resources -- {token}");
            let err = validate_query(&sql).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "token: {token}");
        }
    }

    #[test]
    fn test_guard_rejects_tokens_inside_identifiers() {
        // The scan is deliberately blunt: even column names embedding a
        // forbidden token are rejected.
        assert!(validate_query("SELECT created_at FROM resources").is_err());
        assert!(validate_query("SELECT * FROM resources WHERE updated_at > '2026'").is_err());
    }

    #[test]
    fn test_template_set_is_closed() {
        for name in [
            "public_resources",
            "unused_resources",
            "unencrypted_databases",
            "cost_optimization",
            "security_issues",
            "recent_resources",
            "high_cost_resources",
            "by_provider",
            "by_service",
            "by_region",
        ] {
            assert!(template_sql(name).is_some(), "missing template {name}");
        }
        assert!(template_sql("everything").is_none());
    }
}

//! The durable inventory store.
//!
//! A single SQLite file holds four tables: `resources`, `discovery_runs`,
//! `resource_changes` (append-only journal), and `resource_relationships`
//! (persisted dependency edges), plus a `schema_meta` version row.
//!
//! Column note: `resources.id` is the store's global key (the ARN when the
//! provider assigns one, otherwise `provider:account:resource_id`);
//! `resource_id` keeps the provider-local identifier and
//! `(provider, account_id, resource_id)` carries the uniqueness constraint.
//!
//! Writers serialise on the pooled connection; reads may run concurrently.
//! `store_discovery` is one transaction: either the whole batch commits or
//! none of it does.

use chrono::{DateTime, Utc};
use observability::DiscoveryMetrics;
use resilience::{ScanError, ScanResult};
use sea_orm::{
    ConnectionTrait, DatabaseConnection, QueryResult, Statement, TransactionTrait, Value,
};
use tracing::{debug, info};

use crate::models::{
    ChangeType, Dependency, Direction, DiscoveryResult, DiscoveryRun, DiscoveryStatus,
    RelationshipKind, Resource, ResourceChange, ResourceFilter, ResourceSummary,
};

/// Idempotent schema. Safe to run on every start.
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS resources (
        id TEXT PRIMARY KEY,
        resource_id TEXT NOT NULL,
        arn TEXT,
        provider TEXT NOT NULL,
        account_id TEXT NOT NULL,
        region TEXT NOT NULL DEFAULT 'global',
        service TEXT NOT NULL,
        resource_type TEXT NOT NULL,
        name TEXT NOT NULL DEFAULT '',
        created_at TEXT,
        updated_at TEXT,
        discovered_at TEXT NOT NULL,
        discovery_method TEXT NOT NULL DEFAULT 'direct_api',
        tags TEXT NOT NULL DEFAULT '{}',
        configuration TEXT NOT NULL DEFAULT 'null',
        compliance TEXT NOT NULL DEFAULT '[]',
        public_access INTEGER NOT NULL DEFAULT 0,
        encrypted INTEGER NOT NULL DEFAULT 0,
        monthly_cost REAL NOT NULL DEFAULT 0,
        dependencies TEXT NOT NULL DEFAULT '[]',
        UNIQUE (provider, account_id, resource_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_resources_provider ON resources (provider)",
    "CREATE INDEX IF NOT EXISTS idx_resources_account ON resources (account_id)",
    "CREATE INDEX IF NOT EXISTS idx_resources_type ON resources (resource_type)",
    "CREATE INDEX IF NOT EXISTS idx_resources_service ON resources (service)",
    "CREATE INDEX IF NOT EXISTS idx_resources_region ON resources (region)",
    "CREATE INDEX IF NOT EXISTS idx_resources_public ON resources (public_access)",
    "CREATE INDEX IF NOT EXISTS idx_resources_cost ON resources (monthly_cost)",
    "CREATE TABLE IF NOT EXISTS discovery_runs (
        id TEXT PRIMARY KEY,
        started_at TEXT NOT NULL,
        ended_at TEXT,
        resource_count INTEGER NOT NULL DEFAULT 0,
        providers TEXT NOT NULL DEFAULT '[]',
        mode TEXT NOT NULL,
        status TEXT NOT NULL,
        errors TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS resource_changes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        resource_id TEXT NOT NULL REFERENCES resources (id),
        change_type TEXT NOT NULL,
        changed_at TEXT NOT NULL,
        old_configuration TEXT,
        new_configuration TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_changes_resource ON resource_changes (resource_id)",
    "CREATE TABLE IF NOT EXISTS resource_relationships (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_arn TEXT NOT NULL,
        target_arn TEXT NOT NULL,
        relationship TEXT NOT NULL,
        weight REAL NOT NULL DEFAULT 1.0,
        UNIQUE (source_arn, target_arn, relationship)
    )",
];

const SCHEMA_VERSION: &str = "1";

/// SQLite-backed inventory store.
#[derive(Clone)]
pub struct InventoryStore {
    db: DatabaseConnection,
}

impl InventoryStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The underlying connection, for the read-only query surface.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Create the schema. Idempotent; call on every start.
    pub async fn initialize(&self) -> ScanResult<()> {
        for ddl in SCHEMA {
            self.execute(ddl, []).await?;
        }
        self.execute(
            "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?)",
            [SCHEMA_VERSION.into()],
        )
        .await?;

        debug!("inventory schema ready");
        Ok(())
    }

    /// Persist one discovery run and its resources in a single transaction.
    ///
    /// Each resource is upserted on its identity; when a previous
    /// configuration exists and differs, an `updated` row is appended to
    /// the change journal. The whole batch either commits or rolls back.
    pub async fn store_discovery(&self, result: &DiscoveryResult) -> ScanResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| ScanError::storage("failed to open store transaction").with_source(e))?;

        let run = &result.run;
        let run_stmt = self.stmt(
            "INSERT OR REPLACE INTO discovery_runs
                (id, started_at, ended_at, resource_count, providers, mode, status, errors)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            [
                run.id.to_string().into(),
                run.started_at.to_rfc3339().into(),
                run.ended_at.map(|t| t.to_rfc3339()).into(),
                (run.resource_count as i64).into(),
                to_json_text(&run.providers)?.into(),
                run.mode.to_string().into(),
                run.status.to_string().into(),
                to_json_text(&run.errors)?.into(),
            ],
        );
        txn.execute_raw(run_stmt)
            .await
            .map_err(|e| ScanError::storage("failed to insert discovery run").with_source(e))?;

        let mut changes_recorded = 0usize;

        for resource in &result.resources {
            let storage_id = resource.storage_id();
            let new_configuration = serde_json::to_string(&resource.configuration)
                .map_err(|e| ScanError::storage("failed to encode configuration").with_source(e))?;

            let lookup = self.stmt(
                "SELECT configuration FROM resources WHERE id = ?",
                [storage_id.clone().into()],
            );
            let previous = txn
                .query_one_raw(lookup)
                .await
                .map_err(|e| ScanError::storage("failed to read previous state").with_source(e))?
                .map(|row| row.try_get::<String>("", "configuration"))
                .transpose()
                .map_err(|e| ScanError::storage("failed to decode previous state").with_source(e))?;

            let upsert = self.stmt(
                "INSERT OR REPLACE INTO resources
                    (id, resource_id, arn, provider, account_id, region, service,
                     resource_type, name, created_at, updated_at, discovered_at,
                     discovery_method, tags, configuration, compliance,
                     public_access, encrypted, monthly_cost, dependencies)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                [
                    storage_id.clone().into(),
                    resource.id.clone().into(),
                    resource.arn.clone().into(),
                    resource.provider.clone().into(),
                    resource.account_id.clone().into(),
                    resource.region.clone().into(),
                    resource.service.clone().into(),
                    resource.resource_type.clone().into(),
                    resource.name.clone().into(),
                    resource.created_at.map(|t| t.to_rfc3339()).into(),
                    resource.updated_at.map(|t| t.to_rfc3339()).into(),
                    resource.discovered_at.to_rfc3339().into(),
                    resource.discovery_method.to_string().into(),
                    to_json_text(&resource.tags)?.into(),
                    new_configuration.clone().into(),
                    to_json_text(&resource.compliance)?.into(),
                    resource.public_access.into(),
                    resource.encrypted.into(),
                    resource.monthly_cost.into(),
                    to_json_text(&resource.dependencies)?.into(),
                ],
            );
            txn.execute_raw(upsert)
                .await
                .map_err(|e| ScanError::storage("failed to upsert resource").with_source(e))?;

            // Journal only configuration drift; a byte-identical re-store
            // leaves the journal untouched.
            if let Some(old_configuration) = previous {
                let old_value: serde_json::Value =
                    serde_json::from_str(&old_configuration).unwrap_or(serde_json::Value::Null);
                if old_value != resource.configuration {
                    let change = self.stmt(
                        "INSERT INTO resource_changes
                            (resource_id, change_type, changed_at, old_configuration, new_configuration)
                         VALUES (?, ?, ?, ?, ?)",
                        [
                            storage_id.into(),
                            ChangeType::Updated.to_string().into(),
                            Utc::now().to_rfc3339().into(),
                            old_configuration.into(),
                            new_configuration.into(),
                        ],
                    );
                    txn.execute_raw(change).await.map_err(|e| {
                        ScanError::storage("failed to append change journal").with_source(e)
                    })?;
                    changes_recorded += 1;
                }
            }
        }

        txn.commit()
            .await
            .map_err(|e| ScanError::storage("failed to commit discovery batch").with_source(e))?;

        DiscoveryMetrics::record_resources_upserted(result.resources.len());
        DiscoveryMetrics::record_changes_recorded(changes_recorded);

        info!(
            run_id = %run.id,
            resources = result.resources.len(),
            changes = changes_recorded,
            "discovery batch committed"
        );

        Ok(())
    }

    /// Snapshot the resources matching `filter`, fully materialised.
    pub async fn get_resources(&self, filter: &ResourceFilter) -> ScanResult<Vec<Resource>> {
        let mut sql = String::from("SELECT * FROM resources");
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(provider) = &filter.provider {
            clauses.push("provider = ?");
            values.push(provider.clone().into());
        }
        if let Some(account_id) = &filter.account_id {
            clauses.push("account_id = ?");
            values.push(account_id.clone().into());
        }
        if let Some(region) = &filter.region {
            clauses.push("region = ?");
            values.push(region.clone().into());
        }
        if let Some(service) = &filter.service {
            clauses.push("service = ?");
            values.push(service.clone().into());
        }
        if let Some(resource_type) = &filter.resource_type {
            clauses.push("resource_type = ?");
            values.push(resource_type.clone().into());
        }
        if let Some(public_access) = filter.public_access {
            clauses.push("public_access = ?");
            values.push(public_access.into());
        }
        if let Some(encrypted) = filter.encrypted {
            clauses.push("encrypted = ?");
            values.push(encrypted.into());
        }
        if let Some(min_cost) = filter.min_monthly_cost {
            clauses.push("monthly_cost >= ?");
            values.push(min_cost.into());
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY provider, account_id, service, resource_id");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(&limit.to_string());
        }

        let rows = self
            .db
            .query_all_raw(self.stmt(&sql, values))
            .await
            .map_err(|e| ScanError::storage("failed to read resources").with_source(e))?;

        Ok(rows.iter().map(row_to_resource).collect())
    }

    /// Aggregate counts and costs over the whole store.
    pub async fn get_summary(&self) -> ScanResult<ResourceSummary> {
        let mut summary = ResourceSummary::default();

        summary.total_resources = self
            .scalar_u64("SELECT COUNT(*) AS n FROM resources")
            .await?;
        summary.public_resources = self
            .scalar_u64("SELECT COUNT(*) AS n FROM resources WHERE public_access = 1")
            .await?;
        summary.unencrypted_resources = self
            .scalar_u64("SELECT COUNT(*) AS n FROM resources WHERE encrypted = 0")
            .await?;

        for (column, target) in [
            ("provider", &mut summary.by_provider),
            ("service", &mut summary.by_service),
            ("resource_type", &mut summary.by_type),
            ("region", &mut summary.by_region),
        ] {
            let sql = format!("SELECT {column} AS k, COUNT(*) AS n FROM resources GROUP BY {column}");
            let rows = self
                .db
                .query_all_raw(self.stmt(&sql, []))
                .await
                .map_err(|e| ScanError::storage("failed to aggregate resources").with_source(e))?;
            for row in rows {
                let key: String = row.try_get("", "k").unwrap_or_default();
                let count: i64 = row.try_get("", "n").unwrap_or_default();
                target.insert(key, count as u64);
            }
        }

        let rows = self
            .db
            .query_all_raw(self.stmt(
                "SELECT provider AS k, COALESCE(SUM(monthly_cost), 0) AS c
                 FROM resources GROUP BY provider",
                [],
            ))
            .await
            .map_err(|e| ScanError::storage("failed to aggregate costs").with_source(e))?;
        for row in rows {
            let key: String = row.try_get("", "k").unwrap_or_default();
            let cost: f64 = row.try_get("", "c").unwrap_or_default();
            summary.total_monthly_cost += cost;
            summary.cost_by_provider.insert(key, cost);
        }

        Ok(summary)
    }

    /// The most recent run's summary, or the never-ran sentinel.
    pub async fn get_discovery_status(&self) -> ScanResult<DiscoveryStatus> {
        let row = self
            .db
            .query_one_raw(self.stmt(
                "SELECT * FROM discovery_runs ORDER BY started_at DESC LIMIT 1",
                [],
            ))
            .await
            .map_err(|e| ScanError::storage("failed to read discovery runs").with_source(e))?;

        Ok(match row {
            Some(row) => DiscoveryStatus::LastRun(row_to_run(&row)),
            None => DiscoveryStatus::NeverRun,
        })
    }

    /// Persist inferred dependency edges (deep-mode enrichment).
    pub async fn record_relationships(&self, edges: &[Dependency]) -> ScanResult<()> {
        if edges.is_empty() {
            return Ok(());
        }

        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| ScanError::storage("failed to open store transaction").with_source(e))?;

        for edge in edges {
            let stmt = self.stmt(
                "INSERT OR REPLACE INTO resource_relationships
                    (source_arn, target_arn, relationship, weight)
                 VALUES (?, ?, ?, ?)",
                [
                    edge.source_arn.clone().into(),
                    edge.target_arn.clone().into(),
                    edge.relationship.to_string().into(),
                    edge.confidence.into(),
                ],
            );
            txn.execute_raw(stmt)
                .await
                .map_err(|e| ScanError::storage("failed to record relationship").with_source(e))?;
        }

        txn.commit()
            .await
            .map_err(|e| ScanError::storage("failed to commit relationships").with_source(e))?;

        debug!(edges = edges.len(), "relationships recorded");
        Ok(())
    }

    /// Read back persisted dependency edges.
    pub async fn get_relationships(&self) -> ScanResult<Vec<Dependency>> {
        let rows = self
            .db
            .query_all_raw(self.stmt(
                "SELECT source_arn, target_arn, relationship, weight FROM resource_relationships",
                [],
            ))
            .await
            .map_err(|e| ScanError::storage("failed to read relationships").with_source(e))?;

        Ok(rows
            .iter()
            .map(|row| Dependency {
                source_arn: row.try_get("", "source_arn").unwrap_or_default(),
                target_arn: row.try_get("", "target_arn").unwrap_or_default(),
                relationship: row
                    .try_get::<String>("", "relationship")
                    .unwrap_or_default()
                    .parse()
                    .unwrap_or(RelationshipKind::AttachedTo),
                direction: Direction::Outbound,
                confidence: row.try_get("", "weight").unwrap_or(1.0),
            })
            .collect())
    }

    /// Read the change journal, optionally for a single resource.
    pub async fn get_changes(&self, resource_id: Option<&str>) -> ScanResult<Vec<ResourceChange>> {
        let (sql, values): (&str, Vec<Value>) = match resource_id {
            Some(id) => (
                "SELECT * FROM resource_changes WHERE resource_id = ? ORDER BY id",
                vec![id.into()],
            ),
            None => ("SELECT * FROM resource_changes ORDER BY id", Vec::new()),
        };

        let rows = self
            .db
            .query_all_raw(self.stmt(sql, values))
            .await
            .map_err(|e| ScanError::storage("failed to read change journal").with_source(e))?;

        Ok(rows
            .iter()
            .map(|row| ResourceChange {
                resource_id: row.try_get("", "resource_id").unwrap_or_default(),
                change_type: row
                    .try_get::<String>("", "change_type")
                    .unwrap_or_default()
                    .parse()
                    .unwrap_or(ChangeType::Updated),
                changed_at: parse_timestamp(row, "changed_at").unwrap_or_else(Utc::now),
                old_configuration: row.try_get("", "old_configuration").ok(),
                new_configuration: row.try_get("", "new_configuration").ok(),
            })
            .collect())
    }

    fn stmt(&self, sql: &str, values: impl IntoIterator<Item = Value>) -> Statement {
        Statement::from_sql_and_values(self.db.get_database_backend(), sql, values)
    }

    async fn execute(&self, sql: &str, values: impl IntoIterator<Item = Value>) -> ScanResult<()> {
        self.db
            .execute_raw(self.stmt(sql, values))
            .await
            .map_err(|e| ScanError::storage("store statement failed").with_source(e))?;
        Ok(())
    }

    async fn scalar_u64(&self, sql: &str) -> ScanResult<u64> {
        let row = self
            .db
            .query_one_raw(self.stmt(sql, []))
            .await
            .map_err(|e| ScanError::storage("failed to aggregate resources").with_source(e))?;
        Ok(row
            .and_then(|row| row.try_get::<i64>("", "n").ok())
            .unwrap_or_default() as u64)
    }
}

fn to_json_text<T: serde::Serialize>(value: &T) -> ScanResult<String> {
    serde_json::to_string(value)
        .map_err(|e| ScanError::storage("failed to encode store column").with_source(e))
}

fn parse_timestamp(row: &QueryResult, column: &str) -> Option<DateTime<Utc>> {
    row.try_get::<Option<String>>("", column)
        .ok()
        .flatten()
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|t| t.with_timezone(&Utc))
}

/// Materialise a resource from a query row.
///
/// Lenient by design: the ad-hoc query surface may project a subset of
/// columns, and a projection should still yield usable values rather than
/// an error, so every column falls back to its zero value.
pub(crate) fn row_to_resource(row: &QueryResult) -> Resource {
    let text = |column: &str| row.try_get::<String>("", column).unwrap_or_default();
    let json_text = |column: &str| {
        row.try_get::<Option<String>>("", column)
            .ok()
            .flatten()
            .unwrap_or_default()
    };

    Resource {
        id: text("resource_id"),
        arn: row
            .try_get::<Option<String>>("", "arn")
            .ok()
            .flatten()
            .filter(|arn| !arn.is_empty()),
        provider: text("provider"),
        account_id: text("account_id"),
        region: text("region"),
        service: text("service"),
        resource_type: text("resource_type"),
        name: text("name"),
        created_at: parse_timestamp(row, "created_at"),
        updated_at: parse_timestamp(row, "updated_at"),
        discovered_at: parse_timestamp(row, "discovered_at").unwrap_or_else(Utc::now),
        discovery_method: text("discovery_method").parse().unwrap_or_default(),
        tags: serde_json::from_str(&json_text("tags")).unwrap_or_default(),
        configuration: serde_json::from_str(&json_text("configuration"))
            .unwrap_or(serde_json::Value::Null),
        public_access: row.try_get("", "public_access").unwrap_or_default(),
        encrypted: row.try_get("", "encrypted").unwrap_or_default(),
        compliance: serde_json::from_str(&json_text("compliance")).unwrap_or_default(),
        monthly_cost: row.try_get("", "monthly_cost").unwrap_or_default(),
        dependencies: serde_json::from_str(&json_text("dependencies")).unwrap_or_default(),
        dependents: Vec::new(),
    }
}

fn row_to_run(row: &QueryResult) -> DiscoveryRun {
    let text = |column: &str| row.try_get::<String>("", column).unwrap_or_default();

    DiscoveryRun {
        id: text("id").parse().unwrap_or_else(|_| uuid::Uuid::nil()),
        started_at: parse_timestamp(row, "started_at").unwrap_or_else(Utc::now),
        ended_at: parse_timestamp(row, "ended_at"),
        resource_count: row.try_get::<i64>("", "resource_count").unwrap_or_default() as usize,
        providers: row
            .try_get::<String>("", "providers")
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        mode: text("mode").parse().unwrap_or_default(),
        status: text("status").parse().unwrap_or_default(),
        errors: row
            .try_get::<String>("", "errors")
            .ok()
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
    }
}

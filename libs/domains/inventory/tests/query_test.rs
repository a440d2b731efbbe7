//! Query engine tests: templates, the ad-hoc guard, and result caching.

use domain_inventory::{
    DiscoveryMode, DiscoveryResult, DiscoveryRun, QueryEngine, Resource, RunStatus,
};
use resilience::{ErrorKind, TtlCache};
use std::sync::Arc;
use std::time::Duration;
use test_utils::{ResourceBuilder, TestStore};

fn engine(harness: &TestStore) -> QueryEngine {
    let cache: Arc<TtlCache<String, Vec<Resource>>> =
        Arc::new(TtlCache::new(Duration::from_secs(300)));
    QueryEngine::new(harness.store(), cache)
}

async fn seed(harness: &TestStore, resources: Vec<Resource>) {
    let mut run = DiscoveryRun::begin(DiscoveryMode::Standard, vec!["aws".to_string()]);
    run.resource_count = resources.len();
    run.status = RunStatus::Succeeded;
    harness
        .store
        .store_discovery(&DiscoveryResult { run, resources })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_public_resources_template_orders_by_cost() {
    let harness = TestStore::new().await;
    seed(
        &harness,
        vec![
            ResourceBuilder::new("aws", "a1", "cheap-public")
                .public()
                .monthly_cost(10.0)
                .build(),
            ResourceBuilder::new("aws", "a1", "pricey-public")
                .public()
                .monthly_cost(50.0)
                .build(),
            ResourceBuilder::new("aws", "a1", "private-1").build(),
            ResourceBuilder::new("aws", "a1", "private-2").build(),
            ResourceBuilder::new("gcp", "p1", "private-3").build(),
        ],
    )
    .await;

    let engine = engine(&harness);
    let public = engine.query_template("public_resources").await.unwrap();

    assert_eq!(public.len(), 2);
    assert_eq!(public[0].id, "pricey-public");
    assert_eq!(public[1].id, "cheap-public");
}

#[tokio::test]
async fn test_unencrypted_databases_template_ignores_other_services() {
    let harness = TestStore::new().await;
    seed(
        &harness,
        vec![
            ResourceBuilder::new("aws", "a1", "db-1")
                .service("rds")
                .resource_type("db_instance")
                .unencrypted()
                .build(),
            ResourceBuilder::new("aws", "a1", "assets")
                .service("s3")
                .resource_type("bucket")
                .unencrypted()
                .build(),
            ResourceBuilder::new("aws", "a1", "db-2")
                .service("rds")
                .resource_type("db_instance")
                .build(),
        ],
    )
    .await;

    let engine = engine(&harness);
    let databases = engine.query_template("unencrypted_databases").await.unwrap();

    assert_eq!(databases.len(), 1);
    assert_eq!(databases[0].id, "db-1");
}

#[tokio::test]
async fn test_unknown_template_is_not_found() {
    let harness = TestStore::new().await;
    let engine = engine(&harness);

    let err = engine.query_template("everything").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_ad_hoc_select_returns_rows() {
    let harness = TestStore::new().await;
    seed(
        &harness,
        vec![
            ResourceBuilder::new("aws", "a1", "i-1").build(),
            ResourceBuilder::new("gcp", "p1", "vm-1").build(),
        ],
    )
    .await;

    let engine = engine(&harness);
    let rows = engine
        .query("SELECT * FROM resources WHERE provider = 'aws'")
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "i-1");
}

#[tokio::test]
async fn test_ad_hoc_query_with_bind_values() {
    let harness = TestStore::new().await;
    seed(
        &harness,
        vec![
            ResourceBuilder::new("aws", "a1", "i-1").monthly_cost(10.0).build(),
            ResourceBuilder::new("aws", "a1", "i-2").monthly_cost(90.0).build(),
        ],
    )
    .await;

    let engine = engine(&harness);
    let rows = engine
        .query_with_args(
            "SELECT * FROM resources WHERE monthly_cost >= ?",
            vec![50.0.into()],
        )
        .await
        .unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "i-2");
}

#[tokio::test]
async fn test_guard_rejects_mutations_and_tokens() {
    let harness = TestStore::new().await;
    let engine = engine(&harness);

    for sql in [
        "DELETE FROM resources",
        "DROP TABLE resources",
        "INSERT INTO resources VALUES (1)",
        "UPDATE resources SET name = 'x'",
        "SELECT * FROM resources; DROP TABLE resources",
        "SELECT * FROM resources WHERE name = 'exec'",
        "select * from resources -- xp_cmdshell",
    ] {
        let err = engine.query(sql).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "sql: {sql}");
    }
}

#[tokio::test]
async fn test_results_are_cached_until_invalidated() {
    let harness = TestStore::new().await;
    seed(
        &harness,
        vec![ResourceBuilder::new("aws", "a1", "i-1").build()],
    )
    .await;

    let engine = engine(&harness);
    let sql = "SELECT * FROM resources";
    assert_eq!(engine.query(sql).await.unwrap().len(), 1);

    // New data lands, but the memoised result is still served.
    seed(
        &harness,
        vec![ResourceBuilder::new("aws", "a1", "i-2").build()],
    )
    .await;
    assert_eq!(engine.query(sql).await.unwrap().len(), 1);

    engine.invalidate();
    assert_eq!(engine.query(sql).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_summary_counts() {
    let harness = TestStore::new().await;
    seed(
        &harness,
        vec![
            ResourceBuilder::new("aws", "a1", "i-1").monthly_cost(10.0).build(),
            ResourceBuilder::new("aws", "a1", "i-2").public().build(),
        ],
    )
    .await;

    let engine = engine(&harness);
    let summary = engine.summary().await.unwrap();
    assert_eq!(summary.total_resources, 2);
    assert_eq!(summary.public_resources, 1);
}

//! Store tests: round-trip fidelity, the change journal, aggregates, and
//! run status.

use domain_inventory::{
    ChangeType, Dependency, DiscoveryMode, DiscoveryResult, DiscoveryRun, DiscoveryStatus,
    RelationshipKind, ResourceFilter, RunStatus,
};
use serde_json::json;
use test_utils::{ResourceBuilder, TestStore};

fn run_with(resources: Vec<domain_inventory::Resource>) -> DiscoveryResult {
    let mut run = DiscoveryRun::begin(DiscoveryMode::Standard, vec!["aws".to_string()]);
    run.resource_count = resources.len();
    run.status = RunStatus::Succeeded;
    DiscoveryResult { run, resources }
}

#[tokio::test]
async fn test_initialize_is_idempotent() {
    let harness = TestStore::new().await;
    // TestStore::new already initialised once.
    harness.store.initialize().await.unwrap();
    harness.store.initialize().await.unwrap();

    let summary = harness.store.get_summary().await.unwrap();
    assert_eq!(summary.total_resources, 0);
}

#[tokio::test]
async fn test_store_round_trip_preserves_fields() {
    let harness = TestStore::new().await;

    let instance = ResourceBuilder::new("aws", "111122223333", "i-0abc")
        .arn("arn:aws:ec2:us-east-1:111122223333:instance/i-0abc")
        .service("ec2")
        .resource_type("instance")
        .name("web-1")
        .tag("Environment", "prod")
        .tag("Name", "web-1")
        .configuration(json!({"instance_type": "m5.large", "state": "running"}))
        .monthly_cost(70.08)
        .depends_on("sg-123")
        .build();
    let bucket = ResourceBuilder::new("aws", "111122223333", "assets")
        .service("s3")
        .resource_type("bucket")
        .name("assets")
        .region("global")
        .public()
        .unencrypted()
        .build();

    harness
        .store
        .store_discovery(&run_with(vec![instance.clone(), bucket.clone()]))
        .await
        .unwrap();

    let mut fetched = harness
        .store
        .get_resources(&ResourceFilter::default())
        .await
        .unwrap();
    fetched.sort_by_key(|r| r.id.clone());
    assert_eq!(fetched.len(), 2);

    let stored_instance = fetched.iter().find(|r| r.id == "i-0abc").unwrap();
    assert_eq!(stored_instance.arn, instance.arn);
    assert_eq!(stored_instance.provider, "aws");
    assert_eq!(stored_instance.account_id, "111122223333");
    assert_eq!(stored_instance.region, "us-east-1");
    assert_eq!(stored_instance.service, "ec2");
    assert_eq!(stored_instance.resource_type, "instance");
    assert_eq!(stored_instance.name, "web-1");
    assert_eq!(stored_instance.tags, instance.tags);
    assert_eq!(stored_instance.configuration, instance.configuration);
    assert_eq!(stored_instance.monthly_cost, 70.08);
    assert_eq!(stored_instance.dependencies, vec!["sg-123".to_string()]);
    assert!(!stored_instance.public_access);
    assert!(stored_instance.encrypted);

    let stored_bucket = fetched.iter().find(|r| r.id == "assets").unwrap();
    assert!(stored_bucket.public_access);
    assert!(!stored_bucket.encrypted);
    assert_eq!(stored_bucket.region, "global");
}

#[tokio::test]
async fn test_second_identical_run_is_idempotent() {
    let harness = TestStore::new().await;

    let resources = vec![
        ResourceBuilder::new("aws", "111122223333", "i-1")
            .configuration(json!({"state": "running"}))
            .build(),
        ResourceBuilder::new("aws", "111122223333", "i-2")
            .configuration(json!({"state": "stopped"}))
            .build(),
    ];

    harness
        .store
        .store_discovery(&run_with(resources.clone()))
        .await
        .unwrap();
    let first = harness
        .store
        .get_resources(&ResourceFilter::default())
        .await
        .unwrap();

    harness
        .store
        .store_discovery(&run_with(resources))
        .await
        .unwrap();
    let second = harness
        .store
        .get_resources(&ResourceFilter::default())
        .await
        .unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(second.iter()) {
        assert_eq!(a.storage_id(), b.storage_id());
        assert_eq!(a.configuration, b.configuration);
    }

    // Identical configuration: the journal stays empty.
    let changes = harness.store.get_changes(None).await.unwrap();
    assert!(changes.is_empty());
}

#[tokio::test]
async fn test_change_journal_records_configuration_drift() {
    let harness = TestStore::new().await;

    let v1 = ResourceBuilder::new("aws", "111122223333", "i-0abc")
        .configuration(json!({"k": 1}))
        .build();
    harness
        .store
        .store_discovery(&run_with(vec![v1.clone()]))
        .await
        .unwrap();

    let v2 = ResourceBuilder::new("aws", "111122223333", "i-0abc")
        .configuration(json!({"k": 2}))
        .build();
    harness
        .store
        .store_discovery(&run_with(vec![v2]))
        .await
        .unwrap();

    let changes = harness.store.get_changes(None).await.unwrap();
    assert_eq!(changes.len(), 1);

    let change = &changes[0];
    assert_eq!(change.resource_id, v1.storage_id());
    assert_eq!(change.change_type, ChangeType::Updated);

    let old: serde_json::Value =
        serde_json::from_str(change.old_configuration.as_deref().unwrap()).unwrap();
    let new: serde_json::Value =
        serde_json::from_str(change.new_configuration.as_deref().unwrap()).unwrap();
    assert_eq!(old, json!({"k": 1}));
    assert_eq!(new, json!({"k": 2}));
}

#[tokio::test]
async fn test_filters_are_conjunctive() {
    let harness = TestStore::new().await;

    harness
        .store
        .store_discovery(&run_with(vec![
            ResourceBuilder::new("aws", "a1", "i-1").monthly_cost(10.0).build(),
            ResourceBuilder::new("aws", "a1", "i-2")
                .public()
                .monthly_cost(200.0)
                .build(),
            ResourceBuilder::new("gcp", "p1", "vm-1").monthly_cost(50.0).build(),
        ]))
        .await
        .unwrap();

    let aws = harness
        .store
        .get_resources(&ResourceFilter::for_provider("aws"))
        .await
        .unwrap();
    assert_eq!(aws.len(), 2);

    let expensive_public = harness
        .store
        .get_resources(&ResourceFilter {
            provider: Some("aws".to_string()),
            public_access: Some(true),
            min_monthly_cost: Some(100.0),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(expensive_public.len(), 1);
    assert_eq!(expensive_public[0].id, "i-2");

    let limited = harness
        .store
        .get_resources(&ResourceFilter {
            limit: Some(2),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_summary_aggregates() {
    let harness = TestStore::new().await;

    harness
        .store
        .store_discovery(&run_with(vec![
            ResourceBuilder::new("aws", "a1", "i-1")
                .service("ec2")
                .monthly_cost(100.0)
                .build(),
            ResourceBuilder::new("aws", "a1", "assets")
                .service("s3")
                .resource_type("bucket")
                .public()
                .unencrypted()
                .monthly_cost(5.0)
                .build(),
            ResourceBuilder::new("gcp", "p1", "vm-1")
                .service("compute")
                .monthly_cost(45.0)
                .build(),
        ]))
        .await
        .unwrap();

    let summary = harness.store.get_summary().await.unwrap();
    assert_eq!(summary.total_resources, 3);
    assert_eq!(summary.by_provider["aws"], 2);
    assert_eq!(summary.by_provider["gcp"], 1);
    assert_eq!(summary.by_service["s3"], 1);
    assert_eq!(summary.public_resources, 1);
    assert_eq!(summary.unencrypted_resources, 1);
    assert!((summary.total_monthly_cost - 150.0).abs() < 1e-9);
    assert!((summary.cost_by_provider["aws"] - 105.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_discovery_status_transitions() {
    let harness = TestStore::new().await;

    assert!(matches!(
        harness.store.get_discovery_status().await.unwrap(),
        DiscoveryStatus::NeverRun
    ));

    let result = run_with(vec![ResourceBuilder::new("aws", "a1", "i-1").build()]);
    harness.store.store_discovery(&result).await.unwrap();

    match harness.store.get_discovery_status().await.unwrap() {
        DiscoveryStatus::LastRun(run) => {
            assert_eq!(run.id, result.run.id);
            assert_eq!(run.resource_count, 1);
            assert_eq!(run.mode, DiscoveryMode::Standard);
            assert_eq!(run.status, RunStatus::Succeeded);
        }
        DiscoveryStatus::NeverRun => panic!("expected a recorded run"),
    }
}

#[tokio::test]
async fn test_relationships_round_trip() {
    let harness = TestStore::new().await;

    let edges = vec![
        Dependency::new("arn:a", "arn:b", RelationshipKind::UsesSecurityGroup),
        Dependency::new("arn:a", "arn:c", RelationshipKind::RunsInVpc).with_confidence(0.6),
    ];
    harness.store.record_relationships(&edges).await.unwrap();
    // Re-recording the same edges must not duplicate them.
    harness.store.record_relationships(&edges).await.unwrap();

    let mut stored = harness.store.get_relationships().await.unwrap();
    stored.sort_by_key(|e| e.target_arn.clone());
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].relationship, RelationshipKind::UsesSecurityGroup);
    assert!((stored[1].confidence - 0.6).abs() < 1e-9);
}

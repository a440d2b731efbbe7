//! Dependency enrichment hook.
//!
//! Wires the dependency analyzer into the discovery pipeline: in standard
//! and deep modes the collected snapshot gets its `dependencies` lists
//! filled from resolved edges, and deep mode additionally persists the
//! edges into `resource_relationships`.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use domain_analysis::DependencyAnalyzer;
use domain_discovery::{DiscoveryOptions, Enricher};
use domain_inventory::{InventoryStore, RelationshipKind, Resource};
use resilience::{ScanError, ScanResult};

pub struct DependencyEnricher {
    analyzer: DependencyAnalyzer,
    store: InventoryStore,
}

impl DependencyEnricher {
    pub fn new(store: InventoryStore) -> Self {
        Self {
            analyzer: DependencyAnalyzer::new(),
            store,
        }
    }
}

#[async_trait]
impl Enricher for DependencyEnricher {
    fn name(&self) -> &'static str {
        "dependency"
    }

    async fn enrich(
        &self,
        resources: &mut Vec<Resource>,
        options: &DiscoveryOptions,
        cancel: &CancellationToken,
    ) -> ScanResult<()> {
        if cancel.is_cancelled() {
            return Err(ScanError::cancelled());
        }

        let report = self.analyzer.analyze(resources);

        // Fold resolved, non-heuristic edges back into the snapshot so the
        // stored rows carry their dependency lists.
        let mut outbound: HashMap<String, Vec<String>> = HashMap::new();
        for edge in &report.edges {
            if edge.relationship == RelationshipKind::SameStack {
                continue;
            }
            outbound
                .entry(edge.source_arn.clone())
                .or_default()
                .push(edge.target_arn.clone());
        }
        for resource in resources.iter_mut() {
            if let Some(targets) = outbound.get(&resource.relationship_key()) {
                let mut targets = targets.clone();
                targets.sort();
                targets.dedup();
                resource.dependencies = targets;
            }
        }

        debug!(
            edges = report.edges.len(),
            unresolved = report.unresolved_references,
            "snapshot enriched with dependencies"
        );

        if options.maps_dependencies() {
            self.store.record_relationships(&report.edges).await?;
            info!(edges = report.edges.len(), "dependency edges persisted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain_inventory::DiscoveryMode;
    use serde_json::json;

    async fn test_store() -> InventoryStore {
        let db = database::sqlite::connect_from_config(database::sqlite::SqliteConfig::in_memory())
            .await
            .unwrap();
        let store = InventoryStore::new(db);
        store.initialize().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_enrich_fills_dependency_lists() {
        let store = test_store().await;
        let enricher = DependencyEnricher::new(store);

        let mut instance = Resource::new("aws", "a1", "i-1", "ec2", "instance", "web");
        instance.configuration = json!({"security_groups": ["sg-1"]});
        let group = Resource::new("aws", "a1", "sg-1", "ec2", "security_group", "sg");
        let mut resources = vec![instance, group];

        enricher
            .enrich(
                &mut resources,
                &DiscoveryOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(resources[0].dependencies, vec!["aws:a1:sg-1".to_string()]);
    }

    #[tokio::test]
    async fn test_deep_mode_persists_edges() {
        let store = test_store().await;
        let enricher = DependencyEnricher::new(store.clone());

        let mut instance = Resource::new("aws", "a1", "i-1", "ec2", "instance", "web");
        instance.configuration = json!({"security_groups": ["sg-1"]});
        let group = Resource::new("aws", "a1", "sg-1", "ec2", "security_group", "sg");
        let mut resources = vec![instance, group];

        // Standard mode enriches in memory only.
        enricher
            .enrich(
                &mut resources,
                &DiscoveryOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(store.get_relationships().await.unwrap().is_empty());

        // Deep mode also writes the edge table.
        enricher
            .enrich(
                &mut resources,
                &DiscoveryOptions::default().with_mode(DiscoveryMode::Deep),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(!store.get_relationships().await.unwrap().is_empty());
    }
}

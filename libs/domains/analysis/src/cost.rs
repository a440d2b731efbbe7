//! Heuristic cost estimation and optimisation generation.
//!
//! Estimates are deliberately coarse (billing-accurate pricing is out of
//! scope): a bundled rate table keyed by provider, service, resource type,
//! region class, and the size descriptor found in the configuration blob.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::models::{CostEstimate, CostReport, Optimization};
use domain_inventory::Resource;

/// Instances stopped longer than this are idle candidates.
const IDLE_DAYS: i64 = 7;

/// Size ranks above this class percentile are downsize candidates.
const OVERSIZED_PERCENTILE: f64 = 0.75;

/// Monthly USD for a baseline (large) compute instance, scaled per size.
const COMPUTE_BASE_MONTHLY: f64 = 70.0;

/// Keys probed in the configuration blob for a size descriptor.
const SIZE_KEYS: &[&str] = &["instance_type", "machine_type", "vm_size", "tier", "instance_class"];

fn size_descriptor(resource: &Resource) -> Option<String> {
    SIZE_KEYS
        .iter()
        .find_map(|key| resource.configuration.get(key))
        .and_then(|v| v.as_str())
        .map(|s| s.to_lowercase())
}

/// Ordinal size class of a descriptor like `m5.2xlarge` or `db.t3.micro`.
fn size_rank(descriptor: &str) -> u32 {
    if descriptor.contains("metal") {
        return 8;
    }
    if let Some(pos) = descriptor.find("xlarge") {
        // "4xlarge" carries a multiplier prefix; bare "xlarge" is rank 4.
        let multiplier: u32 = descriptor[..pos]
            .rsplit(['.', '-'])
            .next()
            .and_then(|p| p.parse().ok())
            .unwrap_or(1);
        return 4 + multiplier.min(4);
    }
    if descriptor.contains("large") {
        3
    } else if descriptor.contains("medium") {
        2
    } else if descriptor.contains("small") {
        1
    } else {
        // micro, nano, unknown tiers
        0
    }
}

/// Monthly multiplier for a size rank, relative to `large`.
fn size_multiplier(rank: u32) -> f64 {
    match rank {
        0 => 0.11,
        1 => 0.22,
        2 => 0.45,
        3 => 1.0,
        4 => 2.0,
        rank => 2.0 * (rank - 3) as f64,
    }
}

fn provider_multiplier(provider: &str) -> f64 {
    match provider {
        "azure" => 1.05,
        "gcp" => 0.95,
        _ => 1.0,
    }
}

fn region_multiplier(region: &str) -> f64 {
    if region.starts_with("eu") || region.starts_with("europe") {
        1.1
    } else if region.starts_with("ap") || region.starts_with("asia") {
        1.15
    } else {
        1.0
    }
}

fn gb_size(resource: &Resource) -> Option<f64> {
    resource
        .configuration
        .get("size_gb")
        .or_else(|| resource.configuration.get("allocated_storage"))
        .and_then(|v| v.as_f64())
}

fn state(resource: &Resource) -> Option<&str> {
    resource
        .configuration
        .get("state")
        .or_else(|| resource.configuration.get("status"))
        .and_then(|v| v.as_str())
}

fn is_compute_instance(r: &Resource) -> bool {
    matches!(r.service.as_str(), "ec2" | "compute" | "vm")
        || r.resource_type.contains("instance")
}

fn is_database(r: &Resource) -> bool {
    matches!(r.service.as_str(), "rds" | "cloudsql" | "sql" | "cosmosdb")
        || r.resource_type.contains("db_instance")
        || r.resource_type.contains("database")
}

fn is_object_store(r: &Resource) -> bool {
    matches!(r.service.as_str(), "s3" | "storage" | "gcs" | "blob")
        || r.resource_type.contains("bucket")
}

fn is_volume(r: &Resource) -> bool {
    r.resource_type.contains("volume") || r.resource_type.contains("disk")
}

fn is_function(r: &Resource) -> bool {
    matches!(r.service.as_str(), "lambda" | "functions" | "cloudfunctions")
        || r.resource_type.contains("function")
}

fn is_load_balancer(r: &Resource) -> bool {
    r.resource_type.contains("load_balancer") || r.service.contains("elb")
}

fn is_free_plumbing(r: &Resource) -> bool {
    r.resource_type.contains("security_group")
        || r.resource_type.contains("vpc")
        || r.resource_type.contains("subnet")
        || r.resource_type.contains("route_table")
}

/// Per-resource monthly estimate and optimisation generation.
pub struct CostAnalyzer;

impl Default for CostAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl CostAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Estimate one resource. `None` means no pricing rule matched.
    pub fn estimate(&self, resource: &Resource) -> Option<f64> {
        let scale = provider_multiplier(&resource.provider) * region_multiplier(&resource.region);

        if is_compute_instance(resource) {
            let rank = size_descriptor(resource)
                .map(|d| size_rank(&d))
                .unwrap_or(2);
            let mut monthly = COMPUTE_BASE_MONTHLY * size_multiplier(rank) * scale;
            // A stopped instance still pays for its storage, not compute.
            if state(resource) == Some("stopped") {
                monthly *= 0.25;
            }
            return Some(monthly);
        }
        if is_database(resource) {
            let rank = size_descriptor(resource)
                .map(|d| size_rank(&d))
                .unwrap_or(2);
            let storage = gb_size(resource).unwrap_or(20.0) * 0.115;
            return Some(COMPUTE_BASE_MONTHLY * 1.5 * size_multiplier(rank) * scale + storage);
        }
        if is_volume(resource) {
            return Some(gb_size(resource).unwrap_or(8.0) * 0.10 * scale);
        }
        if is_object_store(resource) {
            return gb_size(resource).map(|gb| gb * 0.023 * scale);
        }
        if is_function(resource) {
            let memory_mb = resource
                .configuration
                .get("memory_mb")
                .and_then(|v| v.as_f64())
                .unwrap_or(128.0);
            return Some((memory_mb / 128.0) * 1.9 * scale);
        }
        if is_load_balancer(resource) {
            return Some(18.0 * scale);
        }
        if is_free_plumbing(resource) {
            return Some(0.0);
        }

        None
    }

    pub fn analyze(&self, resources: &[Resource]) -> CostReport {
        let (estimates, unpriced) = self.estimate_batch(resources);
        let optimizations = self.optimizations(resources);
        self.assemble(estimates, unpriced, optimizations)
    }

    /// Estimate one batch. Returns the estimates plus the ids no pricing
    /// rule matched.
    pub fn estimate_batch(&self, resources: &[Resource]) -> (Vec<CostEstimate>, Vec<String>) {
        let mut estimates = Vec::with_capacity(resources.len());
        let mut unpriced = Vec::new();

        for resource in resources {
            let monthly = match self.estimate(resource) {
                Some(monthly) => monthly,
                None => {
                    unpriced.push(resource.storage_id());
                    0.0
                }
            };
            estimates.push(CostEstimate {
                resource_id: resource.storage_id(),
                service: resource.service.clone(),
                monthly_cost: monthly,
            });
        }

        (estimates, unpriced)
    }

    /// Roll batched estimates and full-snapshot optimisations into a report.
    ///
    /// Optimisations always see the whole snapshot: the oversized check is
    /// percentile-based within a peer class, which a single batch cannot
    /// answer.
    pub fn assemble(
        &self,
        estimates: Vec<CostEstimate>,
        unpriced: Vec<String>,
        optimizations: Vec<Optimization>,
    ) -> CostReport {
        let mut by_service: HashMap<String, f64> = HashMap::new();
        let mut total = 0.0;
        for estimate in &estimates {
            total += estimate.monthly_cost;
            *by_service.entry(estimate.service.clone()).or_default() += estimate.monthly_cost;
        }

        debug!(
            total_monthly = total,
            unpriced = unpriced.len(),
            optimizations = optimizations.len(),
            "cost estimation complete"
        );

        CostReport {
            estimates,
            total_monthly_cost: total,
            cost_by_service: by_service,
            unpriced_resources: unpriced,
            optimizations,
            generated_at: Utc::now(),
        }
    }

    /// Generate optimisation suggestions over a full snapshot.
    pub fn optimizations(&self, resources: &[Resource]) -> Vec<Optimization> {
        let mut out = Vec::new();

        // Idle candidates: instances stopped for more than a week.
        for resource in resources {
            if !is_compute_instance(resource) || state(resource) != Some("stopped") {
                continue;
            }
            let stopped_long_enough = resource
                .updated_at
                .or(resource.created_at)
                .is_some_and(|t| Utc::now() - t > Duration::days(IDLE_DAYS));
            if !stopped_long_enough {
                continue;
            }
            let monthly = self.estimate(resource).unwrap_or(0.0);
            out.push(Optimization {
                title: "Terminate or rightsize idle instance".to_string(),
                description: format!(
                    "{} has been stopped for more than {IDLE_DAYS} days",
                    resource.name
                ),
                resource_ids: vec![resource.storage_id()],
                potential_savings: monthly,
                savings_percent: 100.0,
            });
        }

        // Oversized candidates: size rank above the class percentile.
        let mut classes: HashMap<(String, String), Vec<(String, u32, f64)>> = HashMap::new();
        for resource in resources {
            let Some(descriptor) = size_descriptor(resource) else {
                continue;
            };
            let monthly = self.estimate(resource).unwrap_or(0.0);
            classes
                .entry((resource.service.clone(), resource.resource_type.clone()))
                .or_default()
                .push((resource.storage_id(), size_rank(&descriptor), monthly));
        }
        for ((service, resource_type), mut members) in classes {
            if members.len() < 4 {
                continue;
            }
            members.sort_by_key(|(_, rank, _)| *rank);
            let threshold_index =
                ((members.len() as f64 * OVERSIZED_PERCENTILE).floor() as usize).min(members.len() - 1);
            let threshold = members[threshold_index].1;
            for (id, rank, monthly) in &members {
                if *rank > threshold {
                    out.push(Optimization {
                        title: "Downsize oversized resource".to_string(),
                        description: format!(
                            "size class sits above the 75th percentile of its {service}/{resource_type} peers"
                        ),
                        resource_ids: vec![id.clone()],
                        potential_savings: monthly * 0.5,
                        savings_percent: 50.0,
                    });
                }
            }
        }

        // Unattached storage.
        for resource in resources {
            if !is_volume(resource) {
                continue;
            }
            let attached = resource
                .configuration
                .get("attached")
                .and_then(|v| v.as_bool())
                .unwrap_or_else(|| resource.configuration.get("instance_id").is_some());
            if attached {
                continue;
            }
            let monthly = self.estimate(resource).unwrap_or(0.0);
            out.push(Optimization {
                title: "Delete unattached volume".to_string(),
                description: format!("{} is not attached to any instance", resource.name),
                resource_ids: vec![resource.storage_id()],
                potential_savings: monthly,
                savings_percent: 100.0,
            });
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn instance(id: &str, instance_type: &str) -> Resource {
        let mut r = Resource::new("aws", "a1", id, "ec2", "instance", id);
        r.region = "us-east-1".to_string();
        r.configuration = json!({"instance_type": instance_type, "state": "running"});
        r
    }

    #[test]
    fn test_size_ranks() {
        assert_eq!(size_rank("t3.micro"), 0);
        assert_eq!(size_rank("t3.small"), 1);
        assert_eq!(size_rank("m5.medium"), 2);
        assert_eq!(size_rank("m5.large"), 3);
        assert_eq!(size_rank("m5.xlarge"), 5);
        assert_eq!(size_rank("m5.2xlarge"), 6);
        assert_eq!(size_rank("c5.metal"), 8);
    }

    #[test]
    fn test_compute_estimate_scales_with_size() {
        let analyzer = CostAnalyzer::new();
        let small = analyzer.estimate(&instance("i-1", "t3.small")).unwrap();
        let large = analyzer.estimate(&instance("i-2", "m5.large")).unwrap();
        let xlarge = analyzer.estimate(&instance("i-3", "m5.xlarge")).unwrap();

        assert!(small < large);
        assert!(large < xlarge);
        assert!((large - COMPUTE_BASE_MONTHLY).abs() < 1e-9);
    }

    #[test]
    fn test_region_and_provider_multipliers() {
        let analyzer = CostAnalyzer::new();

        let mut eu = instance("i-1", "m5.large");
        eu.region = "eu-west-1".to_string();
        assert!(analyzer.estimate(&eu).unwrap() > COMPUTE_BASE_MONTHLY);

        let mut gcp = instance("i-2", "m5.large");
        gcp.provider = "gcp".to_string();
        assert!(analyzer.estimate(&gcp).unwrap() < COMPUTE_BASE_MONTHLY);
    }

    #[test]
    fn test_unmatched_resources_are_flagged() {
        let mut exotic = Resource::new("aws", "a1", "q-1", "braket", "quantum_task", "q");
        exotic.configuration = json!({});

        let report = CostAnalyzer::new().analyze(&[exotic]);
        assert_eq!(report.total_monthly_cost, 0.0);
        assert_eq!(report.unpriced_resources.len(), 1);
        assert_eq!(report.estimates[0].monthly_cost, 0.0);
    }

    #[test]
    fn test_free_plumbing_is_priced_not_flagged() {
        let group = Resource::new("aws", "a1", "sg-1", "ec2", "security_group", "sg");
        let report = CostAnalyzer::new().analyze(&[group]);
        assert!(report.unpriced_resources.is_empty());
        assert_eq!(report.total_monthly_cost, 0.0);
    }

    #[test]
    fn test_idle_instance_optimization() {
        let mut idle = instance("i-1", "m5.large");
        idle.configuration = json!({"instance_type": "m5.large", "state": "stopped"});
        idle.updated_at = Some(Utc::now() - Duration::days(10));

        let mut recent = instance("i-2", "m5.large");
        recent.configuration = json!({"instance_type": "m5.large", "state": "stopped"});
        recent.updated_at = Some(Utc::now() - Duration::days(2));

        let report = CostAnalyzer::new().analyze(&[idle.clone(), recent]);

        let idle_opts: Vec<_> = report
            .optimizations
            .iter()
            .filter(|o| o.title.contains("idle"))
            .collect();
        assert_eq!(idle_opts.len(), 1);
        assert_eq!(idle_opts[0].resource_ids, vec![idle.storage_id()]);
        assert_eq!(idle_opts[0].savings_percent, 100.0);
        assert!(idle_opts[0].potential_savings > 0.0);
    }

    #[test]
    fn test_unattached_volume_optimization() {
        let mut volume = Resource::new("aws", "a1", "vol-1", "ebs", "volume", "orphan");
        volume.configuration = json!({"size_gb": 100, "attached": false});

        let report = CostAnalyzer::new().analyze(&[volume]);
        let delete: Vec<_> = report
            .optimizations
            .iter()
            .filter(|o| o.title.contains("unattached"))
            .collect();
        assert_eq!(delete.len(), 1);
        assert!((delete[0].potential_savings - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_oversized_detection_needs_a_peer_group() {
        let fleet = vec![
            instance("i-1", "t3.small"),
            instance("i-2", "t3.small"),
            instance("i-3", "t3.medium"),
            instance("i-4", "t3.medium"),
            instance("i-5", "m5.4xlarge"),
        ];

        let report = CostAnalyzer::new().analyze(&fleet);
        let downsizes: Vec<_> = report
            .optimizations
            .iter()
            .filter(|o| o.title.contains("Downsize"))
            .collect();
        assert_eq!(downsizes.len(), 1);
        assert!(downsizes[0].resource_ids[0].contains("i-5"));
        assert_eq!(downsizes[0].savings_percent, 50.0);
    }
}

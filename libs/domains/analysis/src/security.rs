//! Rule-driven security posture evaluation.

use chrono::{Duration, Utc};
use tracing::debug;

use crate::models::{Finding, SecurityReport, Severity};
use domain_inventory::Resource;

/// Risk score ceiling.
const RISK_CAP: u32 = 100;

/// Access keys older than this are considered stale.
const STALE_KEY_DAYS: i64 = 90;

/// One entry of the data-driven rule catalogue.
pub struct SecurityRule {
    pub name: &'static str,
    pub severity: Severity,
    pub title: &'static str,
    pub recommendation: &'static str,
    pub matches: fn(&Resource) -> bool,
}

fn is_object_store(r: &Resource) -> bool {
    matches!(r.service.as_str(), "s3" | "storage" | "gcs" | "blob")
        || r.resource_type.contains("bucket")
}

fn is_database(r: &Resource) -> bool {
    matches!(r.service.as_str(), "rds" | "cloudsql" | "sql" | "cosmosdb" | "dynamodb")
        || r.resource_type.contains("database")
        || r.resource_type.contains("db_instance")
}

fn is_compute_instance(r: &Resource) -> bool {
    matches!(r.service.as_str(), "ec2" | "compute" | "vm")
        || r.resource_type.contains("instance")
}

fn is_security_group(r: &Resource) -> bool {
    r.resource_type.contains("security_group") || r.resource_type.contains("firewall")
}

fn is_access_key(r: &Resource) -> bool {
    r.resource_type.contains("access_key")
}

/// The bundled catalogue.
pub fn default_rules() -> Vec<SecurityRule> {
    vec![
        SecurityRule {
            name: "public_storage_bucket",
            severity: Severity::Critical,
            title: "Object store open to the public",
            recommendation: "Block public access and serve content through a CDN or signed URLs",
            matches: |r| is_object_store(r) && r.public_access,
        },
        SecurityRule {
            name: "unencrypted_database",
            severity: Severity::High,
            title: "Database instance without encryption at rest",
            recommendation: "Enable storage encryption and rotate credentials after migration",
            matches: |r| is_database(r) && !r.encrypted,
        },
        SecurityRule {
            name: "open_security_group",
            severity: Severity::Critical,
            title: "Security group allows ingress from 0.0.0.0/0",
            recommendation: "Restrict ingress to known CIDR ranges or a bastion host",
            matches: |r| is_security_group(r) && r.configuration.to_string().contains("0.0.0.0/0"),
        },
        SecurityRule {
            name: "instance_without_encryption",
            severity: Severity::Medium,
            title: "Compute instance with unencrypted root volume",
            recommendation: "Rebuild the instance from an encrypted snapshot",
            matches: |r| is_compute_instance(r) && !r.encrypted,
        },
        SecurityRule {
            name: "missing_required_tags",
            severity: Severity::Low,
            title: "Resource missing Name or Environment tag",
            recommendation: "Apply the tagging policy so ownership and lifecycle are traceable",
            matches: |r| r.tag("Name").is_none() || r.tag("Environment").is_none(),
        },
        SecurityRule {
            name: "stale_access_key",
            severity: Severity::Medium,
            title: "Access key older than 90 days",
            recommendation: "Rotate the key and adopt short-lived credentials",
            matches: |r| {
                is_access_key(r)
                    && r.created_at
                        .is_some_and(|created| Utc::now() - created > Duration::days(STALE_KEY_DAYS))
            },
        },
    ]
}

/// Evaluates the rule catalogue over a snapshot.
pub struct SecurityAnalyzer {
    rules: Vec<SecurityRule>,
}

impl Default for SecurityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityAnalyzer {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Replace the catalogue (tests and custom policy packs).
    pub fn with_rules(mut self, rules: Vec<SecurityRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn analyze(&self, resources: &[Resource]) -> SecurityReport {
        let findings = self.evaluate(resources);
        self.score(findings, !resources.is_empty())
    }

    /// Match the catalogue against one batch of resources.
    pub fn evaluate(&self, resources: &[Resource]) -> Vec<Finding> {
        let mut findings = Vec::new();

        for resource in resources {
            for rule in &self.rules {
                if (rule.matches)(resource) {
                    findings.push(Finding {
                        id: format!("{}:{}", rule.name, resource.storage_id()),
                        rule: rule.name.to_string(),
                        severity: rule.severity,
                        resource_id: resource.storage_id(),
                        title: rule.title.to_string(),
                        description: format!(
                            "{} ({} {} in {})",
                            rule.title, resource.service, resource.resource_type, resource.region
                        ),
                        recommendation: rule.recommendation.to_string(),
                    });
                }
            }
        }

        findings
    }

    /// Turn accumulated findings into a scored report.
    pub fn score(&self, mut findings: Vec<Finding>, any_evaluated: bool) -> SecurityReport {
        findings.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.id.cmp(&b.id)));

        let risk_score = findings
            .iter()
            .map(|f| f.severity.weight())
            .sum::<u32>()
            .min(RISK_CAP);

        let rules_evaluated = if any_evaluated { self.rules.len() } else { 0 };
        let failed_rules = self
            .rules
            .iter()
            .filter(|rule| findings.iter().any(|f| f.rule == rule.name))
            .count();
        let compliance_score = if rules_evaluated == 0 {
            100.0
        } else {
            100.0 * (1.0 - failed_rules as f64 / rules_evaluated as f64)
        };

        debug!(
            findings = findings.len(),
            risk_score, compliance_score, "security evaluation complete"
        );

        SecurityReport {
            findings,
            risk_score,
            compliance_score,
            rules_evaluated,
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket(id: &str, public: bool) -> Resource {
        let mut r = Resource::new("aws", "a1", id, "s3", "bucket", id);
        r.public_access = public;
        r.encrypted = true;
        r.tags.insert("Name".into(), id.into());
        r.tags.insert("Environment".into(), "prod".into());
        r
    }

    #[test]
    fn test_public_bucket_matches_only_bucket_rules() {
        let mut target = bucket("assets", true);
        target.encrypted = false;

        let report = SecurityAnalyzer::new().analyze(&[target]);

        let rules: Vec<_> = report.findings.iter().map(|f| f.rule.as_str()).collect();
        assert!(rules.contains(&"public_storage_bucket"));
        // Wrong service: the database rule must not fire on a bucket.
        assert!(!rules.contains(&"unencrypted_database"));

        let critical = report
            .findings
            .iter()
            .find(|f| f.rule == "public_storage_bucket")
            .unwrap();
        assert_eq!(critical.severity, Severity::Critical);
    }

    #[test]
    fn test_open_security_group_detection() {
        let mut group = Resource::new("aws", "a1", "sg-1", "ec2", "security_group", "wide-open");
        group.encrypted = true;
        group.tags.insert("Name".into(), "sg".into());
        group.tags.insert("Environment".into(), "prod".into());
        group.configuration = json!({
            "ingress_rules": [{"cidr": "0.0.0.0/0", "port": 22}]
        });

        let report = SecurityAnalyzer::new().analyze(&[group]);
        assert!(report.findings.iter().any(|f| f.rule == "open_security_group"));
    }

    #[test]
    fn test_stale_access_key_needs_age() {
        let mut fresh = Resource::new("aws", "a1", "AKIA1", "iam", "access_key", "deploy");
        fresh.encrypted = true;
        fresh.created_at = Some(Utc::now() - Duration::days(10));
        fresh.tags.insert("Name".into(), "key".into());
        fresh.tags.insert("Environment".into(), "prod".into());

        let mut stale = fresh.clone();
        stale.id = "AKIA2".into();
        stale.created_at = Some(Utc::now() - Duration::days(120));

        let report = SecurityAnalyzer::new().analyze(&[fresh, stale]);
        let stale_findings: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.rule == "stale_access_key")
            .collect();
        assert_eq!(stale_findings.len(), 1);
        assert!(stale_findings[0].resource_id.contains("AKIA2"));
    }

    #[test]
    fn test_risk_score_is_capped() {
        let buckets: Vec<Resource> = (0..20).map(|i| bucket(&format!("b-{i}"), true)).collect();
        let report = SecurityAnalyzer::new().analyze(&buckets);
        assert_eq!(report.risk_score, 100);
    }

    #[test]
    fn test_risk_increases_with_critical_finding() {
        let clean = bucket("private", false);
        let baseline = SecurityAnalyzer::new().analyze(&[clean.clone()]);

        let offender = bucket("public", true);
        let worse = SecurityAnalyzer::new().analyze(&[clean, offender]);

        assert!(worse.risk_score > baseline.risk_score);
    }

    #[test]
    fn test_compliance_improves_when_matched_rule_removed() {
        let mut untagged = bucket("assets", true);
        untagged.tags.clear();

        let full = SecurityAnalyzer::new().analyze(std::slice::from_ref(&untagged));

        let without_tag_rule = SecurityAnalyzer::new().with_rules(
            default_rules()
                .into_iter()
                .filter(|r| r.name != "missing_required_tags")
                .collect(),
        );
        let reduced = without_tag_rule.analyze(&[untagged]);

        assert!(reduced.compliance_score > full.compliance_score);
    }

    #[test]
    fn test_empty_snapshot_is_fully_compliant() {
        let report = SecurityAnalyzer::new().analyze(&[]);
        assert_eq!(report.rules_evaluated, 0);
        assert_eq!(report.compliance_score, 100.0);
        assert_eq!(report.risk_score, 0);
    }
}

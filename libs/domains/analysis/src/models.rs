//! Report models for the analysis pipeline.

use chrono::{DateTime, Utc};
use domain_inventory::Dependency;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{Display, EnumString};
use tracing::debug;

/// Finding severity, ordered worst-first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    /// Weight used in the risk score.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Critical => 10,
            Self::High => 5,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

/// One matched security rule on one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub rule: String,
    pub severity: Severity,
    pub resource_id: String,
    pub title: String,
    pub description: String,
    pub recommendation: String,
}

/// A cost-saving suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Optimization {
    pub title: String,
    pub description: String,
    pub resource_ids: Vec<String>,
    /// USD per month
    pub potential_savings: f64,
    /// Share of the affected resources' own monthly cost
    pub savings_percent: f64,
}

/// Graph-level statistics for the dependency report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_resources: usize,
    pub total_dependencies: usize,
    /// Distinct simple cycles, capped; at the cap the true count is >= this.
    pub cycles: usize,
    /// Connected components of the undirected projection.
    pub islands: usize,
    /// Edge count of the longest path after cycle-breaking.
    pub max_depth: usize,
}

/// Output of the dependency analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub edges: Vec<Dependency>,
    pub stats: GraphStats,
    /// References that could not be resolved against the snapshot.
    pub unresolved_references: usize,
    pub generated_at: DateTime<Utc>,
}

/// Output of the security analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityReport {
    pub findings: Vec<Finding>,
    /// Severity-weighted sum, capped at 100.
    pub risk_score: u32,
    /// 100 * (1 - failed_rules / rules_evaluated); 100 with nothing evaluated.
    pub compliance_score: f64,
    pub rules_evaluated: usize,
    pub generated_at: DateTime<Utc>,
}

/// Per-resource cost estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    pub resource_id: String,
    pub service: String,
    pub monthly_cost: f64,
}

/// Output of the cost analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostReport {
    pub estimates: Vec<CostEstimate>,
    pub total_monthly_cost: f64,
    pub cost_by_service: HashMap<String, f64>,
    /// Resources no pricing rule matched; estimated at 0.
    pub unpriced_resources: Vec<String>,
    pub optimizations: Vec<Optimization>,
    pub generated_at: DateTime<Utc>,
}

impl CostReport {
    pub fn potential_savings(&self) -> f64 {
        self.optimizations.iter().map(|o| o.potential_savings).sum()
    }
}

/// Roll-up totals across the sub-reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_resources: usize,
    pub total_dependencies: usize,
    pub risk_score: u32,
    pub compliance_score: f64,
    pub total_monthly_cost: f64,
    pub potential_savings: f64,
}

/// Composite report. A failed sub-analyzer leaves its report absent and
/// sets `partial`; disabled analyzers are absent without marking partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComprehensiveReport {
    pub summary: AnalysisSummary,
    pub dependency: Option<DependencyReport>,
    pub security: Option<SecurityReport>,
    pub cost: Option<CostReport>,
    pub partial: bool,
    pub generated_at: DateTime<Utc>,
}

/// Lifecycle of one sub-analyzer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AnalyzerPhase {
    Idle,
    Fetching,
    Batching,
    Analyzing,
    Aggregating,
    Done,
    Failed,
}

/// Phase tracker that narrates transitions into the log stream.
pub(crate) struct PhaseTracker {
    analyzer: &'static str,
    phase: AnalyzerPhase,
}

impl PhaseTracker {
    pub fn new(analyzer: &'static str) -> Self {
        Self {
            analyzer,
            phase: AnalyzerPhase::Idle,
        }
    }

    pub fn advance(&mut self, phase: AnalyzerPhase) {
        debug!(analyzer = self.analyzer, from = %self.phase, to = %phase, "analyzer phase");
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_weights() {
        assert_eq!(Severity::Critical.weight(), 10);
        assert_eq!(Severity::High.weight(), 5);
        assert_eq!(Severity::Medium.weight(), 2);
        assert_eq!(Severity::Low.weight(), 1);
    }

    #[test]
    fn test_severity_orders_worst_first() {
        let mut severities = vec![Severity::Low, Severity::Critical, Severity::Medium];
        severities.sort();
        assert_eq!(severities[0], Severity::Critical);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(AnalyzerPhase::Analyzing.to_string(), "analyzing");
    }
}

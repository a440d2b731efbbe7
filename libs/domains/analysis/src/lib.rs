//! Analysis Domain
//!
//! Three analytical passes over the stored inventory, composed by an
//! orchestrator with a shared TTL-cached snapshot:
//! - dependency graph construction with cycle and island detection
//! - rule-driven security posture evaluation with severity scoring
//! - heuristic cost estimation with optimisation suggestions
//!
//! Analyzers borrow resource snapshots and never mutate them; their
//! outputs are transient, rebuilt on demand and cached with a TTL.
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_analysis::{AnalysisOptions, AnalysisOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = AnalysisOrchestrator::new(store, cache, AnalysisOptions::default());
//! let report = orchestrator.analyze_all(CancellationToken::new()).await?;
//! println!(
//!     "risk {} / compliance {:.0}",
//!     report.summary.risk_score, report.summary.compliance_score
//! );
//! ```

pub mod config;
pub mod cost;
pub mod dependency;
pub mod models;
pub mod orchestrator;
pub mod security;

pub use config::AnalysisOptions;
pub use cost::CostAnalyzer;
pub use dependency::DependencyAnalyzer;
pub use models::{
    AnalysisSummary, AnalyzerPhase, ComprehensiveReport, CostEstimate, CostReport,
    DependencyReport, Finding, GraphStats, Optimization, SecurityReport, Severity,
};
pub use orchestrator::AnalysisOrchestrator;
pub use security::{SecurityAnalyzer, SecurityRule};

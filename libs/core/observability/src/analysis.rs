//! Analysis-pipeline metrics.

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Analysis metrics recorder
pub struct AnalysisMetrics;

impl AnalysisMetrics {
    /// Count a completed analysis pass by outcome. Durations are recorded
    /// separately by [`AnalysisTimer`].
    pub fn record_pass(analyzer: &str, outcome: &str) {
        counter!(
            "analysis_runs_total",
            "analyzer" => analyzer.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }

    /// Set the finding count from the most recent security pass
    pub fn set_findings(severity: &str, count: usize) {
        gauge!("analysis_findings_total", "severity" => severity.to_string()).set(count as f64);
    }
}

/// Records an analysis pass duration on drop, so every exit path of a
/// pass (success, failure, retry exhaustion) is timed.
pub struct AnalysisTimer {
    analyzer: &'static str,
    started: Instant,
}

impl AnalysisTimer {
    pub fn new(analyzer: &'static str) -> Self {
        Self {
            analyzer,
            started: Instant::now(),
        }
    }
}

impl Drop for AnalysisTimer {
    fn drop(&mut self) {
        histogram!("analysis_duration_seconds", "analyzer" => self.analyzer)
            .record(self.started.elapsed().as_secs_f64());
    }
}

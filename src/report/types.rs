use crate::metrics::{MetricsSnapshot, ThresholdResult};
use crate::runner::state::IterationTally;
use serde::{Deserialize, Serialize};

/// Load test results for report generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResults {
    pub run_id: String,
    pub scenario: String,
    pub workflow: String,
    pub base_url: String,
    pub started_at: String,
    pub duration_ms: u64,
    pub max_vus: u32,
    pub iterations: IterationTally,
    pub failed_requests: u64,
    pub metrics: MetricsSnapshot,
    pub thresholds: Vec<ThresholdResult>,
    pub generated_at: String,
}

impl RunResults {
    pub fn thresholds_passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.passed)
    }

    pub fn crossed_thresholds(&self) -> impl Iterator<Item = &ThresholdResult> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

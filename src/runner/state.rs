use crate::error::FailureKind;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Outcome of one executed or skipped workflow step.
///
/// Written once by the workflow and handed to the recorder; never mutated
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step_name: String,
    /// Trend the latency is recorded under
    pub metric: String,
    /// 0 when no response was received
    pub http_status: u16,
    pub latency_ms: u64,
    /// Status was in the step's expected set
    pub success: bool,
    pub failure: Option<FailureKind>,
}

impl StepOutcome {
    /// Outcome for a step whose dependency was missing
    pub fn skipped(step_name: &str, metric: &str) -> Self {
        Self {
            step_name: step_name.to_string(),
            metric: metric.to_string(),
            http_status: 0,
            latency_ms: 0,
            success: false,
            failure: Some(FailureKind::DependencyUnavailable),
        }
    }

    /// Whether a request went out for this step
    pub fn issued(&self) -> bool {
        self.failure != Some(FailureKind::DependencyUnavailable)
    }
}

/// How far an iteration progressed through the workflow
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Init,
    Registered,
    LoggedIn,
    InteractionCreated,
    CitationsGenerated,
    ResponseGenerated,
    Listed,
    FollowupGenerated,
    InteractionDeleted,
    SourcesDeleted,
    Cleaned,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "init",
            Phase::Registered => "registered",
            Phase::LoggedIn => "logged_in",
            Phase::InteractionCreated => "interaction_created",
            Phase::CitationsGenerated => "citations_generated",
            Phase::ResponseGenerated => "response_generated",
            Phase::Listed => "listed",
            Phase::FollowupGenerated => "followup_generated",
            Phase::InteractionDeleted => "interaction_deleted",
            Phase::SourcesDeleted => "sources_deleted",
            Phase::Cleaned => "cleaned",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IterationStatus {
    Running,
    Passed,
    Failed,
    PartiallyPassed { passed: u32, failed: u32 },
}

/// Tally for a single workflow iteration of one virtual user
#[derive(Debug, Clone)]
pub struct IterationState {
    pub vu: u32,
    pub iteration: u64,
    pub status: IterationStatus,
    pub phase: Phase,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Every failure raised, including soft validation failures
    pub failures: u32,
    pub started_at: Instant,
    pub duration_ms: Option<u64>,
}

impl IterationState {
    pub fn new(vu: u32, iteration: u64) -> Self {
        Self {
            vu,
            iteration,
            status: IterationStatus::Running,
            phase: Phase::Init,
            passed: 0,
            failed: 0,
            skipped: 0,
            failures: 0,
            started_at: Instant::now(),
            duration_ms: None,
        }
    }

    pub fn record(&mut self, outcome: &StepOutcome) {
        if !outcome.issued() {
            self.skipped += 1;
        } else if outcome.success {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    /// Move forward to `phase`; phases never go backwards
    pub fn advance(&mut self, phase: Phase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }

    pub fn finish(&mut self) {
        self.duration_ms = Some(self.started_at.elapsed().as_millis() as u64);

        let failed = self.failed + self.skipped;
        self.status = if failed == 0 && self.failures == 0 {
            IterationStatus::Passed
        } else if self.passed == 0 {
            IterationStatus::Failed
        } else {
            IterationStatus::PartiallyPassed {
                passed: self.passed,
                failed,
            }
        };
    }

    /// Serialize state for reporting (without Instant which isn't serializable)
    pub fn to_report(&self) -> IterationReport {
        IterationReport {
            vu: self.vu,
            iteration: self.iteration,
            status: self.status.clone(),
            phase: self.phase,
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
            failures: self.failures,
            duration_ms: self.duration_ms.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IterationReport {
    pub vu: u32,
    pub iteration: u64,
    pub status: IterationStatus,
    pub phase: Phase,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub failures: u32,
    pub duration_ms: u64,
}

/// Iteration counts across a whole run
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IterationTally {
    pub total: u64,
    pub passed: u64,
    pub partial: u64,
    pub failed: u64,
    /// Iterations cut off at the end of the graceful ramp-down
    pub interrupted: u64,
}

impl IterationTally {
    pub fn add(&mut self, report: &IterationReport) {
        self.total += 1;
        match report.status {
            IterationStatus::Passed => self.passed += 1,
            IterationStatus::PartiallyPassed { .. } => self.partial += 1,
            IterationStatus::Failed | IterationStatus::Running => self.failed += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool, failure: Option<FailureKind>) -> StepOutcome {
        StepOutcome {
            step_name: "login".to_string(),
            metric: "login_latency".to_string(),
            http_status: if success { 200 } else { 500 },
            latency_ms: 12,
            success,
            failure,
        }
    }

    #[test]
    fn test_skipped_outcome_is_not_issued() {
        let skipped = StepOutcome::skipped("delete_user", "delete_user_latency");
        assert!(!skipped.issued());
        assert!(!skipped.success);
        assert_eq!(skipped.http_status, 0);
        assert!(outcome(false, Some(FailureKind::HttpStatus)).issued());
    }

    #[test]
    fn test_phase_never_goes_backwards() {
        let mut state = IterationState::new(1, 0);
        state.advance(Phase::LoggedIn);
        state.advance(Phase::Registered);
        assert_eq!(state.phase, Phase::LoggedIn);
    }

    #[test]
    fn test_finish_status() {
        let mut state = IterationState::new(1, 0);
        state.record(&outcome(true, None));
        state.finish();
        assert_eq!(state.status, IterationStatus::Passed);

        let mut state = IterationState::new(1, 1);
        state.record(&outcome(true, None));
        state.record(&outcome(false, Some(FailureKind::HttpStatus)));
        state.record(&StepOutcome::skipped("x", "y"));
        state.finish();
        assert_eq!(
            state.status,
            IterationStatus::PartiallyPassed {
                passed: 1,
                failed: 2
            }
        );

        let mut state = IterationState::new(1, 2);
        state.record(&outcome(false, Some(FailureKind::Transport)));
        state.finish();
        assert_eq!(state.status, IterationStatus::Failed);
        assert!(state.to_report().duration_ms < 1000);
    }

    #[test]
    fn test_soft_failure_makes_iteration_partial() {
        let mut state = IterationState::new(1, 0);
        state.record(&outcome(true, Some(FailureKind::Validation)));
        state.record_failure();
        state.finish();
        assert!(matches!(
            state.status,
            IterationStatus::PartiallyPassed { .. }
        ));
    }

    #[test]
    fn test_tally() {
        let mut tally = IterationTally::default();
        let mut state = IterationState::new(1, 0);
        state.finish();
        tally.add(&state.to_report());
        assert_eq!(tally.total, 1);
        assert_eq!(tally.passed, 1);
    }
}

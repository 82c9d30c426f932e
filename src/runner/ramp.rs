//! Ramp profile: how many virtual users should be active at a given time

use crate::parser::types::Stage;
use std::time::Duration;

/// Target VU count `elapsed` into the schedule.
///
/// Each stage moves linearly from the previous target (or `start_vus` for the
/// first stage) to its own target over its duration. Past the end of the
/// schedule the last target holds.
pub fn target_at(start_vus: u32, stages: &[Stage], elapsed: Duration) -> u32 {
    let mut from = start_vus;
    let mut stage_start = Duration::ZERO;

    for stage in stages {
        let stage_end = stage_start + stage.duration;
        if elapsed < stage_end {
            let progress =
                (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let delta = stage.target as f64 - from as f64;
            return (from as f64 + delta * progress).round().max(0.0) as u32;
        }
        from = stage.target;
        stage_start = stage_end;
    }

    from
}

/// Position in the schedule, for progress display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePosition {
    pub index: usize,
    pub target: u32,
}

/// Which stage is running `elapsed` into the schedule; `None` once it is over
pub fn stage_at(stages: &[Stage], elapsed: Duration) -> Option<StagePosition> {
    let mut stage_end = Duration::ZERO;
    for (index, stage) in stages.iter().enumerate() {
        stage_end += stage.duration;
        if elapsed < stage_end {
            return Some(StagePosition {
                index,
                target: stage.target,
            });
        }
    }
    None
}

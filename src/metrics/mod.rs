pub mod recorder;
pub mod thresholds;

pub use recorder::{MetricsRegistry, MetricsSnapshot, Recorder};
pub use thresholds::{evaluate_all, Threshold, ThresholdResult};

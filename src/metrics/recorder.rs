use crate::runner::state::StepOutcome;
use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Latency of every issued request, regardless of step
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
/// Pass/fail of every recorded step outcome
pub const STEP_SUCCESS_RATE: &str = "step_success_rate";
/// Whether a streaming step delivered all four lifecycle events
pub const SSE_LIFECYCLE_RATE: &str = "sse_lifecycle_rate";
/// Wall time of one full iteration
pub const ITERATION_DURATION: &str = "iteration_duration";
pub const FAILED_REQUESTS: &str = "failed_requests";
pub const ITERATIONS: &str = "iterations";

/// Metrics sink handed to the workflow.
///
/// Implementations are shared by every virtual user and must accept
/// concurrent, unordered writes.
pub trait Recorder: Send + Sync {
    fn record_latency(&self, metric: &str, millis: u64);

    fn increment_failure(&self, count: u64);

    fn record_rate(&self, metric: &str, passed: bool);

    /// Record one step's outcome: its latency (when a request was issued)
    /// and its contribution to the step success rate.
    fn record_step(&self, outcome: &StepOutcome) {
        if outcome.issued() {
            self.record_latency(&outcome.metric, outcome.latency_ms);
        }
        self.record_rate(STEP_SUCCESS_RATE, outcome.success);
    }
}

#[derive(Default)]
struct RateCounter {
    passes: AtomicU64,
    fails: AtomicU64,
}

/// In-memory time-series store backing a load test run
pub struct MetricsRegistry {
    trends: RwLock<HashMap<String, Arc<Mutex<Histogram<u64>>>>>,
    rates: RwLock<HashMap<String, Arc<RateCounter>>>,
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

/// Highest latency the histograms track (1h), larger samples are clamped
const MAX_TRACKABLE_MS: u64 = 3_600_000;

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            trends: RwLock::new(HashMap::new()),
            rates: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
        }
    }

    fn trend(&self, name: &str) -> Option<Arc<Mutex<Histogram<u64>>>> {
        if let Some(existing) = self.trends.read().get(name) {
            return Some(existing.clone());
        }

        let mut trends = self.trends.write();
        if let Some(existing) = trends.get(name) {
            return Some(existing.clone());
        }
        match Histogram::new_with_bounds(1, MAX_TRACKABLE_MS, 3) {
            Ok(histogram) => {
                let handle = Arc::new(Mutex::new(histogram));
                trends.insert(name.to_string(), handle.clone());
                Some(handle)
            }
            Err(e) => {
                log::error!("Failed to create histogram for {}: {}", name, e);
                None
            }
        }
    }

    fn rate(&self, name: &str) -> Arc<RateCounter> {
        if let Some(existing) = self.rates.read().get(name) {
            return existing.clone();
        }
        self.rates
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    fn counter(&self, name: &str) -> Arc<AtomicU64> {
        if let Some(existing) = self.counters.read().get(name) {
            return existing.clone();
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    pub fn add_to_counter(&self, name: &str, count: u64) {
        self.counter(name).fetch_add(count, Ordering::Relaxed);
    }

    pub fn counter_value(&self, name: &str) -> u64 {
        self.counters
            .read()
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn failed_requests(&self) -> u64 {
        self.counter_value(FAILED_REQUESTS)
    }

    /// Value of an aggregation over a trend, rate or counter; `None` when
    /// the metric has no samples.
    pub fn aggregate(&self, metric: &str, aggregation: &Aggregation) -> Option<f64> {
        if let Some(trend) = self.trends.read().get(metric) {
            let histogram = trend.lock();
            if histogram.len() == 0 {
                return None;
            }
            return Some(match aggregation {
                Aggregation::Avg => histogram.mean(),
                Aggregation::Min => histogram.min() as f64,
                Aggregation::Max => histogram.max() as f64,
                Aggregation::Med => histogram.value_at_quantile(0.5) as f64,
                Aggregation::Percentile(p) => histogram.value_at_percentile(*p) as f64,
                Aggregation::Count => histogram.len() as f64,
                Aggregation::Rate => return None,
            });
        }

        if let Some(rate) = self.rates.read().get(metric) {
            let passes = rate.passes.load(Ordering::Relaxed);
            let fails = rate.fails.load(Ordering::Relaxed);
            let total = passes + fails;
            if total == 0 {
                return None;
            }
            return match aggregation {
                Aggregation::Rate => Some(passes as f64 / total as f64),
                Aggregation::Count => Some(passes as f64),
                _ => None,
            };
        }

        if let Some(counter) = self.counters.read().get(metric) {
            return match aggregation {
                Aggregation::Count => Some(counter.load(Ordering::Relaxed) as f64),
                _ => None,
            };
        }

        None
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let trends = self
            .trends
            .read()
            .iter()
            .map(|(name, trend)| {
                let h = trend.lock();
                let summary = if h.len() == 0 {
                    TrendSummary::default()
                } else {
                    TrendSummary {
                        count: h.len(),
                        min: h.min() as f64,
                        max: h.max() as f64,
                        avg: h.mean(),
                        med: h.value_at_quantile(0.5) as f64,
                        p90: h.value_at_quantile(0.90) as f64,
                        p95: h.value_at_quantile(0.95) as f64,
                        p99: h.value_at_quantile(0.99) as f64,
                    }
                };
                (name.clone(), summary)
            })
            .collect();

        let rates = self
            .rates
            .read()
            .iter()
            .map(|(name, rate)| {
                let passes = rate.passes.load(Ordering::Relaxed);
                let fails = rate.fails.load(Ordering::Relaxed);
                let total = passes + fails;
                let value = if total == 0 {
                    0.0
                } else {
                    passes as f64 / total as f64
                };
                (
                    name.clone(),
                    RateSummary {
                        passes,
                        fails,
                        rate: value,
                    },
                )
            })
            .collect();

        let counters = self
            .counters
            .read()
            .iter()
            .map(|(name, c)| (name.clone(), c.load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            trends,
            rates,
            counters,
        }
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for MetricsRegistry {
    fn record_latency(&self, metric: &str, millis: u64) {
        if let Some(trend) = self.trend(metric) {
            trend.lock().saturating_record(millis);
        }
    }

    fn increment_failure(&self, count: u64) {
        self.add_to_counter(FAILED_REQUESTS, count);
    }

    fn record_rate(&self, metric: &str, passed: bool) {
        let rate = self.rate(metric);
        if passed {
            rate.passes.fetch_add(1, Ordering::Relaxed);
        } else {
            rate.fails.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Statistic a threshold is evaluated against
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Avg,
    Min,
    Max,
    Med,
    /// Percentile in the 0..=100 range
    Percentile(f64),
    Count,
    Rate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub passes: u64,
    pub fails: u64,
    pub rate: f64,
}

/// Point-in-time copy of every metric in a registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub trends: BTreeMap<String, TrendSummary>,
    pub rates: BTreeMap<String, RateSummary>,
    pub counters: BTreeMap<String, u64>,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}

use super::recorder::{Aggregation, MetricsRegistry};
use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Comparison {
    fn holds(&self, observed: f64, expected: f64) -> bool {
        match self {
            Comparison::Lt => observed < expected,
            Comparison::Le => observed <= expected,
            Comparison::Gt => observed > expected,
            Comparison::Ge => observed >= expected,
            Comparison::Eq => (observed - expected).abs() < f64::EPSILON,
        }
    }
}

/// Pass/fail condition over one aggregated metric, e.g. `p(95)<3000`
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub aggregation: Aggregation,
    pub comparison: Comparison,
    pub value: f64,
}

fn expression_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s*(avg|min|max|med|count|rate|p\(\s*(\d+(?:\.\d+)?)\s*\))\s*(<=|>=|==|<|>)\s*(-?\d+(?:\.\d+)?)\s*$",
        )
        .ok()
    })
    .as_ref()
}

impl Threshold {
    pub fn parse(metric: &str, expression: &str) -> Result<Self> {
        let caps = expression_regex()
            .context("Threshold expression pattern failed to compile")?
            .captures(expression)
            .with_context(|| format!("Invalid threshold '{}' for metric '{}'", expression, metric))?;

        let aggregation = match &caps[1] {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            "count" => Aggregation::Count,
            "rate" => Aggregation::Rate,
            _ => {
                let p: f64 = caps[2].parse()?;
                if !(0.0..=100.0).contains(&p) {
                    bail!("Percentile {} out of range in threshold '{}'", p, expression);
                }
                Aggregation::Percentile(p)
            }
        };

        let comparison = match &caps[3] {
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            _ => Comparison::Eq,
        };

        Ok(Self {
            metric: metric.to_string(),
            expression: expression.trim().to_string(),
            aggregation,
            comparison,
            value: caps[4].parse()?,
        })
    }

    pub fn evaluate(&self, registry: &MetricsRegistry) -> ThresholdResult {
        let observed = registry.aggregate(&self.metric, &self.aggregation);
        // A metric that never received a sample does not fail its threshold
        let passed = observed.map_or(true, |v| self.comparison.holds(v, self.value));
        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            observed,
            passed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

pub fn evaluate_all(thresholds: &[Threshold], registry: &MetricsRegistry) -> Vec<ThresholdResult> {
    thresholds.iter().map(|t| t.evaluate(registry)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::recorder::Recorder;

    #[test]
    fn test_parse_percentile_threshold() {
        let t = Threshold::parse("http_req_duration", "p(95)<30000").unwrap();
        assert_eq!(t.aggregation, Aggregation::Percentile(95.0));
        assert_eq!(t.comparison, Comparison::Lt);
        assert_eq!(t.value, 30000.0);
    }

    #[test]
    fn test_parse_other_forms() {
        let t = Threshold::parse("step_success_rate", " rate >= 0.95 ").unwrap();
        assert_eq!(t.aggregation, Aggregation::Rate);
        assert_eq!(t.comparison, Comparison::Ge);
        assert_eq!(t.expression, "rate >= 0.95");

        assert!(Threshold::parse("x", "p(99.9)<=10").is_ok());
        assert!(Threshold::parse("x", "count==0").is_ok());
    }

    #[test]
    fn test_expression_pattern_compiles() {
        let re = expression_regex().unwrap();
        assert!(re.is_match("p(99.9) <= 250"));
        assert!(!re.is_match("p95<1"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Threshold::parse("x", "p95<3000").is_err());
        assert!(Threshold::parse("x", "avg<").is_err());
        assert!(Threshold::parse("x", "p(150)<1").is_err());
    }

    #[test]
    fn test_evaluate_against_registry() {
        let registry = MetricsRegistry::new();
        for ms in [100, 200, 300, 4000] {
            registry.record_latency("login_latency", ms);
        }
        registry.increment_failure(1);

        let results = evaluate_all(
            &[
                Threshold::parse("login_latency", "p(95)<3000").unwrap(),
                Threshold::parse("login_latency", "med<1000").unwrap(),
                Threshold::parse("failed_requests", "count<1").unwrap(),
                Threshold::parse("register_user_latency", "p(95)<3000").unwrap(),
            ],
            &registry,
        );

        assert!(!results[0].passed);
        assert!(results[1].passed);
        assert!(!results[2].passed);
        assert_eq!(results[2].observed, Some(1.0));
        assert!(results[3].passed);
        assert_eq!(results[3].observed, None);
    }
}

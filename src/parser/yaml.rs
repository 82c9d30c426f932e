use super::duration::parse_duration;
use super::types::{
    QueryCorpus, Registration, Scenario, ScenarioFile, Stage, Timeouts,
};
use crate::metrics::Threshold;
use crate::runner::pacing::{Pacing, ThinkTime};
use crate::utils::config::{Config, DEFAULT_QUERIES, MAX_PACING_SCALE};
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

/// Parse a YAML scenario file into a validated Scenario
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let base_dir = path.parent().unwrap_or(Path::new("."));
    parse_scenario_content(&content, base_dir)
        .with_context(|| format!("Invalid scenario: {}", path.display()))
}

/// Parse YAML content; relative file references resolve against `base_dir`
pub fn parse_scenario_content(content: &str, base_dir: &Path) -> Result<Scenario> {
    let file: ScenarioFile = if content.trim().is_empty() {
        ScenarioFile::default()
    } else {
        serde_yaml::from_str(content).context("Failed to parse scenario YAML")?
    };
    resolve(file, base_dir)
}

/// Apply defaults and validate a parsed scenario file
pub fn resolve(file: ScenarioFile, base_dir: &Path) -> Result<Scenario> {
    let defaults = Config::default();

    let stages = file
        .stages
        .iter()
        .map(|s| {
            Ok(Stage {
                duration: parse_duration(&s.duration)
                    .with_context(|| format!("Invalid stage duration '{}'", s.duration))?,
                target: s.target,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if stages.is_empty() {
        bail!("Scenario must declare at least one stage");
    }

    let graceful_ramp_down = match &file.graceful_ramp_down {
        Some(d) => parse_duration(d).context("Invalid gracefulRampDown")?,
        None => Duration::from_millis(defaults.graceful_ramp_down_ms),
    };

    let mut thresholds = Vec::new();
    for (metric, expressions) in &file.thresholds {
        for expression in expressions {
            thresholds.push(Threshold::parse(metric, expression)?);
        }
    }

    let mut queries = file.queries.clone();
    if let Some(ref queries_file) = file.queries_file {
        queries.extend(load_queries_csv(&base_dir.join(queries_file))?);
    }
    if file.queries.is_empty() && file.queries_file.is_none() {
        queries = DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect();
    }
    let corpus = QueryCorpus::new(queries).context("Query corpus must not be empty")?;

    let registration = Registration {
        password: file.registration.password.clone().unwrap_or(defaults.password),
        user_type: file
            .registration
            .user_type
            .clone()
            .unwrap_or(defaults.user_type),
        membership_type: file
            .registration
            .membership_type
            .clone()
            .unwrap_or(defaults.membership_type),
        role_ids: file
            .registration
            .role_ids
            .clone()
            .unwrap_or(defaults.role_ids),
    };

    let mut pacing = Pacing::default();
    if let Some(scale) = file.pacing.scale {
        if !scale.is_finite() || !(0.0..=MAX_PACING_SCALE).contains(&scale) {
            bail!(
                "Pacing scale must be between 0 and {}, got {}",
                MAX_PACING_SCALE,
                scale
            );
        }
        pacing.scale = scale;
    }
    for (step, spec) in &file.pacing.steps {
        let min = parse_duration(&spec.min)
            .with_context(|| format!("Invalid pacing min for '{}'", step))?;
        let max = match &spec.max {
            Some(max) => parse_duration(max)
                .with_context(|| format!("Invalid pacing max for '{}'", step))?,
            None => min,
        };
        if min > max {
            bail!("Pacing for '{}' has min greater than max", step);
        }
        pacing.per_step.insert(step.clone(), ThinkTime { min, max });
    }

    let mut per_step = HashMap::from([
        (
            "generate_citations".to_string(),
            Duration::from_millis(defaults.citations_timeout_ms),
        ),
        (
            "generate_response".to_string(),
            Duration::from_millis(defaults.response_timeout_ms),
        ),
    ]);
    for (step, value) in &file.timeouts.steps {
        let timeout = parse_duration(value)
            .with_context(|| format!("Invalid timeout for '{}'", step))?;
        per_step.insert(step.clone(), timeout);
    }
    let timeouts = Timeouts {
        default: match &file.timeouts.default {
            Some(d) => parse_duration(d).context("Invalid default timeout")?,
            None => Duration::from_millis(defaults.default_timeout_ms),
        },
        per_step,
    };

    let base_url = std::env::var("LOAD_BASE_URL")
        .ok()
        .or(file.base_url.clone())
        .unwrap_or(defaults.base_url);

    Ok(Scenario {
        name: file
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_flow", file.workflow.as_str())),
        base_url: base_url.trim_end_matches('/').to_string(),
        workflow: file.workflow,
        login_mode: file.login_mode,
        start_vus: file.start_vus.unwrap_or(1),
        stages,
        graceful_ramp_down,
        thresholds,
        corpus,
        registration,
        pacing,
        timeouts,
        user_agent: file.user_agent.clone().unwrap_or(defaults.user_agent),
    })
}

/// Read the `query` column of a CSV file
fn load_queries_csv(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open queries file: {}", path.display()))?;
    let mut rdr = csv::Reader::from_reader(file);
    let mut queries = Vec::new();
    for result in rdr.deserialize() {
        let record: HashMap<String, String> = result.context("Failed to parse CSV record")?;
        if let Some(q) = record.get("query") {
            queries.push(q.clone());
        }
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::{LoginMode, WorkflowKind};

    const SCENARIO: &str = r#"
name: interaction_flow
baseUrl: http://localhost:8080/
workflow: interaction
loginMode: session
startVUs: 2
stages:
  - duration: 30s
    target: 5
  - duration: 1m
    target: 0
gracefulRampDown: 15s
thresholds:
  http_req_duration: ["p(95)<30000"]
  login_latency: ["p(95)<3000", "avg<1500"]
queries:
  - What is a contract?
pacing:
  scale: 0.5
  steps:
    login:
      min: 1s
      max: 3s
timeouts:
  default: 10s
  steps:
    generate_response: 3m
"#;

    #[test]
    fn test_parse_full_scenario() {
        let scenario = parse_scenario_content(SCENARIO, Path::new(".")).unwrap();

        assert_eq!(scenario.name, "interaction_flow");
        assert_eq!(scenario.workflow, WorkflowKind::Interaction);
        assert_eq!(scenario.login_mode, LoginMode::Session);
        assert_eq!(scenario.start_vus, 2);
        assert_eq!(scenario.stages.len(), 2);
        assert_eq!(scenario.total_duration(), Duration::from_secs(90));
        assert_eq!(scenario.max_vus(), 5);
        assert_eq!(scenario.graceful_ramp_down, Duration::from_secs(15));
        assert_eq!(scenario.thresholds.len(), 3);
        assert_eq!(scenario.corpus.len(), 1);
        assert_eq!(scenario.pacing.scale, 0.5);
        assert_eq!(
            scenario.pacing.per_step["login"].max,
            Duration::from_secs(3)
        );
        assert_eq!(scenario.timeouts.for_step("login"), Duration::from_secs(10));
        assert_eq!(
            scenario.timeouts.for_step("generate_citations"),
            Duration::from_secs(60)
        );
        assert_eq!(
            scenario.timeouts.for_step("generate_response"),
            Duration::from_secs(180)
        );
        assert_eq!(scenario.registration.role_ids, vec![1]);
    }

    #[test]
    fn test_defaults_fill_minimal_scenario() {
        let scenario = parse_scenario_content(
            "stages:\n  - duration: 1m\n    target: 1\n",
            Path::new("."),
        )
        .unwrap();
        assert_eq!(scenario.workflow, WorkflowKind::Interaction);
        assert_eq!(scenario.login_mode, LoginMode::Token);
        assert_eq!(scenario.corpus.len(), DEFAULT_QUERIES.len());
        assert_eq!(scenario.registration.user_type, "DANDILION_STAFF");
        assert_eq!(scenario.graceful_ramp_down, Duration::from_secs(15));
    }

    #[test]
    fn test_rejects_invalid_scenarios() {
        assert!(parse_scenario_content("name: nothing\n", Path::new(".")).is_err());
        assert!(parse_scenario_content(
            "stages:\n  - {duration: 1m, target: 1}\nthresholds:\n  x: [\"p95<1\"]\n",
            Path::new(".")
        )
        .is_err());
        assert!(parse_scenario_content(
            "stages:\n  - {duration: 1m, target: 1}\npacing:\n  steps:\n    login: {min: 3s, max: 1s}\n",
            Path::new(".")
        )
        .is_err());
    }

    #[test]
    fn test_rejects_unusable_pacing_scale() {
        for scale in [".nan", ".inf", "-1", "1e12"] {
            let yaml = format!(
                "stages:\n  - {{duration: 1m, target: 1}}\npacing:\n  scale: {}\n",
                scale
            );
            assert!(
                parse_scenario_content(&yaml, Path::new(".")).is_err(),
                "scale {} accepted",
                scale
            );
        }
        assert!(parse_scenario_content(
            "stages:\n  - {duration: 1m, target: 1}\npacing:\n  scale: 0\n",
            Path::new(".")
        )
        .is_ok());
    }

    #[test]
    fn test_queries_file_is_loaded() {
        let dir = std::env::temp_dir().join(format!("interaction-load-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("queries.csv"), "query\nFirst question\nSecond question\n")
            .unwrap();

        let scenario = parse_scenario_content(
            "stages:\n  - {duration: 10s, target: 1}\nqueriesFile: queries.csv\n",
            &dir,
        )
        .unwrap();
        assert_eq!(scenario.corpus.len(), 2);
        assert!(scenario.corpus.contains("Second question"));

        std::fs::remove_dir_all(&dir).ok();
    }
}

use crate::metrics::Threshold;
use crate::runner::pacing::Pacing;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Scenario file as written on disk
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioFile {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub workflow: WorkflowKind,

    #[serde(default)]
    pub login_mode: LoginMode,

    #[serde(default, alias = "startVUs")]
    pub start_vus: Option<u32>,

    #[serde(default)]
    pub stages: Vec<StageSpec>,

    #[serde(default)]
    pub graceful_ramp_down: Option<String>,

    /// metric name -> list of expressions such as `p(95)<3000`
    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub queries: Vec<String>,

    /// CSV file with a `query` column, relative to the scenario file
    #[serde(default)]
    pub queries_file: Option<String>,

    #[serde(default)]
    pub registration: RegistrationSpec,

    #[serde(default)]
    pub pacing: PacingSpec,

    #[serde(default)]
    pub timeouts: TimeoutSpec,

    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub duration: String,
    pub target: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationSpec {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub user_type: Option<String>,
    #[serde(default)]
    pub membership_type: Option<String>,
    #[serde(default)]
    pub role_ids: Option<Vec<u64>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PacingSpec {
    /// Multiplier applied to every pause; 0 disables think time
    #[serde(default)]
    pub scale: Option<f64>,

    /// step name -> pause after that step
    #[serde(default)]
    pub steps: BTreeMap<String, ThinkTimeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkTimeSpec {
    pub min: String,
    #[serde(default)]
    pub max: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutSpec {
    #[serde(default)]
    pub default: Option<String>,

    /// step name -> request timeout
    #[serde(default)]
    pub steps: BTreeMap<String, String>,
}

/// Which workflow an iteration runs between setup and cleanup
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum WorkflowKind {
    /// Register, log in, then delete the account
    UserManagement,
    /// Register, log in, run the full interaction lifecycle, delete the account
    #[default]
    Interaction,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::UserManagement => "userManagement",
            WorkflowKind::Interaction => "interaction",
        }
    }
}

/// How the virtual user authenticates
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LoginMode {
    /// JSON credentials against the token API, no retry
    #[default]
    Token,
    /// Traditional session-cookie login form with a single JSON fallback
    Session,
}

/// One segment of the ramp profile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u32,
}

/// Account details sent at registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub password: String,
    pub user_type: String,
    pub membership_type: String,
    pub role_ids: Vec<u64>,
}

/// Per-step request timeouts
#[derive(Debug, Clone, PartialEq)]
pub struct Timeouts {
    pub default: Duration,
    pub per_step: HashMap<String, Duration>,
}

impl Timeouts {
    pub fn for_step(&self, step: &str) -> Duration {
        self.per_step.get(step).copied().unwrap_or(self.default)
    }
}

/// Read-only, never-empty set of sample questions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCorpus {
    queries: Vec<String>,
}

impl QueryCorpus {
    /// Returns `None` for an empty corpus
    pub fn new(queries: Vec<String>) -> Option<Self> {
        let queries: Vec<String> = queries
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if queries.is_empty() {
            None
        } else {
            Some(Self { queries })
        }
    }

    /// Uniformly random query
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.queries
            .choose(rng)
            .map(String::as_str)
            .unwrap_or(self.queries[0].as_str())
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn contains(&self, query: &str) -> bool {
        self.queries.iter().any(|q| q == query)
    }
}

/// Fully resolved and validated scenario
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub base_url: String,
    pub workflow: WorkflowKind,
    pub login_mode: LoginMode,
    pub start_vus: u32,
    pub stages: Vec<Stage>,
    pub graceful_ramp_down: Duration,
    pub thresholds: Vec<Threshold>,
    pub corpus: QueryCorpus,
    pub registration: Registration,
    pub pacing: Pacing,
    pub timeouts: Timeouts,
    pub user_agent: String,
}

impl Scenario {
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    pub fn max_vus(&self) -> u32 {
        self.stages
            .iter()
            .map(|s| s.target)
            .chain(std::iter::once(self.start_vus))
            .max()
            .unwrap_or(0)
    }
}

/// Built-in defaults applied when a scenario file leaves a field out
pub struct Config {
    /// Target service used when neither the scenario nor the CLI names one
    pub base_url: String,

    /// Timeout for ordinary requests (ms)
    pub default_timeout_ms: u64,

    /// Timeout for the streaming citation step (ms)
    pub citations_timeout_ms: u64,

    /// Timeout for the streaming response step (ms)
    pub response_timeout_ms: u64,

    /// Time given to in-flight iterations once the schedule ends (ms)
    pub graceful_ramp_down_ms: u64,

    /// Password given to every generated account
    pub password: String,

    /// Account classification sent at registration
    pub user_type: String,
    pub membership_type: String,

    /// Roles assigned right after registration
    pub role_ids: Vec<u64>,

    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://development.worldcc.dandilion.ai".to_string(),
            default_timeout_ms: 30_000,
            citations_timeout_ms: 60_000,
            response_timeout_ms: 120_000,
            graceful_ramp_down_ms: 15_000,
            password: "securePassword123".to_string(),
            user_type: "DANDILION_STAFF".to_string(),
            membership_type: "NOT_APPLICABLE".to_string(),
            role_ids: vec![1],
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
        }
    }
}

/// Largest accepted `pacing.scale`
pub const MAX_PACING_SCALE: f64 = 100.0;

/// Think time applied after a step: (step, min ms, max ms)
pub const DEFAULT_PACING: &[(&str, u64, u64)] = &[
    ("assign_role", 1_000, 2_000),
    ("login", 1_000, 3_000),
    ("create_interaction", 2_000, 2_000),
    ("generate_citations", 2_000, 2_000),
    ("generate_response", 20_000, 20_000),
    ("list_interactions", 1_000, 3_000),
    ("generate_followup", 5_000, 7_000),
    ("delete_user", 1_000, 2_000),
];

/// Sample questions used when a scenario does not bring its own corpus
pub const DEFAULT_QUERIES: &[&str] = &[
    "Why is there a significantly lower proportion of dedicated CCM resources on the buy side compared to the sell side?",
    "How might the organizational structure for CCM resources differ between buy-side and sell-side?",
    "What are the key challenges in implementing effective contract management systems?",
    "Can you explain the best practices for contract lifecycle management?",
    "What metrics should be tracked for effective contract performance?",
    "How can AI improve contract management processes?",
    "What are the common pitfalls in contract negotiations?",
    "How do regulatory changes impact contract management strategies?",
    "What's the difference between contract management and contract administration?",
    "How should contract management teams collaborate with legal departments?",
];

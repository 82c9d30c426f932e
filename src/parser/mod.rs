pub mod duration;
pub mod sse;
pub mod types;
pub mod yaml;

pub use yaml::{load_scenario, parse_scenario_content};

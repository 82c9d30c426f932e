pub mod driver;
pub mod error;
pub mod metrics;
pub mod parser;
pub mod report;
pub mod runner;
pub mod session;
pub mod utils;

// Re-export common items
pub use parser::load_scenario;
pub use report::generate_report;
pub use runner::run_load_test;

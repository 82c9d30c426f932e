pub mod json;
pub mod junit;
pub mod types;

use anyhow::{Context, Result};
use std::path::Path;

/// Generate a report from a saved `results.json`
pub async fn generate_report(
    results_path: &Path,
    format: &str,
    output: Option<&Path>,
) -> Result<()> {
    let results = std::fs::read_to_string(results_path)
        .with_context(|| format!("Failed to read results: {}", results_path.display()))?;
    let run_results: types::RunResults = serde_json::from_str(&results)?;

    match format {
        "json" => json::generate(&run_results, output).await,
        "junit" => junit::generate(&run_results, output),
        _ => anyhow::bail!("Unknown format: {}", format),
    }
}

/// Write every report format into `output_dir`
pub fn write_reports(results: &types::RunResults, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    json::write_report(results, output_dir)?;
    junit::write_report(results, output_dir)?;
    Ok(())
}

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use interaction_load::metrics::MetricsRegistry;
use interaction_load::parser::duration::{format_duration, parse_duration};
use interaction_load::parser::types::{Scenario, Stage};
use interaction_load::report::types::RunResults;
use interaction_load::runner::{ConsoleEventListener, EventEmitter};
use interaction_load::{load_scenario, report, runner};

#[derive(Parser)]
#[command(name = "interaction-load")]
#[command(version = "0.1.0")]
#[command(about = "Load test workload generator for the interaction API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test scenario
    Run {
        /// Path to scenario YAML
        scenario: PathBuf,

        /// Override the scenario's base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Output directory for reports
        #[arg(short, long, default_value = "./output")]
        output: PathBuf,

        /// Generate reports (JSON, JUnit)
        #[arg(long, default_value = "false")]
        report: bool,

        /// Run a constant number of VUs instead of the scenario's stages
        #[arg(long)]
        vus: Option<u32>,

        /// Duration for --vus (e.g. 30s, 5m)
        #[arg(long)]
        duration: Option<String>,
    },

    /// Parse a scenario and print what would run
    Validate {
        /// Path to scenario YAML
        scenario: PathBuf,
    },

    /// Generate report from saved results
    Report {
        /// Path to results JSON
        results: PathBuf,

        /// Output format (json, junit)
        #[arg(short, long, default_value = "junit")]
        format: String,

        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            base_url,
            output,
            report,
            vus,
            duration,
        } => {
            let mut loaded = load_scenario(&scenario)?;
            if let Some(url) = base_url {
                loaded.base_url = url.trim_end_matches('/').to_string();
            }
            if vus.is_some() || duration.is_some() {
                let duration = match duration {
                    Some(d) => parse_duration(&d)?,
                    None => loaded.total_duration(),
                };
                let target = vus.unwrap_or_else(|| loaded.max_vus());
                loaded.start_vus = target;
                loaded.stages = vec![Stage { duration, target }];
            }

            println!(
                "{} Running scenario from: {}",
                "▶".green().bold(),
                scenario.display()
            );
            print_scenario(&loaded);
            println!("  Output: {}", output.display().to_string().cyan());
            if report {
                println!("  Reports: {}", "Enabled".green());
            }

            let stop = Arc::new(AtomicBool::new(false));
            let stop_handler = stop.clone();
            ctrlc::set_handler(move || {
                println!("\n{} Stopping, letting running iterations finish...", "⏹".yellow());
                stop_handler.store(true, Ordering::SeqCst);
            })?;

            let (emitter, receiver) = EventEmitter::new();
            let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

            let registry = Arc::new(MetricsRegistry::new());
            let results =
                runner::run_load_test(Arc::new(loaded), registry, emitter, stop).await?;
            let _ = listener.await;

            print_results(&results);

            if report {
                report::write_reports(&results, &output)?;
            }

            if !results.thresholds_passed() {
                anyhow::bail!(
                    "{} threshold(s) crossed",
                    results.crossed_thresholds().count()
                );
            }
        }

        Commands::Validate { scenario } => {
            let loaded = load_scenario(&scenario)?;
            println!("{} Scenario is valid: {}", "✓".green().bold(), scenario.display());
            print_scenario(&loaded);
        }

        Commands::Report {
            results,
            format,
            output,
        } => {
            println!(
                "{} Generating {} report from: {}",
                "📊".to_string().blue(),
                format.cyan(),
                results.display()
            );
            report::generate_report(&results, &format, output.as_deref()).await?;
        }
    }

    Ok(())
}

fn print_scenario(scenario: &Scenario) {
    println!("  Scenario: {}", scenario.name.cyan());
    println!("  Base URL: {}", scenario.base_url.cyan());
    println!(
        "  Workflow: {} ({:?} login)",
        scenario.workflow.as_str(),
        scenario.login_mode
    );
    for (i, stage) in scenario.stages.iter().enumerate() {
        println!(
            "  Stage {}: {} → {} VUs",
            i + 1,
            format_duration(stage.duration),
            stage.target
        );
    }
    println!(
        "  Graceful ramp-down: {}",
        format_duration(scenario.graceful_ramp_down)
    );
    println!("  Queries: {}", scenario.corpus.len());
    if scenario.pacing.scale != 1.0 {
        println!("  Pacing scale: {}", scenario.pacing.scale);
    }
    for threshold in &scenario.thresholds {
        println!(
            "  Threshold: {} {}",
            threshold.metric,
            threshold.expression.yellow()
        );
    }
}

fn print_results(results: &RunResults) {
    println!("\n{} Metrics", "■".blue().bold());
    for (name, trend) in &results.metrics.trends {
        println!(
            "  {:<28} avg={:.0}ms min={:.0}ms med={:.0}ms max={:.0}ms p(90)={:.0}ms p(95)={:.0}ms ({} samples)",
            name, trend.avg, trend.min, trend.med, trend.max, trend.p90, trend.p95, trend.count
        );
    }
    for (name, rate) in &results.metrics.rates {
        println!(
            "  {:<28} {:.2}% ({} ✓ {} ✗)",
            name,
            rate.rate * 100.0,
            rate.passes,
            rate.fails
        );
    }
    for (name, count) in &results.metrics.counters {
        println!("  {:<28} {}", name, count);
    }

    if results.thresholds.is_empty() {
        return;
    }
    println!("\n{} Thresholds", "■".blue().bold());
    for threshold in &results.thresholds {
        let mark = if threshold.passed {
            "✓".green()
        } else {
            "✗".red()
        };
        let observed = threshold
            .observed
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "no data".to_string());
        println!(
            "  {} {} {} (observed {})",
            mark, threshold.metric, threshold.expression, observed
        );
    }
}

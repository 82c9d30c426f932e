use super::state::{IterationReport, IterationStatus, IterationTally};
use tokio::sync::broadcast;

/// Load test execution events for real-time updates
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        scenario: String,
        max_vus: u32,
        duration_ms: u64,
    },
    StageStarted {
        index: usize,
        target: u32,
    },
    /// Periodic executor heartbeat
    Progress {
        active_vus: u32,
        target_vus: u32,
        elapsed_ms: u64,
    },
    IterationFinished {
        report: IterationReport,
    },
    /// Schedule is over; in-flight iterations get the graceful window
    RampingDown {
        in_flight: usize,
        grace_ms: u64,
    },
    RunFinished {
        tally: IterationTally,
        duration_ms: u64,
    },
    Log {
        message: String,
    },
}

/// Event emitter for broadcasting run events
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(1024);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self { sender }
    }
}

impl Clone for EventEmitter {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration as StdDuration;

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener;

impl ConsoleEventListener {
    pub async fn listen(mut receiver: broadcast::Receiver<RunEvent>) {
        use colored::Colorize;
        use std::io::IsTerminal;

        // Hidden spinner when piped, to avoid terminal escape codes
        let spinner = if std::io::stdout().is_terminal() {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::with_draw_target(None, ProgressDrawTarget::hidden())
        };
        if let Ok(style) = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("  {spinner} {msg}")
        {
            spinner.set_style(style);
        }

        let mut tally = IterationTally::default();
        let mut active_vus = 0;
        let mut target_vus = 0;
        let mut stage = 0;

        loop {
            let event = match receiver.recv().await {
                Ok(event) => event,
                // Dropped progress events are fine, the next one catches up
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            match event {
                RunEvent::RunStarted {
                    run_id,
                    scenario,
                    max_vus,
                    duration_ms,
                } => {
                    spinner.println(format!(
                        "\n{} Load test started: {} ({})",
                        "▶".green().bold(),
                        scenario.cyan(),
                        run_id.dimmed()
                    ));
                    spinner.println(format!(
                        "  Up to {} VUs over {}",
                        max_vus,
                        crate::parser::duration::format_duration(StdDuration::from_millis(
                            duration_ms
                        ))
                    ));
                    spinner.enable_steady_tick(StdDuration::from_millis(100));
                }

                RunEvent::StageStarted { index, target } => {
                    stage = index + 1;
                    spinner.println(format!(
                        "  {} Stage {} → {} VUs",
                        "→".blue(),
                        stage,
                        target
                    ));
                }

                RunEvent::Progress {
                    active_vus: active,
                    target_vus: target,
                    ..
                } => {
                    active_vus = active;
                    target_vus = target;
                }

                RunEvent::IterationFinished { report } => {
                    tally.add(&report);
                    if report.status == IterationStatus::Failed {
                        spinner.println(format!(
                            "    {} VU {} iteration {} failed at {} ({} failures)",
                            "✗".red(),
                            report.vu,
                            report.iteration,
                            report.phase.as_str(),
                            report.failures
                        ));
                    }
                }

                RunEvent::RampingDown {
                    in_flight,
                    grace_ms,
                } => {
                    spinner.println(format!(
                        "  {} Ramping down: waiting up to {}ms for {} iterations",
                        "↓".yellow(),
                        grace_ms,
                        in_flight
                    ));
                }

                RunEvent::Log { message } => {
                    spinner.println(format!("    {}", message));
                }

                RunEvent::RunFinished { tally, duration_ms } => {
                    spinner.finish_and_clear();
                    println!("\n{} Load test finished", "■".blue().bold());
                    println!("  Iterations: {}", tally.total);
                    println!(
                        "  {} passed, {} partial, {} failed, {} interrupted",
                        tally.passed.to_string().green(),
                        tally.partial.to_string().yellow(),
                        tally.failed.to_string().red(),
                        tally.interrupted.to_string().dimmed()
                    );
                    println!("  Duration: {}ms", duration_ms);
                    break;
                }
            }

            spinner.set_message(format!(
                "stage {} | VUs {}/{} | iterations {} ({} ✓ {} ~ {} ✗)",
                stage,
                active_vus,
                target_vus,
                tally.total,
                tally.passed,
                tally.partial,
                tally.failed
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cloned_emitters_share_one_channel() {
        let (emitter, mut receiver) = EventEmitter::new();
        let clone = emitter.clone();

        emitter.emit(RunEvent::StageStarted {
            index: 0,
            target: 5,
        });
        clone.emit(RunEvent::StageStarted {
            index: 1,
            target: 0,
        });

        assert!(matches!(
            receiver.recv().await,
            Ok(RunEvent::StageStarted { target: 5, .. })
        ));
        assert!(matches!(
            receiver.recv().await,
            Ok(RunEvent::StageStarted { index: 1, .. })
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_ignored() {
        let emitter = EventEmitter::default();
        emitter.emit(RunEvent::Log {
            message: "nobody listening".to_string(),
        });
    }

    #[tokio::test]
    async fn test_console_listener_stops_on_run_finished() {
        let (emitter, receiver) = EventEmitter::new();
        let listener = tokio::spawn(ConsoleEventListener::listen(receiver));

        emitter.emit(RunEvent::RunFinished {
            tally: IterationTally::default(),
            duration_ms: 10,
        });

        tokio::time::timeout(StdDuration::from_secs(5), listener)
            .await
            .expect("listener should stop")
            .unwrap();
    }
}

pub mod context;
pub mod events;
pub mod pacing;
pub mod ramp;
pub mod state;
pub mod steps;
pub mod workflow;

use crate::driver::ReqwestTransport;
use crate::metrics::recorder::ITERATIONS;
use crate::metrics::{evaluate_all, MetricsRegistry};
use crate::parser::types::Scenario;
use crate::report::types::RunResults;
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinError;

pub use events::*;
pub use state::*;
pub use workflow::Workflow;

/// How often the executor re-evaluates the ramp profile
const TICK: Duration = Duration::from_millis(100);
/// How often a progress event is published
const PROGRESS_EVERY: Duration = Duration::from_secs(1);

/// Shared between the executor and its virtual users
struct RunControl {
    target: watch::Receiver<u32>,
    stopping: Arc<AtomicBool>,
    in_flight: AtomicU32,
    tally: Mutex<IterationTally>,
}

/// Run a ramping-VU load test.
///
/// Every VU loops workflow iterations while its index is below the current
/// target. When the schedule ends or `stop` is raised, VUs start no new
/// iterations; those in flight get the scenario's graceful ramp-down window
/// and are then aborted.
pub async fn run_load_test(
    scenario: Arc<Scenario>,
    registry: Arc<MetricsRegistry>,
    emitter: EventEmitter,
    stop: Arc<AtomicBool>,
) -> Result<RunResults> {
    let run_id = uuid::Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now();
    let total = scenario.total_duration();
    let max_vus = scenario.max_vus().max(scenario.start_vus);

    emitter.emit(RunEvent::RunStarted {
        run_id: run_id.clone(),
        scenario: scenario.name.clone(),
        max_vus,
        duration_ms: total.as_millis() as u64,
    });

    let (target_tx, target_rx) =
        watch::channel(ramp::target_at(scenario.start_vus, &scenario.stages, Duration::ZERO));
    let control = Arc::new(RunControl {
        target: target_rx,
        stopping: Arc::new(AtomicBool::new(false)),
        in_flight: AtomicU32::new(0),
        tally: Mutex::new(IterationTally::default()),
    });

    let mut handles = Vec::with_capacity(max_vus as usize);
    for vu in 1..=max_vus {
        let scenario = scenario.clone();
        let registry = registry.clone();
        let emitter = emitter.clone();
        let control = control.clone();
        handles.push(tokio::spawn(async move {
            run_virtual_user(vu, scenario, registry, emitter, control).await;
        }));
    }

    let started = Instant::now();
    let mut ticker = tokio::time::interval(TICK);
    let mut last_stage = None;
    let mut last_progress = Instant::now();
    loop {
        ticker.tick().await;
        let elapsed = started.elapsed();
        if elapsed >= total {
            break;
        }
        if stop.load(Ordering::SeqCst) {
            emitter.emit(RunEvent::Log {
                message: "Interrupted, stopping early".to_string(),
            });
            break;
        }

        let target = ramp::target_at(scenario.start_vus, &scenario.stages, elapsed);
        target_tx.send_if_modified(|current| {
            if *current != target {
                *current = target;
                true
            } else {
                false
            }
        });

        if let Some(position) = ramp::stage_at(&scenario.stages, elapsed) {
            if last_stage != Some(position.index) {
                last_stage = Some(position.index);
                emitter.emit(RunEvent::StageStarted {
                    index: position.index,
                    target: position.target,
                });
            }
        }

        if last_progress.elapsed() >= PROGRESS_EVERY {
            last_progress = Instant::now();
            emitter.emit(RunEvent::Progress {
                active_vus: control.in_flight.load(Ordering::Relaxed),
                target_vus: target,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
    }

    // Ramp-down: no new iterations, wake idle VUs so they can exit
    control.stopping.store(true, Ordering::SeqCst);
    target_tx.send_replace(0);

    let in_flight = control.in_flight.load(Ordering::SeqCst);
    emitter.emit(RunEvent::RampingDown {
        in_flight: in_flight as usize,
        grace_ms: scenario.graceful_ramp_down.as_millis() as u64,
    });

    let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
    let drained = tokio::time::timeout(
        scenario.graceful_ramp_down,
        futures_util::future::join_all(handles),
    )
    .await;
    match drained {
        Ok(joins) => {
            report_crashed_vus(joins, &emitter);
        }
        Err(_) => {
            let interrupted = control.in_flight.load(Ordering::SeqCst);
            log::warn!(
                "{} iterations still running after graceful ramp-down, aborting",
                interrupted
            );
            for abort in aborts {
                abort.abort();
            }
            control.tally.lock().interrupted += interrupted as u64;
        }
    }

    let duration_ms = started.elapsed().as_millis() as u64;
    let tally = control.tally.lock().clone();
    emitter.emit(RunEvent::RunFinished {
        tally: tally.clone(),
        duration_ms,
    });

    Ok(RunResults {
        run_id,
        scenario: scenario.name.clone(),
        workflow: scenario.workflow.as_str().to_string(),
        base_url: scenario.base_url.clone(),
        started_at: started_at.to_rfc3339(),
        duration_ms,
        max_vus,
        iterations: tally,
        failed_requests: registry.failed_requests(),
        metrics: registry.snapshot(),
        thresholds: evaluate_all(&scenario.thresholds, &registry),
        generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

/// Log VU tasks that panicked or were cancelled; returns how many did
fn report_crashed_vus(joins: Vec<Result<(), JoinError>>, emitter: &EventEmitter) -> usize {
    let mut crashed = 0;
    for (index, join) in joins.into_iter().enumerate() {
        if let Err(e) = join {
            crashed += 1;
            log::error!("VU {} task ended abnormally: {}", index + 1, e);
            emitter.emit(RunEvent::Log {
                message: format!("VU {} crashed: {}", index + 1, e),
            });
        }
    }
    crashed
}

async fn run_virtual_user(
    vu: u32,
    scenario: Arc<Scenario>,
    registry: Arc<MetricsRegistry>,
    emitter: EventEmitter,
    control: Arc<RunControl>,
) {
    let transport = match ReqwestTransport::new(scenario.timeouts.default) {
        Ok(transport) => transport,
        Err(e) => {
            log::error!("VU {}: failed to create HTTP client: {}", vu, e);
            return;
        }
    };
    let workflow = Workflow::new(&scenario, &transport, registry.as_ref());
    let mut target = control.target.clone();
    let mut iteration = 0;

    loop {
        if control.stopping.load(Ordering::SeqCst) {
            break;
        }

        // VU indexes start at 1; idle until the ramp reaches us
        let current = *target.borrow_and_update();
        if vu > current {
            if target.changed().await.is_err() {
                break;
            }
            continue;
        }

        control.in_flight.fetch_add(1, Ordering::SeqCst);
        let report = workflow.iterate(vu, iteration).await;
        control.in_flight.fetch_sub(1, Ordering::SeqCst);

        registry.add_to_counter(ITERATIONS, 1);
        control.tally.lock().add(&report);
        emitter.emit(RunEvent::IterationFinished { report });
        iteration += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_scenario_content;
    use crate::runner::pacing::Pacing;
    use std::path::Path;

    fn scenario(yaml: &str) -> Scenario {
        let mut scenario = parse_scenario_content(yaml, Path::new(".")).unwrap();
        // Nothing listens here; every request fails fast
        scenario.base_url = "http://127.0.0.1:1".to_string();
        scenario.pacing = Pacing::disabled();
        scenario
    }

    #[tokio::test]
    async fn test_run_completes_and_evaluates_thresholds() {
        let scenario = scenario(
            "workflow: userManagement\nstages:\n  - {duration: 500ms, target: 2}\n\
gracefulRampDown: 5s\nthresholds:\n  step_success_rate: [\"rate>0.9\"]\n",
        );
        let registry = Arc::new(MetricsRegistry::new());
        let (emitter, _receiver) = EventEmitter::new();

        let results = run_load_test(
            Arc::new(scenario),
            registry.clone(),
            emitter,
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();

        assert_eq!(results.max_vus, 2);
        assert_eq!(results.thresholds.len(), 1);
        assert_eq!(
            results.iterations.total,
            results.metrics.counter(ITERATIONS)
        );
        if results.iterations.total > 0 {
            assert!(!results.thresholds_passed());
            assert!(results.failed_requests > 0);
        }
    }

    #[tokio::test]
    async fn test_panicked_vu_is_reported() {
        let (emitter, mut receiver) = EventEmitter::new();
        let joins = futures_util::future::join_all(vec![
            tokio::spawn(async {}),
            tokio::spawn(async { panic!("bad pacing") }),
        ])
        .await;

        assert_eq!(report_crashed_vus(joins, &emitter), 1);
        match receiver.recv().await {
            Ok(RunEvent::Log { message }) => assert!(message.starts_with("VU 2 crashed")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stop_flag_ends_run_early() {
        let scenario = scenario(
            "workflow: userManagement\nstages:\n  - {duration: 1h, target: 1}\ngracefulRampDown: 1s\n",
        );
        let stop = Arc::new(AtomicBool::new(true));
        let (emitter, _receiver) = EventEmitter::new();

        let results = tokio::time::timeout(
            Duration::from_secs(30),
            run_load_test(
                Arc::new(scenario),
                Arc::new(MetricsRegistry::new()),
                emitter,
                stop,
            ),
        )
        .await
        .expect("run should stop")
        .unwrap();

        assert!(results.duration_ms < 30_000);
    }
}

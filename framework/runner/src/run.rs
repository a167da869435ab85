use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use gust_core::prelude::{ClientBailError, ShutdownSignalError};
use gust_instruments::report::ReportConfig;
use gust_instruments::{
    IterationResult, MetricSnapshot, Recorder, ThresholdEvaluator, ThresholdOutcome,
};
use gust_summary_model::{MetricSummary, RunSummary, ThresholdSummary};

use crate::cli::ReporterOpt;
use crate::context::{ClientContext, RunnerContext, UserValuesConstraint};
use crate::definition::{ScenarioDefinition, ScenarioDefinitionBuilder};
use crate::executor::Executor;
use crate::monitor::start_monitor;
use crate::pool::ClientPool;
use crate::progress::start_progress;
use crate::shutdown::start_shutdown_listener;

/// How often the scheduler reconciles the pool against the plan. Sub-second so a one
/// second stage still gets several convergence opportunities.
const SCHEDULER_TICK: Duration = Duration::from_millis(100);

/// How often thresholds are re-evaluated against the live aggregates.
const EVALUATOR_TICK: Duration = Duration::from_secs(1);

/// Where the run is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Before the run starts.
    Idle,
    /// Executing the stage with this index.
    Ramping(usize),
    /// The plan has elapsed; waiting for in-flight iterations to finish.
    Draining,
    /// Normal end of run.
    Completed,
    /// A threshold marked fatal was breached and the run stopped early.
    Aborted,
}

/// What the run produced, independent of how it gets rendered.
#[derive(Debug)]
pub struct RunReport {
    /// True only if every threshold held for the whole run.
    pub verdict: bool,
    pub state: RunState,
    pub outcomes: Vec<ThresholdOutcome>,
    /// Set when clients had to be discarded because they did not stop within the drain
    /// grace period.
    pub drain_timed_out: bool,
    /// The highest concurrency observed at any scheduler tick.
    pub peak_active: usize,
    pub summary: RunSummary,
}

/// Run a scenario to completion and report how it went.
///
/// Returns an error only for configuration problems or runner-level failures; threshold
/// breaches are reported through [RunReport::verdict], not as errors.
pub fn run<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: ScenarioDefinitionBuilder<RV, V>,
) -> anyhow::Result<RunReport> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario [{}] with run id [{}]",
        definition.name,
        definition.run_id
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime)?;
    let executor = Arc::new(Executor::new(runtime, shutdown_handle.clone()));
    let recorder = Arc::new(Recorder::new());

    let reporter = match definition.reporter {
        ReporterOpt::Summary => ReportConfig::default().enable_summary().init(),
        ReporterOpt::Noop => ReportConfig::default().init(),
    };

    let mut runner_context = RunnerContext::new(
        executor,
        recorder.clone(),
        shutdown_handle.clone(),
        definition.connection_string.clone(),
        definition.run_id.clone(),
    );

    if let Some(setup_fn) = &definition.setup_fn {
        setup_fn(&mut runner_context)?;
    }

    if !definition.no_progress {
        start_progress(
            definition.plan.total_duration(),
            shutdown_handle.new_listener(),
        );
    }

    // Ready to start spawning clients, so start the resource monitor to warn when the
    // generator itself is resource-bound and might skew the measurements.
    start_monitor(shutdown_handle.new_listener());

    let runner_context = Arc::new(runner_context);
    let pool = ClientPool::new();
    let mut evaluator = ThresholdEvaluator::new(definition.rules.clone());

    let started_at = chrono::Utc::now().timestamp();
    let started = Instant::now();
    let mut state = RunState::Idle;
    let mut peak_active = 0usize;
    let mut next_evaluation = started + EVALUATOR_TICK;
    let mut external_shutdown = shutdown_handle.new_listener();

    loop {
        if external_shutdown.should_shutdown() {
            log::info!("Shutdown requested, winding the run down early");
            break;
        }

        let elapsed = started.elapsed();
        let Some(stage_index) = definition.plan.stage_index_at(elapsed) else {
            state = RunState::Draining;
            break;
        };
        if state != RunState::Ramping(stage_index) {
            log::info!(
                "Entering stage {} of {} (target {} clients)",
                stage_index + 1,
                definition.plan.stages().len(),
                definition.plan.stages()[stage_index].target
            );
            state = RunState::Ramping(stage_index);
        }

        pool.reap();
        let desired = definition.plan.desired_at(elapsed);
        let current = pool.commanded_count();
        if desired > current {
            if let Err(e) = (0..(desired - current)).try_for_each(|_| {
                spawn_client(&pool, &runner_context, &shutdown_handle, &definition)
            }) {
                // An OS-level failure to start a thread; drain what we have rather than
                // walking away from running clients.
                log::error!("Failed to spawn a client, stopping the run: {e:?}");
                break;
            }
        } else if current > desired {
            pool.stop(current - desired);
        }
        peak_active = peak_active.max(pool.active_count());

        if Instant::now() >= next_evaluation {
            next_evaluation += EVALUATOR_TICK;
            if evaluator.evaluate(&recorder) {
                log::error!("A fatal threshold was breached, aborting the run");
                state = RunState::Aborted;
                break;
            }
        }

        std::thread::sleep(SCHEDULER_TICK);
    }

    if state == RunState::Aborted {
        // Cancel in-flight async work too; there is no point finishing requests whose
        // results will be thrown away.
        shutdown_handle.shutdown();
    }

    let drain_timed_out = pool.drain(definition.drain_timeout);
    if state != RunState::Aborted {
        state = RunState::Completed;
        // Unblock the progress and monitor threads if they are still waiting.
        shutdown_handle.shutdown();
    }

    // One final evaluation so runs shorter than the evaluator tick still get judged, and so
    // samples recorded during the drain count.
    evaluator.evaluate(&recorder);

    let outcomes = evaluator.outcomes();
    let verdict = evaluator.verdict();
    let summary = build_summary(
        &definition,
        &recorder,
        &outcomes,
        started_at,
        drain_timed_out,
        state == RunState::Aborted,
        verdict,
    );

    reporter.finalize(&recorder, &outcomes, verdict);

    if let Some(path) = &definition.summary_path {
        let json = summary.to_json().context("Failed to serialize run summary")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    }

    Ok(RunReport {
        verdict,
        state,
        outcomes,
        drain_timed_out,
        peak_active,
        summary,
    })
}

fn spawn_client<RV: UserValuesConstraint, V: UserValuesConstraint>(
    pool: &ClientPool,
    runner_context: &Arc<RunnerContext<RV>>,
    shutdown_handle: &gust_core::prelude::ShutdownHandle,
    definition: &ScenarioDefinition<RV, V>,
) -> anyhow::Result<()> {
    let runner_context = runner_context.clone();
    let recorder = runner_context.recorder().clone();
    let setup_client_fn = definition.setup_client_fn;
    let behaviour = definition.client_behaviour;

    // For the behaviour implementation to listen for shutdown and respond appropriately.
    let delegated_shutdown_listener = shutdown_handle.new_listener();
    // For the loop itself to notice a run-level shutdown between iterations.
    let mut cycle_shutdown_listener = shutdown_handle.new_listener();

    pool.spawn(move |client_index, stop_signal| {
        let client_id = format!("client-{client_index}");
        let mut context = ClientContext::new(
            client_id.clone(),
            runner_context,
            delegated_shutdown_listener,
        );

        if let Some(setup_client_fn) = setup_client_fn {
            if let Err(e) = setup_client_fn(&mut context) {
                log::error!("Client setup failed for {client_id}: {e:?}");
                return;
            }
        }

        loop {
            if stop_signal.should_stop() || cycle_shutdown_listener.should_shutdown() {
                log::debug!("Stopping {client_id}");
                break;
            }

            let iteration_started = Instant::now();
            let outcome = behaviour(&mut context);
            let duration = iteration_started.elapsed();
            let checks = context.take_checks();

            match outcome {
                Ok(()) => {
                    recorder.record_iteration(&IterationResult {
                        duration,
                        failed: false,
                        checks,
                    });
                }
                Err(e) if e.is::<ShutdownSignalError>() => {
                    // The iteration was cancelled by a run-level shutdown, so its timing
                    // is meaningless. The check at the top of the loop will break out.
                }
                Err(e) if e.is::<ClientBailError>() => {
                    log::info!("{client_id} is bailing: {e:?}");
                    recorder.record_iteration(&IterationResult {
                        duration,
                        failed: true,
                        checks,
                    });
                    break;
                }
                Err(e) => {
                    log::debug!("Iteration failed for {client_id}: {e:?}");
                    recorder.record_iteration(&IterationResult {
                        duration,
                        failed: true,
                        checks,
                    });
                }
            }
        }
    })
}

fn build_summary<RV: UserValuesConstraint, V: UserValuesConstraint>(
    definition: &ScenarioDefinition<RV, V>,
    recorder: &Recorder,
    outcomes: &[ThresholdOutcome],
    started_at: i64,
    drain_timed_out: bool,
    aborted: bool,
    passed: bool,
) -> RunSummary {
    let metrics = recorder
        .snapshot_all()
        .into_iter()
        .map(|(name, snapshot)| {
            let summary = match snapshot {
                MetricSnapshot::Trend(trend) => MetricSummary::Trend {
                    count: trend.count,
                    avg_ms: trend.avg_ms(),
                    min_ms: trend.min_ms,
                    p50_ms: trend.percentile_ms(50.0),
                    p95_ms: trend.percentile_ms(95.0),
                    p99_ms: trend.percentile_ms(99.0),
                    max_ms: trend.max_ms,
                },
                MetricSnapshot::Rate(rate) => MetricSummary::Rate {
                    total: rate.total,
                    occurred: rate.occurred,
                    rate: rate.rate(),
                },
            };
            (name, summary)
        })
        .collect::<HashMap<_, _>>();

    RunSummary {
        run_id: definition.run_id.clone(),
        scenario_name: definition.name.clone(),
        started_at,
        planned_duration_s: definition.plan.total_duration().as_secs(),
        peak_clients: definition.plan.peak_target(),
        drain_timed_out,
        aborted,
        metrics,
        thresholds: outcomes
            .iter()
            .map(|outcome| ThresholdSummary {
                metric: outcome.metric.clone(),
                predicate: outcome.predicate.clone(),
                passed: outcome.passed,
            })
            .collect(),
        passed,
    }
}

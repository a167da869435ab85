use std::time::{Duration, Instant};

use gust_runner::prelude::{
    run, ClientContext, GustScenarioCli, HookResult, ReporterOpt, RunState, RunnerContext,
    ScenarioDefinitionBuilder, Stage, UserValuesConstraint,
};

#[derive(Default, Debug)]
struct RunnerContextValue {}

impl UserValuesConstraint for RunnerContextValue {}

#[derive(Default, Debug)]
struct ClientContextValue {
    iterations: u32,
}

impl UserValuesConstraint for ClientContextValue {}

fn sample_cli_cfg() -> GustScenarioCli {
    GustScenarioCli {
        connection_string: None,
        stages: vec![],
        clients: None,
        duration: None,
        abort_on_breach: false,
        drain_timeout: None,
        no_progress: true,
        reporter: ReporterOpt::Noop,
        summary_path: None,
        run_id: None,
    }
}

fn scenario(
    name: &str,
    cli: GustScenarioCli,
) -> ScenarioDefinitionBuilder<RunnerContextValue, ClientContextValue> {
    ScenarioDefinitionBuilder::new(name, cli).with_drain_timeout(Duration::from_secs(5))
}

#[test]
fn propagate_error_in_setup_hook() {
    fn setup(_ctx: &mut RunnerContext<RunnerContextValue>) -> HookResult {
        Err(anyhow::anyhow!("Error in setup hook"))
    }

    fn behaviour(_ctx: &mut ClientContext<RunnerContextValue, ClientContextValue>) -> HookResult {
        Ok(())
    }

    let definition = scenario("propagate_error_in_setup_hook", sample_cli_cfg())
        .with_default_clients(1)
        .with_default_duration_s(1)
        .use_setup(setup)
        .use_client_behaviour(behaviour);

    let result = run(definition);

    assert!(result.is_err());
    assert_eq!(result.unwrap_err().to_string(), "Error in setup hook");
}

#[test]
fn staged_run_passes_its_thresholds_and_respects_the_peak() {
    fn behaviour(ctx: &mut ClientContext<RunnerContextValue, ClientContextValue>) -> HookResult {
        // Stand-in for a request with a stable ~20ms response time.
        let recorder = ctx.runner_context().recorder().clone();
        let started = Instant::now();
        std::thread::sleep(Duration::from_millis(20));
        recorder.record_duration("http_req_duration", started.elapsed());
        recorder.record_rate("http_req_failed", false);
        Ok(())
    }

    // The original five-stage shape, scaled down to keep the test quick.
    let definition = scenario(
        "staged_run_passes_its_thresholds_and_respects_the_peak",
        sample_cli_cfg(),
    )
    .with_default_stages(vec![
        Stage::new(Duration::from_millis(500), 5),
        Stage::new(Duration::from_millis(1000), 5),
        Stage::new(Duration::from_millis(500), 10),
        Stage::new(Duration::from_millis(1000), 10),
        Stage::new(Duration::from_millis(500), 0),
    ])
    .use_threshold("http_req_failed", "rate<0.01")
    .use_threshold("http_req_duration", "p(95)<700")
    .use_client_behaviour(behaviour);

    let started = Instant::now();
    let report = run(definition).unwrap();
    let elapsed = started.elapsed();

    assert!(report.verdict, "thresholds should pass: {:?}", report.outcomes);
    assert_eq!(report.state, RunState::Completed);
    assert!(!report.drain_timed_out);
    assert!(
        report.peak_active <= 10,
        "never more clients than the peak target, saw {}",
        report.peak_active
    );
    // The plan governs the run length, within scheduler tick and drain granularity.
    assert!(elapsed >= Duration::from_millis(3500));
    assert!(elapsed < Duration::from_secs(10), "run took {elapsed:?}");

    assert!(report.summary.metrics.contains_key("http_req_duration"));
    assert!(report.summary.metrics.contains_key("iteration_duration"));
    assert!(report.summary.passed);
}

#[test]
fn failing_iterations_fail_the_failure_rate_threshold() {
    fn behaviour(_ctx: &mut ClientContext<RunnerContextValue, ClientContextValue>) -> HookResult {
        std::thread::sleep(Duration::from_millis(5));
        Err(anyhow::anyhow!("the request blew up"))
    }

    let mut cli = sample_cli_cfg();
    cli.stages = vec![Stage::new(Duration::from_millis(500), 3)];

    let report = run(
        scenario("failing_iterations_fail_the_failure_rate_threshold", cli)
            .use_threshold("iteration_failed", "rate<0.01")
            .use_client_behaviour(behaviour),
    )
    .unwrap();

    // Iteration errors are contained and recorded, never propagated.
    assert_eq!(report.state, RunState::Completed);
    assert!(!report.verdict);
    assert_eq!(report.outcomes.len(), 1);
    assert!(!report.outcomes[0].passed);
}

#[test]
fn fatal_breach_aborts_the_run_early() {
    fn behaviour(_ctx: &mut ClientContext<RunnerContextValue, ClientContextValue>) -> HookResult {
        std::thread::sleep(Duration::from_millis(5));
        Err(anyhow::anyhow!("the request blew up"))
    }

    let mut cli = sample_cli_cfg();
    cli.abort_on_breach = true;
    // Long enough that only an abort can end the run quickly.
    cli.stages = vec![Stage::new(Duration::from_secs(60), 3)];

    let started = Instant::now();
    let report = run(
        scenario("fatal_breach_aborts_the_run_early", cli)
            .use_threshold("iteration_failed", "rate<0.5")
            .use_client_behaviour(behaviour),
    )
    .unwrap();

    assert_eq!(report.state, RunState::Aborted);
    assert!(!report.verdict);
    assert!(report.summary.aborted);
    assert!(
        started.elapsed() < Duration::from_secs(30),
        "the abort should cut the 60s plan short"
    );
}

#[test]
fn ramp_down_to_zero_drains_every_client() {
    fn behaviour(_ctx: &mut ClientContext<RunnerContextValue, ClientContextValue>) -> HookResult {
        std::thread::sleep(Duration::from_millis(10));
        Ok(())
    }

    let mut cli = sample_cli_cfg();
    cli.stages = vec![
        Stage::new(Duration::from_millis(400), 5),
        Stage::new(Duration::from_millis(400), 0),
    ];

    let report = run(
        scenario("ramp_down_to_zero_drains_every_client", cli).use_client_behaviour(behaviour),
    )
    .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert!(!report.drain_timed_out);
}

#[test]
fn checks_are_recorded_as_opaque_rate_metrics() {
    fn behaviour(ctx: &mut ClientContext<RunnerContextValue, ClientContextValue>) -> HookResult {
        std::thread::sleep(Duration::from_millis(5));
        ctx.record_check("is status 201", true);
        ctx.record_check("response body has orderId", true);
        Ok(())
    }

    let mut cli = sample_cli_cfg();
    cli.stages = vec![Stage::new(Duration::from_millis(400), 2)];

    let report = run(
        scenario("checks_are_recorded_as_opaque_rate_metrics", cli)
            .use_threshold("check.is status 201", "rate>0.99")
            .use_client_behaviour(behaviour),
    )
    .unwrap();

    assert!(report.verdict);
    assert!(report
        .summary
        .metrics
        .contains_key("check.response body has orderId"));
}

#[test]
fn a_client_can_stop_the_whole_run() {
    fn behaviour(ctx: &mut ClientContext<RunnerContextValue, ClientContextValue>) -> HookResult {
        if ctx.get().iterations < 5 {
            ctx.get_mut().iterations += 1;
        } else {
            // Save time running this test by shutting down once this has run a few times.
            ctx.runner_context().force_stop_run();
        }
        std::thread::sleep(Duration::from_millis(5));
        Ok(())
    }

    let mut cli = sample_cli_cfg();
    cli.stages = vec![Stage::new(Duration::from_secs(60), 1)];

    let started = Instant::now();
    let report = run(
        scenario("a_client_can_stop_the_whole_run", cli).use_client_behaviour(behaviour),
    )
    .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert!(
        started.elapsed() < Duration::from_secs(30),
        "the forced stop should cut the 60s plan short"
    );
}

use std::time::Duration;

use gust_instruments::ThresholdRule;

use crate::cli::GustScenarioCli;
use crate::context::{ClientContext, RunnerContext, UserValuesConstraint};
use crate::stage::{Stage, StagePlan};

pub type HookResult = anyhow::Result<()>;

pub type GlobalHookMut<RV> = fn(&mut RunnerContext<RV>) -> HookResult;
pub type ClientHookMut<RV, V> = fn(&mut ClientContext<RV, V>) -> HookResult;

const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// The builder for a scenario definition.
///
/// This must be used at the start of a load test to declare the scenario to run: the
/// concurrency plan, the thresholds to judge the run by, and the behaviour each simulated
/// client loops over. Command line arguments always win over the defaults declared here.
pub struct ScenarioDefinitionBuilder<RV: UserValuesConstraint, V: UserValuesConstraint> {
    /// The name of the scenario, which should be unique within the test suite.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    cli: GustScenarioCli,
    default_stages: Vec<Stage>,
    default_clients: Option<usize>,
    default_duration_s: Option<u64>,
    thresholds: Vec<(String, String)>,
    drain_timeout: Duration,
    /// Global setup hook. Runs once, before any client is started.
    setup_fn: Option<GlobalHookMut<RV>>,
    /// Setup hook for a client, run once as that client starts.
    setup_client_fn: Option<ClientHookMut<RV, V>>,
    /// The behaviour every client loops over. One call is one iteration.
    client_behaviour: Option<ClientHookMut<RV, V>>,
}

pub(crate) struct ScenarioDefinition<RV: UserValuesConstraint, V: UserValuesConstraint> {
    pub name: String,
    pub connection_string: Option<String>,
    pub plan: StagePlan,
    pub rules: Vec<ThresholdRule>,
    pub drain_timeout: Duration,
    pub no_progress: bool,
    pub reporter: crate::cli::ReporterOpt,
    pub summary_path: Option<std::path::PathBuf>,
    pub run_id: String,
    pub setup_fn: Option<GlobalHookMut<RV>>,
    pub setup_client_fn: Option<ClientHookMut<RV, V>>,
    pub client_behaviour: ClientHookMut<RV, V>,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ScenarioDefinitionBuilder<RV, V> {
    /// Initialise a new scenario definition from the scenario name and command line
    /// arguments. See [ScenarioDefinitionBuilder::name] for advice on the name.
    pub fn new(name: &str, cli: GustScenarioCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            default_stages: Vec::new(),
            default_clients: None,
            default_duration_s: None,
            thresholds: Vec::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            setup_fn: None,
            setup_client_fn: None,
            client_behaviour: None,
        }
    }

    /// Declare the stage plan this scenario runs with when no `--stage` flags are given.
    pub fn with_default_stages(mut self, stages: Vec<Stage>) -> Self {
        self.default_stages = stages;
        self
    }

    /// Declare flat-mode defaults: hold `clients` for `duration_s` seconds, used when no
    /// stage plan is given on the command line or via
    /// [ScenarioDefinitionBuilder::with_default_stages].
    pub fn with_default_clients(mut self, clients: usize) -> Self {
        self.default_clients = Some(clients);
        self
    }

    pub fn with_default_duration_s(mut self, duration_s: u64) -> Self {
        self.default_duration_s = Some(duration_s);
        self
    }

    /// Declare a threshold on a metric, for example
    /// `use_threshold("http_req_failed", "rate<0.01")`. Repeatable, including for the same
    /// metric. Validated when the run starts; a malformed predicate fails the run before
    /// any client is created.
    pub fn use_threshold(mut self, metric: &str, predicate: &str) -> Self {
        self.thresholds
            .push((metric.to_string(), predicate.to_string()));
        self
    }

    /// Override the grace period for clients to finish their current iteration at the end
    /// of the run. Defaults to 30 seconds; `--drain-timeout` wins over this.
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Set the global setup hook [ScenarioDefinitionBuilder::setup_fn] for this scenario.
    pub fn use_setup(mut self, setup_fn: GlobalHookMut<RV>) -> Self {
        self.setup_fn = Some(setup_fn);
        self
    }

    /// Set the client setup hook [ScenarioDefinitionBuilder::setup_client_fn] for this
    /// scenario.
    pub fn use_client_setup(mut self, setup_client_fn: ClientHookMut<RV, V>) -> Self {
        self.setup_client_fn = Some(setup_client_fn);
        self
    }

    /// Set the behaviour [ScenarioDefinitionBuilder::client_behaviour] that every client
    /// loops over.
    pub fn use_client_behaviour(mut self, behaviour: ClientHookMut<RV, V>) -> Self {
        self.client_behaviour = Some(behaviour);
        self
    }

    pub(crate) fn build(self) -> anyhow::Result<ScenarioDefinition<RV, V>> {
        let client_behaviour = self
            .client_behaviour
            .ok_or_else(|| anyhow::anyhow!("Scenario [{}] has no client behaviour", self.name))?;

        let plan = Self::resolve_plan(&self.cli, self.default_stages, self.default_clients, self.default_duration_s)?;

        let rules = self
            .thresholds
            .iter()
            .map(|(metric, predicate)| {
                let mut rule = ThresholdRule::parse(metric, predicate)?;
                rule.abort_on_breach = self.cli.abort_on_breach;
                Ok(rule)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let drain_timeout = self
            .cli
            .drain_timeout
            .map(Duration::from_secs)
            .unwrap_or(self.drain_timeout);

        Ok(ScenarioDefinition {
            name: self.name,
            connection_string: self.cli.connection_string,
            plan,
            rules,
            drain_timeout,
            no_progress: self.cli.no_progress,
            reporter: self.cli.reporter,
            summary_path: self.cli.summary_path,
            run_id: self
                .cli
                .run_id
                .unwrap_or_else(|| nanoid::nanoid!()),
            setup_fn: self.setup_fn,
            setup_client_fn: self.setup_client_fn,
            client_behaviour,
        })
    }

    /// Stage lists always govern the run length. A standalone duration is only honoured in
    /// flat mode; when both appear the duration is ignored with a warning, not guessed at.
    fn resolve_plan(
        cli: &GustScenarioCli,
        default_stages: Vec<Stage>,
        default_clients: Option<usize>,
        default_duration_s: Option<u64>,
    ) -> anyhow::Result<StagePlan> {
        let stages = if cli.stages.is_empty() {
            default_stages
        } else {
            cli.stages.clone()
        };

        if !stages.is_empty() {
            if cli.duration.is_some() {
                log::warn!(
                    "Both a stage plan and --duration were given; the stage plan governs and the duration is ignored"
                );
            }
            if cli.clients.is_some() {
                log::warn!(
                    "Both a stage plan and --clients were given; the stage plan governs and the client count is ignored"
                );
            }
            return StagePlan::new(stages);
        }

        let clients = cli
            .clients
            .or(default_clients)
            .ok_or_else(|| anyhow::anyhow!("No stage plan and no client count configured"))?;
        let duration_s = cli
            .duration
            .or(default_duration_s)
            .ok_or_else(|| anyhow::anyhow!("No stage plan and no duration configured"))?;

        StagePlan::flat(clients, Duration::from_secs(duration_s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::ReporterOpt;
    use crate::stage::Stage;
    use pretty_assertions::assert_eq;

    #[derive(Default, Debug)]
    struct NoValue {}
    impl UserValuesConstraint for NoValue {}

    fn behaviour(_ctx: &mut ClientContext<NoValue, NoValue>) -> HookResult {
        Ok(())
    }

    fn cli() -> GustScenarioCli {
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

    fn builder(cli: GustScenarioCli) -> ScenarioDefinitionBuilder<NoValue, NoValue> {
        ScenarioDefinitionBuilder::new("definition_tests", cli).use_client_behaviour(behaviour)
    }

    #[test]
    fn cli_stages_override_scenario_defaults() {
        let mut cli = cli();
        cli.stages = vec![Stage::new(Duration::from_secs(1), 5)];

        let definition = builder(cli)
            .with_default_stages(vec![Stage::new(Duration::from_secs(60), 500)])
            .build()
            .unwrap();

        assert_eq!(definition.plan.total_duration(), Duration::from_secs(1));
        assert_eq!(definition.plan.peak_target(), 5);
    }

    #[test]
    fn stage_plan_governs_over_a_standalone_duration() {
        let mut cli = cli();
        cli.stages = vec![Stage::new(Duration::from_secs(2), 5)];
        cli.duration = Some(600);

        let definition = builder(cli).build().unwrap();
        assert_eq!(definition.plan.total_duration(), Duration::from_secs(2));
    }

    #[test]
    fn flat_mode_requires_both_clients_and_duration() {
        let mut only_clients = cli();
        only_clients.clients = Some(10);
        assert!(builder(only_clients).build().is_err());

        let mut both = cli();
        both.clients = Some(10);
        both.duration = Some(30);
        let definition = builder(both).build().unwrap();
        assert_eq!(definition.plan.peak_target(), 10);
        assert_eq!(definition.plan.total_duration(), Duration::from_secs(30));
    }

    #[test]
    fn a_scenario_without_behaviour_does_not_build() {
        let result =
            ScenarioDefinitionBuilder::<NoValue, NoValue>::new("no_behaviour", cli()).build();
        assert!(result.is_err());
    }

    #[test]
    fn malformed_threshold_predicates_fail_the_build() {
        let result = builder(cli())
            .with_default_clients(1)
            .with_default_duration_s(1)
            .use_threshold("http_req_failed", "rate~0.01")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn abort_on_breach_marks_every_rule_fatal() {
        let mut cli = cli();
        cli.abort_on_breach = true;
        cli.clients = Some(1);
        cli.duration = Some(1);

        let definition = builder(cli)
            .use_threshold("http_req_failed", "rate<0.01")
            .build()
            .unwrap();
        assert!(definition.rules[0].abort_on_breach);
    }
}

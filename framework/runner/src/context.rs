use std::collections::HashMap;
use std::{fmt::Debug, sync::Arc};

use gust_core::prelude::{DelegatedShutdownListener, ShutdownHandle};
use gust_instruments::Recorder;

use crate::executor::Executor;

/// Values that scenarios attach to the runner and client contexts must be safe to share
/// across client threads and constructible without input.
pub trait UserValuesConstraint: Default + Debug + Send + Sync + 'static {}

/// Run-wide state shared by every client: the executor for async work, the metrics
/// recorder, and whatever the scenario's global setup hook put in its value.
pub struct RunnerContext<RV: UserValuesConstraint> {
    executor: Arc<Executor>,
    recorder: Arc<Recorder>,
    shutdown_handle: ShutdownHandle,
    connection_string: Option<String>,
    run_id: String,
    value: RV,
}

impl<RV: UserValuesConstraint> RunnerContext<RV> {
    pub(crate) fn new(
        executor: Arc<Executor>,
        recorder: Arc<Recorder>,
        shutdown_handle: ShutdownHandle,
        connection_string: Option<String>,
        run_id: String,
    ) -> Self {
        Self {
            executor,
            recorder,
            shutdown_handle,
            connection_string,
            run_id,
            value: Default::default(),
        }
    }

    pub fn executor(&self) -> &Arc<Executor> {
        &self.executor
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    /// The connection string passed on the command line, if any.
    pub fn get_connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Ask the whole run to stop early. Clients finish their current iteration first.
    pub fn force_stop_run(&self) {
        self.shutdown_handle.shutdown();
    }

    pub fn get_mut(&mut self) -> &mut RV {
        &mut self.value
    }

    pub fn get(&self) -> &RV {
        &self.value
    }
}

/// Per-client state: the client's identity, its view of the run, and the named boolean
/// checks the scenario attaches to the current iteration.
pub struct ClientContext<RV: UserValuesConstraint, V: UserValuesConstraint> {
    client_id: String,
    runner_context: Arc<RunnerContext<RV>>,
    shutdown_listener: DelegatedShutdownListener,
    checks: HashMap<String, bool>,
    value: V,
}

impl<RV: UserValuesConstraint, V: UserValuesConstraint> ClientContext<RV, V> {
    pub(crate) fn new(
        client_id: String,
        runner_context: Arc<RunnerContext<RV>>,
        shutdown_listener: DelegatedShutdownListener,
    ) -> Self {
        Self {
            client_id,
            runner_context,
            shutdown_listener,
            checks: HashMap::new(),
            value: Default::default(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn runner_context(&self) -> &Arc<RunnerContext<RV>> {
        &self.runner_context
    }

    pub fn shutdown_listener(&mut self) -> &mut DelegatedShutdownListener {
        &mut self.shutdown_listener
    }

    /// Attach a named boolean check to the current iteration. The engine records it
    /// verbatim and never interprets what the check means.
    pub fn record_check(&mut self, name: &str, passed: bool) {
        self.checks.insert(name.to_string(), passed);
    }

    pub(crate) fn take_checks(&mut self) -> HashMap<String, bool> {
        std::mem::take(&mut self.checks)
    }

    pub fn get_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn get(&self) -> &V {
        &self.value
    }
}

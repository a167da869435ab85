mod cli;
mod context;
mod definition;
mod executor;
mod init;
mod monitor;
mod pool;
mod progress;
mod run;
mod shutdown;
mod stage;
mod types;

pub mod prelude {
    pub use crate::cli::{GustScenarioCli, ReporterOpt};
    pub use crate::context::{ClientContext, RunnerContext, UserValuesConstraint};
    pub use crate::definition::{HookResult, ScenarioDefinitionBuilder};
    pub use crate::init::init;
    pub use crate::run::{run, RunReport, RunState};
    pub use crate::stage::{Stage, StagePlan};
    pub use crate::types::GustResult;

    pub use gust_core::prelude::*;
    pub use gust_instruments::{OperationTimer, Recorder};
}

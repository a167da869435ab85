use crate::cli::GustScenarioCli;
use clap::Parser;

/// Initialise logging and parse the command line for a scenario binary.
pub fn init() -> GustScenarioCli {
    env_logger::init();

    GustScenarioCli::parse()
}

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::stage::Stage;

/// Where the end-of-run results should be sent.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReporterOpt {
    /// Print summary tables to stdout at the end of the run.
    #[default]
    Summary,
    /// Discard the report. Mostly useful in tests.
    Noop,
}

#[derive(Parser, Debug, Clone)]
#[command(about, long_about = None)]
pub struct GustScenarioCli {
    /// A connection string for the service to test
    #[clap(short, long)]
    pub connection_string: Option<String>,

    /// One stage of the concurrency ramp, as `<duration>:<target>`. For example
    /// `--stage 5s:50` ramps to 50 clients over 5 seconds.
    ///
    /// Repeat the flag to build a multi-stage plan; the stages run in the order given and
    /// the list overrides any stage plan the scenario declares as its default. When any
    /// stages are given they govern the run length and `--duration` is ignored.
    #[clap(long = "stage", value_parser = parse_stage)]
    pub stages: Vec<Stage>,

    /// The number of clients to hold for the whole run (flat mode, no ramping)
    #[clap(long)]
    pub clients: Option<usize>,

    /// The number of seconds to run for in flat mode
    #[clap(long)]
    pub duration: Option<u64>,

    /// Abort the run as soon as any declared threshold is breached, instead of only
    /// reporting breaches in the final verdict
    #[clap(long, default_value = "false")]
    pub abort_on_breach: bool,

    /// Grace period in seconds for clients to finish their current iteration at the end of
    /// the run
    #[clap(long)]
    pub drain_timeout: Option<u64>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being
    /// looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Where to send the results of the run
    #[clap(long, value_enum, default_value_t = ReporterOpt::Summary)]
    pub reporter: ReporterOpt,

    /// Also write the run summary as JSON to this path
    #[clap(long)]
    pub summary_path: Option<PathBuf>,

    /// An id for this run, to correlate results across systems. Generated if not provided.
    #[clap(long)]
    pub run_id: Option<String>,
}

fn parse_stage(s: &str) -> anyhow::Result<Stage> {
    let (duration, target) = s
        .split_once(':')
        .ok_or_else(|| anyhow::anyhow!("Stage [{s}] must look like `<duration>:<target>`"))?;

    let target = target
        .trim()
        .parse::<usize>()
        .map_err(|_| anyhow::anyhow!("Stage [{s}] has a malformed target"))?;

    Ok(Stage::new(parse_duration(duration)?, target))
}

/// Accepts `90`, `90s`, `1500ms` or `2m`.
fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();

    let (number, unit): (&str, fn(u64) -> Duration) = if let Some(rest) = s.strip_suffix("ms") {
        (rest, Duration::from_millis)
    } else if let Some(rest) = s.strip_suffix('s') {
        (rest, Duration::from_secs)
    } else if let Some(rest) = s.strip_suffix('m') {
        (rest, |m| Duration::from_secs(m * 60))
    } else {
        (s, Duration::from_secs)
    };

    let number = number
        .trim()
        .parse::<u64>()
        .map_err(|_| anyhow::anyhow!("Malformed duration [{s}]"))?;

    Ok(unit(number))
}

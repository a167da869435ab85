mod metrics;
pub mod report;
mod threshold;

pub use metrics::{MetricSnapshot, RateSnapshot, Recorder, TrendSnapshot};
pub use report::{ReportConfig, Reporter};
pub use threshold::{
    Comparison, Predicate, ThresholdEvaluator, ThresholdOutcome, ThresholdRule,
};

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The result of one completed scenario iteration, as reported by a client task.
///
/// Produced exactly once per iteration and handed to the [Recorder] unmodified. The checks
/// are opaque named booleans attached by the scenario; the engine never interprets what a
/// particular check means.
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub duration: Duration,
    pub failed: bool,
    pub checks: HashMap<String, bool>,
}

/// Times one operation inside a scenario, in the style of a stopwatch.
///
/// Create one just before issuing a request and hand it back with the outcome to record a
/// duration sample and a failure-rate sample under the operation's metric names.
pub struct OperationTimer {
    metric: String,
    started: Instant,
}

impl OperationTimer {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            started: Instant::now(),
        }
    }

    /// Record the elapsed time under `<metric>_duration` and the outcome under
    /// `<metric>_failed`.
    pub fn finish<T, E>(self, recorder: &Recorder, outcome: &Result<T, E>) {
        let elapsed = self.started.elapsed();
        recorder.record_duration(format!("{}_duration", self.metric), elapsed);
        recorder.record_rate(format!("{}_failed", self.metric), outcome.is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Summary of a run
///
/// This is the machine-readable counterpart of the console summary, intended for CI jobs
/// that archive results or gate merges on the verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    /// The unique run id
    ///
    /// Chosen by the runner. Unique for each run.
    pub run_id: String,
    /// The name of the scenario that was run
    pub scenario_name: String,
    /// The time the run started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// The total planned duration of the stage plan, in seconds
    pub planned_duration_s: u64,
    /// The highest concurrency target declared by any stage
    pub peak_clients: usize,
    /// Whether the run had to force-discard clients that did not stop within the drain
    /// timeout
    pub drain_timed_out: bool,
    /// Whether the run was aborted early by a fatal threshold breach
    pub aborted: bool,
    /// Aggregates for every recorded metric, keyed by metric name
    pub metrics: HashMap<String, MetricSummary>,
    /// The outcome of each declared threshold
    pub thresholds: Vec<ThresholdSummary>,
    /// Overall verdict: true only if every threshold held for the whole run
    pub passed: bool,
}

impl RunSummary {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Aggregate values for one metric at the end of the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricSummary {
    Trend {
        count: u64,
        avg_ms: f64,
        min_ms: f64,
        p50_ms: f64,
        p95_ms: f64,
        p99_ms: f64,
        max_ms: f64,
    },
    Rate {
        total: u64,
        occurred: u64,
        rate: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThresholdSummary {
    pub metric: String,
    pub predicate: String,
    pub passed: bool,
}

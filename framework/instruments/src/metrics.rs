use std::collections::HashMap;
use std::time::Duration;

use hdrhistogram::Histogram;
use parking_lot::RwLock;

use crate::IterationResult;

/// Histogram bounds in microseconds: 1us up to one minute, at 3 significant figures.
///
/// Three significant figures bound the quantile error at 0.1% of the reported value, which
/// is far below the resolution any latency threshold is declared at. Values over the upper
/// bound are clamped rather than dropped.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

enum Aggregate {
    Trend(TrendAggregate),
    Rate(RateAggregate),
}

struct TrendAggregate {
    count: u64,
    sum_us: u64,
    min_us: u64,
    max_us: u64,
    histogram: Histogram<u64>,
}

impl TrendAggregate {
    fn new() -> Self {
        Self {
            count: 0,
            sum_us: 0,
            min_us: u64::MAX,
            max_us: 0,
            histogram: Histogram::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG)
                .expect("histogram bounds are valid"),
        }
    }

    fn ingest(&mut self, value_us: u64) {
        self.count += 1;
        self.sum_us += value_us;
        self.min_us = self.min_us.min(value_us);
        self.max_us = self.max_us.max(value_us);
        self.histogram.saturating_record(value_us.max(HIST_LOW));
    }
}

struct RateAggregate {
    total: u64,
    occurred: u64,
}

/// Concurrency-safe sink for per-iteration samples.
///
/// All client tasks record into the same instance. Every sample takes the write lock, so
/// each update lands atomically and exactly once; ingestion order across tasks carries no
/// meaning and the aggregates do not depend on it. [Recorder::snapshot] copies the current
/// aggregate out under the read lock so threshold evaluation never holds up ingestion.
pub struct Recorder {
    metrics: RwLock<HashMap<String, Aggregate>>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Append one duration sample to the named trend metric.
    pub fn record_duration(&self, metric: impl Into<String>, duration: Duration) {
        let metric = metric.into();
        let value_us = duration.as_micros().min(u64::MAX as u128) as u64;

        let mut metrics = self.metrics.write();
        match metrics
            .entry(metric)
            .or_insert_with(|| Aggregate::Trend(TrendAggregate::new()))
        {
            Aggregate::Trend(trend) => trend.ingest(value_us),
            Aggregate::Rate(_) => {
                log::warn!("Dropping duration sample recorded against a rate metric");
            }
        }
    }

    /// Count one occurrence (or non-occurrence) against the named rate metric.
    pub fn record_rate(&self, metric: impl Into<String>, occurred: bool) {
        let metric = metric.into();

        let mut metrics = self.metrics.write();
        match metrics.entry(metric).or_insert_with(|| {
            Aggregate::Rate(RateAggregate {
                total: 0,
                occurred: 0,
            })
        }) {
            Aggregate::Rate(rate) => {
                rate.total += 1;
                if occurred {
                    rate.occurred += 1;
                }
            }
            Aggregate::Trend(_) => {
                log::warn!("Dropping rate sample recorded against a trend metric");
            }
        }
    }

    /// Ingest one completed iteration under the engine's built-in metric names:
    /// `iteration_duration`, `iteration_failed`, and `check.<name>` per attached check.
    pub fn record_iteration(&self, result: &IterationResult) {
        self.record_duration("iteration_duration", result.duration);
        self.record_rate("iteration_failed", result.failed);
        for (name, passed) in &result.checks {
            self.record_rate(format!("check.{name}"), *passed);
        }
    }

    /// Point-in-time copy of the named metric's aggregate, or None if nothing has been
    /// recorded against it yet.
    pub fn snapshot(&self, metric: &str) -> Option<MetricSnapshot> {
        let metrics = self.metrics.read();
        metrics.get(metric).map(Aggregate::snapshot)
    }

    /// Snapshots of every metric, sorted by name for stable reporting.
    pub fn snapshot_all(&self) -> Vec<(String, MetricSnapshot)> {
        let metrics = self.metrics.read();
        let mut all = metrics
            .iter()
            .map(|(name, aggregate)| (name.clone(), aggregate.snapshot()))
            .collect::<Vec<_>>();
        all.sort_by(|(a, _), (b, _)| a.cmp(b));
        all
    }
}

impl Aggregate {
    fn snapshot(&self) -> MetricSnapshot {
        match self {
            Aggregate::Trend(trend) => MetricSnapshot::Trend(TrendSnapshot {
                count: trend.count,
                sum_ms: trend.sum_us as f64 / 1000.0,
                min_ms: if trend.count == 0 {
                    0.0
                } else {
                    trend.min_us as f64 / 1000.0
                },
                max_ms: trend.max_us as f64 / 1000.0,
                histogram: trend.histogram.clone(),
            }),
            Aggregate::Rate(rate) => MetricSnapshot::Rate(RateSnapshot {
                total: rate.total,
                occurred: rate.occurred,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MetricSnapshot {
    Trend(TrendSnapshot),
    Rate(RateSnapshot),
}

#[derive(Clone)]
pub struct TrendSnapshot {
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    histogram: Histogram<u64>,
}

impl std::fmt::Debug for TrendSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrendSnapshot")
            .field("count", &self.count)
            .field("sum_ms", &self.sum_ms)
            .field("min_ms", &self.min_ms)
            .field("max_ms", &self.max_ms)
            .finish_non_exhaustive()
    }
}

impl TrendSnapshot {
    pub fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms / self.count as f64
        }
    }

    /// The value in milliseconds below which `percent`% of samples fall.
    pub fn percentile_ms(&self, percent: f64) -> f64 {
        self.histogram.value_at_quantile(percent / 100.0) as f64 / 1000.0
    }
}

#[derive(Debug, Clone)]
pub struct RateSnapshot {
    pub total: u64,
    pub occurred: u64,
}

impl RateSnapshot {
    /// Fraction of samples for which the tracked event occurred, in `0.0..=1.0`.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.occurred as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn concurrent_ingestion_loses_nothing() {
        let recorder = Arc::new(Recorder::new());
        let threads = 8;
        let per_thread = 500;

        let handles = (0..threads)
            .map(|_| {
                let recorder = recorder.clone();
                std::thread::spawn(move || {
                    for i in 0..per_thread {
                        recorder.record_duration("op_duration", Duration::from_millis(i % 50));
                        recorder.record_rate("op_failed", i % 10 == 0);
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let expected = threads * per_thread;
        match recorder.snapshot("op_duration").unwrap() {
            MetricSnapshot::Trend(trend) => assert_eq!(trend.count, expected),
            other => panic!("expected trend snapshot, got {other:?}"),
        }
        match recorder.snapshot("op_failed").unwrap() {
            MetricSnapshot::Rate(rate) => {
                assert_eq!(rate.total, expected);
                assert_eq!(rate.occurred, expected / 10);
            }
            other => panic!("expected rate snapshot, got {other:?}"),
        }
    }

    #[test]
    fn trend_snapshot_answers_percentiles() {
        let recorder = Recorder::new();
        for ms in 1..=100u64 {
            recorder.record_duration("latency", Duration::from_millis(ms));
        }

        let MetricSnapshot::Trend(trend) = recorder.snapshot("latency").unwrap() else {
            panic!("expected trend snapshot");
        };
        assert_eq!(trend.count, 100);
        assert_eq!(trend.max_ms, 100.0);
        assert_eq!(trend.min_ms, 1.0);

        // 3 significant figures keeps the p95 within 0.1% of the true 95ms.
        let p95 = trend.percentile_ms(95.0);
        assert!((p95 - 95.0).abs() < 1.0, "p95 was {p95}");
    }

    #[test]
    fn rate_of_two_failures_in_one_hundred() {
        let recorder = Recorder::new();
        for i in 0..100 {
            recorder.record_rate("http_req_failed", i < 2);
        }

        let MetricSnapshot::Rate(rate) = recorder.snapshot("http_req_failed").unwrap() else {
            panic!("expected rate snapshot");
        };
        assert_eq!(rate.rate(), 0.02);
    }

    #[test]
    fn iteration_results_fan_out_to_builtin_metrics() {
        let recorder = Recorder::new();
        recorder.record_iteration(&IterationResult {
            duration: Duration::from_millis(50),
            failed: false,
            checks: [("is status 201".to_string(), true)].into_iter().collect(),
        });

        assert!(recorder.snapshot("iteration_duration").is_some());
        assert!(recorder.snapshot("iteration_failed").is_some());
        assert!(recorder.snapshot("check.is status 201").is_some());
    }

    #[test]
    fn mismatched_sample_kind_is_dropped_not_corrupted() {
        let recorder = Recorder::new();
        recorder.record_rate("mixed", true);
        recorder.record_duration("mixed", Duration::from_millis(5));

        let MetricSnapshot::Rate(rate) = recorder.snapshot("mixed").unwrap() else {
            panic!("expected rate snapshot");
        };
        assert_eq!(rate.total, 1);
    }
}

mod metrics_table;

use tabled::settings::Style;
use tabled::Table;

use crate::metrics::{MetricSnapshot, Recorder};
use crate::report::summary_report::metrics_table::{RateRow, ThresholdRow, TrendRow};
use crate::report::ReportCollector;
use crate::threshold::ThresholdOutcome;

/// Prints a console summary of every metric and threshold at the end of the run.
pub struct SummaryReportCollector {}

impl SummaryReportCollector {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for SummaryReportCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportCollector for SummaryReportCollector {
    fn finalize(&self, recorder: &Recorder, outcomes: &[ThresholdOutcome], verdict: bool) {
        let mut trend_rows = Vec::new();
        let mut rate_rows = Vec::new();

        for (name, snapshot) in recorder.snapshot_all() {
            match snapshot {
                MetricSnapshot::Trend(trend) => trend_rows.push(TrendRow {
                    metric: name,
                    count: trend.count,
                    avg_ms: trend.avg_ms(),
                    min_ms: trend.min_ms,
                    p50_ms: trend.percentile_ms(50.0),
                    p95_ms: trend.percentile_ms(95.0),
                    p99_ms: trend.percentile_ms(99.0),
                    max_ms: trend.max_ms,
                }),
                MetricSnapshot::Rate(rate) => rate_rows.push(RateRow {
                    metric: name,
                    total: rate.total,
                    occurred: rate.occurred,
                    rate_percent: rate.rate() * 100.0,
                }),
            }
        }

        if !trend_rows.is_empty() {
            println!("\nSummary of trend metrics");
            let mut table = Table::new(&trend_rows);
            table.with(Style::modern());
            println!("{table}");
        }

        if !rate_rows.is_empty() {
            println!("\nSummary of rate metrics");
            let mut table = Table::new(&rate_rows);
            table.with(Style::modern());
            println!("{table}");
        }

        if !outcomes.is_empty() {
            println!("\nThresholds");
            let rows = outcomes
                .iter()
                .map(|outcome| ThresholdRow {
                    metric: outcome.metric.clone(),
                    predicate: outcome.predicate.clone(),
                    result: if outcome.passed { "pass" } else { "FAIL" }.to_string(),
                })
                .collect::<Vec<_>>();
            let mut table = Table::new(&rows);
            table.with(Style::modern());
            println!("{table}");
        }

        println!(
            "\nRun verdict: {}",
            if verdict { "PASS" } else { "FAIL" }
        );
    }
}

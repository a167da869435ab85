mod summary_report;

use crate::metrics::Recorder;
use crate::threshold::ThresholdOutcome;

pub use summary_report::SummaryReportCollector;

/// A destination for the end-of-run results.
pub trait ReportCollector {
    fn finalize(&self, recorder: &Recorder, outcomes: &[ThresholdOutcome], verdict: bool);
}

/// Choose where run results should be sent. By default nothing is reported, which is only
/// useful in tests; callers normally want at least the console summary.
#[derive(Default)]
pub struct ReportConfig {
    enable_summary: bool,
}

impl ReportConfig {
    /// Print a table of metric aggregates and threshold outcomes to stdout when the run
    /// finishes.
    pub fn enable_summary(mut self) -> Self {
        self.enable_summary = true;
        self
    }

    pub fn init(self) -> Reporter {
        let mut collectors: Vec<Box<dyn ReportCollector + Send + Sync>> = Vec::new();
        if self.enable_summary {
            collectors.push(Box::new(SummaryReportCollector::new()));
        }

        Reporter { collectors }
    }
}

pub struct Reporter {
    collectors: Vec<Box<dyn ReportCollector + Send + Sync>>,
}

impl Reporter {
    pub fn finalize(&self, recorder: &Recorder, outcomes: &[ThresholdOutcome], verdict: bool) {
        for collector in &self.collectors {
            collector.finalize(recorder, outcomes, verdict);
        }
    }
}

use std::fmt;
use std::str::FromStr;

use crate::metrics::{MetricSnapshot, Recorder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    LessThan,
    GreaterThan,
}

impl Comparison {
    fn holds(&self, actual: f64, bound: f64) -> bool {
        match self {
            Comparison::LessThan => actual < bound,
            Comparison::GreaterThan => actual > bound,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::LessThan => write!(f, "<"),
            Comparison::GreaterThan => write!(f, ">"),
        }
    }
}

/// One parsed threshold predicate, for example `rate<0.01` or `p(95)<700`.
///
/// Rate predicates compare the occurrence fraction of a rate metric. The others compare
/// millisecond values from a trend metric.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Rate(Comparison, f64),
    Percentile(f64, Comparison, f64),
    Avg(Comparison, f64),
    Max(Comparison, f64),
}

impl Predicate {
    /// Evaluate against a metric snapshot. A snapshot of the wrong kind fails the predicate
    /// outright, since the declaration does not match what the scenario records.
    fn holds(&self, snapshot: &MetricSnapshot) -> bool {
        match (self, snapshot) {
            (Predicate::Rate(cmp, bound), MetricSnapshot::Rate(rate)) => {
                cmp.holds(rate.rate(), *bound)
            }
            (Predicate::Percentile(percent, cmp, bound), MetricSnapshot::Trend(trend)) => {
                cmp.holds(trend.percentile_ms(*percent), *bound)
            }
            (Predicate::Avg(cmp, bound), MetricSnapshot::Trend(trend)) => {
                cmp.holds(trend.avg_ms(), *bound)
            }
            (Predicate::Max(cmp, bound), MetricSnapshot::Trend(trend)) => {
                cmp.holds(trend.max_ms, *bound)
            }
            _ => {
                log::warn!("Threshold predicate {self} does not match the metric's kind");
                false
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Rate(cmp, bound) => write!(f, "rate{cmp}{bound}"),
            Predicate::Percentile(percent, cmp, bound) => write!(f, "p({percent}){cmp}{bound}"),
            Predicate::Avg(cmp, bound) => write!(f, "avg{cmp}{bound}"),
            Predicate::Max(cmp, bound) => write!(f, "max{cmp}{bound}"),
        }
    }
}

impl FromStr for Predicate {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (lhs, cmp, rhs) = if let Some((lhs, rhs)) = s.split_once('<') {
            (lhs, Comparison::LessThan, rhs)
        } else if let Some((lhs, rhs)) = s.split_once('>') {
            (lhs, Comparison::GreaterThan, rhs)
        } else {
            anyhow::bail!("Threshold predicate [{s}] has no comparison operator");
        };

        let bound = rhs
            .trim()
            .parse::<f64>()
            .map_err(|_| anyhow::anyhow!("Threshold predicate [{s}] has a malformed bound"))?;
        if !bound.is_finite() {
            anyhow::bail!("Threshold predicate [{s}] has a non-finite bound");
        }

        match lhs.trim() {
            "rate" => Ok(Predicate::Rate(cmp, bound)),
            "avg" => Ok(Predicate::Avg(cmp, bound)),
            "max" => Ok(Predicate::Max(cmp, bound)),
            lhs => {
                let percent = lhs
                    .strip_prefix("p(")
                    .and_then(|rest| rest.strip_suffix(')'))
                    .and_then(|n| n.trim().parse::<f64>().ok())
                    .ok_or_else(|| {
                        anyhow::anyhow!("Threshold predicate [{s}] has an unknown aggregation")
                    })?;
                if !(0.0..=100.0).contains(&percent) {
                    anyhow::bail!("Percentile in threshold predicate [{s}] must be 0-100");
                }
                Ok(Predicate::Percentile(percent, cmp, bound))
            }
        }
    }
}

/// A declared service-level requirement on one metric.
#[derive(Debug, Clone)]
pub struct ThresholdRule {
    pub metric: String,
    pub predicate: Predicate,
    /// When set, a breach of this rule aborts the run instead of only failing the verdict.
    pub abort_on_breach: bool,
}

impl ThresholdRule {
    pub fn parse(metric: &str, predicate: &str) -> anyhow::Result<Self> {
        Ok(Self {
            metric: metric.to_string(),
            predicate: predicate.parse()?,
            abort_on_breach: false,
        })
    }
}

/// The final outcome of one rule across the whole run.
#[derive(Debug, Clone)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub predicate: String,
    pub passed: bool,
}

/// Evaluates every declared rule against live aggregates.
///
/// A rule that is ever observed in breach stays failed for the rest of the run, even if
/// later samples would satisfy it again. That matches the reading of a threshold as a hard
/// service-level requirement rather than a point-in-time health check.
pub struct ThresholdEvaluator {
    rules: Vec<ThresholdRule>,
    ever_failed: Vec<bool>,
}

impl ThresholdEvaluator {
    pub fn new(rules: Vec<ThresholdRule>) -> Self {
        let ever_failed = vec![false; rules.len()];
        Self { rules, ever_failed }
    }

    /// Evaluate every rule against the recorder's current aggregates. Returns true if a
    /// rule marked `abort_on_breach` is newly or still in breach.
    ///
    /// A rule whose metric has no samples yet is skipped; it neither passes nor fails until
    /// data arrives.
    pub fn evaluate(&mut self, recorder: &Recorder) -> bool {
        let mut fatal_breach = false;

        for (index, rule) in self.rules.iter().enumerate() {
            let Some(snapshot) = recorder.snapshot(&rule.metric) else {
                continue;
            };

            if !rule.predicate.holds(&snapshot) {
                if !self.ever_failed[index] {
                    log::warn!(
                        "Threshold breached: {} {}",
                        rule.metric,
                        rule.predicate
                    );
                }
                self.ever_failed[index] = true;
                if rule.abort_on_breach {
                    fatal_breach = true;
                }
            }
        }

        fatal_breach
    }

    /// Per-rule outcomes accumulated so far. A rule whose metric never received any samples
    /// counts as passed.
    pub fn outcomes(&self) -> Vec<ThresholdOutcome> {
        self.rules
            .iter()
            .zip(&self.ever_failed)
            .map(|(rule, failed)| ThresholdOutcome {
                metric: rule.metric.clone(),
                predicate: rule.predicate.to_string(),
                passed: !failed,
            })
            .collect()
    }

    /// Overall verdict: every rule must have held for the whole run.
    pub fn verdict(&self) -> bool {
        self.ever_failed.iter().all(|failed| !failed)
    }
}

use std::time::Duration;

use surge_metrics::{MetricSeriesSummary, TrendSummary};

use crate::thresholds_eval::ThresholdOutcome;

/// Request outcome counts plus latency for one slice of the run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutcomeTotals {
    pub requests: u64,
    pub successes: u64,
    pub errors_502: u64,
    pub errors_504: u64,
    pub errors_other: u64,
    pub retries: u64,
    /// Milliseconds.
    pub latency: TrendSummary,
}

impl OutcomeTotals {
    pub fn errors(&self) -> u64 {
        self.errors_502
            .saturating_add(self.errors_504)
            .saturating_add(self.errors_other)
    }

    /// `None` when no request completed.
    pub fn error_rate(&self) -> Option<f64> {
        surge_metrics::agg::rate_of(self.errors(), self.requests)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSummary {
    pub phase: String,
    pub totals: OutcomeTotals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioSummary {
    pub scenario: String,
    pub totals: OutcomeTotals,
    pub vus_max: u64,
    /// Phases in schedule order; phases without requests are omitted.
    pub phases: Vec<PhaseSummary>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub totals: OutcomeTotals,
    pub scenarios: Vec<ScenarioSummary>,
    pub thresholds: Vec<ThresholdOutcome>,
    /// Raw series snapshot, sorted by metric then tags.
    pub metrics: Vec<MetricSeriesSummary>,
    pub elapsed: Duration,
}

/// The two independent pass conditions of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub thresholds_passed: bool,
    pub zero_errors: bool,
}

impl Verdict {
    pub fn passed(self) -> bool {
        self.thresholds_passed && self.zero_errors
    }
}

impl RunSummary {
    pub fn verdict(&self) -> Verdict {
        Verdict {
            thresholds_passed: self.thresholds.iter().all(|t| t.passed),
            zero_errors: self.totals.errors() == 0,
        }
    }

    pub fn threshold_violations(&self) -> impl Iterator<Item = &ThresholdOutcome> {
        self.thresholds.iter().filter(|t| !t.passed)
    }
}

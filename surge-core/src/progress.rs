use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveMetrics {
    /// Requests/sec during the last progress interval.
    pub rps_now: f64,
    /// Error ratio during the last progress interval (0..=1).
    pub error_rate_now: f64,

    pub requests_total: u64,
    pub successes_total: u64,
    pub errors_502_total: u64,
    pub errors_504_total: u64,
    pub errors_other_total: u64,
    pub retries_total: u64,

    /// Latency across the scenario so far, milliseconds.
    pub latency_p95_ms: Option<f64>,
}

impl LiveMetrics {
    pub fn errors_total(&self) -> u64 {
        self.errors_502_total
            .saturating_add(self.errors_504_total)
            .saturating_add(self.errors_other_total)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageProgress {
    /// 1-based stage index.
    pub stage: usize,
    pub stages: usize,
    pub name: String,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ScenarioState {
    Pending,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Monotonic tick counter (1-based).
    pub tick: u64,
    /// Time since run start.
    pub elapsed: Duration,
    pub scenario: String,
    pub state: ScenarioState,
    /// Time since scenario start (zero while pending).
    pub scenario_elapsed: Duration,
    pub scenario_duration: Duration,
    pub active_vus: u64,
    pub stage: Option<StageProgress>,
    pub metrics: LiveMetrics,
}

pub type ProgressFn = Arc<dyn Fn(ProgressUpdate) + Send + Sync + 'static>;

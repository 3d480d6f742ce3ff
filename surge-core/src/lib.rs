#![forbid(unsafe_code)]

mod body_check;
mod config;
mod error;
mod metrics_agg;
mod outcome;
mod progress;
mod request_metrics;
mod runner;
mod summary;
mod thresholds;
mod thresholds_eval;
mod transport;

pub use body_check::{BodyCheck, BodyVerdict};
pub use config::{
    DEFAULT_DURATION, DEFAULT_PAUSE, DEFAULT_SCENARIO, DEFAULT_TIMEOUT, DEFAULT_VUS, Phase,
    PlanOptions, Ramp, RunConfig, RunPlan, ScenarioConfig, ScenarioExecutor, ScenarioExecutorKind,
    ScenarioOptions, resolve_plan, scenarios_from_options,
};
pub use error::{Error, Result};
pub use outcome::{ErrorKind, Observed, RequestOutcome, classify};
pub use progress::{LiveMetrics, ProgressFn, ProgressUpdate, ScenarioState, StageProgress};
pub use request_metrics::{
    BUILTIN_METRICS, ERROR_RATE, ERRORS_502, ERRORS_504, ERRORS_OTHER, HTTP_REQ_DURATION, HTTP_REQS,
    RETRY_TOTAL, RequestMetricIds, RequestSample, SUCCESS_COUNT, VUS, VUS_MAX,
};
pub use runner::{
    CONTROL_TICK, PROGRESS_TICK, PhaseSchedule, RequestExecutor, StageSnapshot, StopSignal,
    run_plan,
};
pub use summary::{OutcomeTotals, PhaseSummary, RunSummary, ScenarioSummary, Verdict};
pub use thresholds::{
    ThresholdAgg, ThresholdExpr, ThresholdOp, ThresholdSet, parse_threshold_expr,
    parse_threshold_metric_key, render_metric_key,
};
pub use thresholds_eval::{ThresholdOutcome, evaluate_thresholds};
pub use transport::{Transport, TransportError, TransportResponse};

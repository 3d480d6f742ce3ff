pub type Result<T> = std::result::Result<T, Error>;

/// Configuration and orchestration failures. Per-request failures never surface here;
/// they are recorded as outcomes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("no target URL configured (use --target or TARGET_URL)")]
    MissingTarget,

    #[error("invalid target URL `{0}` (expected an absolute http:// or https:// URL)")]
    InvalidTarget(String),

    #[error("`vus` must be a positive integer")]
    InvalidVus,

    #[error("`duration` must be a positive duration")]
    InvalidDuration,

    #[error("`timeout` must be a positive duration")]
    InvalidTimeout,

    #[error("invalid `executor` `{0}` (expected `constant-vus` or `ramping-vus`)")]
    InvalidExecutor(String),

    #[error("`stages` must be a non-empty array of {{ duration, target }} with a positive total duration")]
    InvalidStages,

    #[error("invalid ramp `{0}` (expected `linear` or `instant`)")]
    InvalidRamp(String),

    #[error("duplicate scenario name `{0}`")]
    DuplicateScenario(String),

    #[error("scenario name must not be empty")]
    EmptyScenarioName,

    #[error("invalid threshold for `{metric}`: {error}")]
    InvalidThreshold { metric: String, error: String },

    #[error("unknown metric `{0}` in thresholds (expected one of: {list})", list = crate::request_metrics::BUILTIN_METRICS.join(", "))]
    UnknownMetric(String),

    #[error("invalid header `{name}`: {error}")]
    InvalidHeader { name: String, error: String },

    #[error("invalid body check: {0}")]
    InvalidBodyCheck(String),
}

use std::collections::HashSet;
use std::time::Duration;

use crate::body_check::BodyCheck;
use crate::error::{Error, Result};
use crate::request_metrics::BUILTIN_METRICS;
use crate::runner::PhaseSchedule;
use crate::thresholds::{ThresholdSet, parse_threshold_expr};

/// Generous on purpose: gateway timeouts must surface as upstream 504s, not local cancellations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_PAUSE: Duration = Duration::from_millis(300);
pub const DEFAULT_DURATION: Duration = Duration::from_secs(30);
pub const DEFAULT_VUS: u64 = 1;
pub const DEFAULT_SCENARIO: &str = "default";

/// How concurrency moves from the previous phase's target to this phase's target.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Ramp {
    #[default]
    Linear,
    Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Phase {
    pub name: Option<String>,
    pub duration: Duration,
    pub target: u64,
    pub ramp: Ramp,
}

impl Phase {
    pub fn linear(duration: Duration, target: u64) -> Self {
        Self {
            name: None,
            duration,
            target,
            ramp: Ramp::Linear,
        }
    }

    pub fn instant(duration: Duration, target: u64) -> Self {
        Self {
            name: None,
            duration,
            target,
            ramp: Ramp::Instant,
        }
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioExecutor {
    /// A fixed number of VUs for `duration`.
    ConstantVus { vus: u64, duration: Duration },

    /// Ramp the number of active VUs up/down through `stages`.
    RampingVus { start_vus: u64, stages: Vec<Phase> },
}

/// Scenario executor kind (the string form used by plan files).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::EnumString, strum::Display)]
pub enum ScenarioExecutorKind {
    #[strum(serialize = "constant-vus", serialize = "constant")]
    ConstantVus,

    #[strum(serialize = "ramping-vus", serialize = "ramping")]
    RampingVus,
}

impl ScenarioExecutor {
    #[must_use]
    pub fn kind(&self) -> ScenarioExecutorKind {
        match self {
            Self::ConstantVus { .. } => ScenarioExecutorKind::ConstantVus,
            Self::RampingVus { .. } => ScenarioExecutorKind::RampingVus,
        }
    }

    #[must_use]
    pub fn schedule(&self) -> PhaseSchedule {
        match self {
            Self::ConstantVus { vus, duration } => PhaseSchedule::new(
                0,
                vec![Phase::instant(*duration, *vus).named(CONSTANT_PHASE)],
            ),
            Self::RampingVus { start_vus, stages } => {
                PhaseSchedule::new(*start_vus, stages.clone())
            }
        }
    }
}

const CONSTANT_PHASE: &str = "steady";

#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioConfig {
    pub name: String,
    /// Extra metric tags for every request of this scenario.
    pub tags: Vec<(String, String)>,
    /// Offset from run start.
    pub start_time: Duration,
    pub executor: ScenarioExecutor,
    /// Operator message logged when the scenario starts.
    pub note: Option<String>,
}

impl ScenarioConfig {
    #[must_use]
    pub fn end_time(&self) -> Duration {
        self.start_time
            .saturating_add(self.executor.schedule().total_duration())
    }
}

/// Unresolved scenario as read from a plan file.
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    pub name: String,
    pub tags: Vec<(String, String)>,
    pub executor: Option<String>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub start_vus: Option<u64>,
    pub stages: Vec<Phase>,
    pub start_time: Option<Duration>,
    pub note: Option<String>,
}

/// Unresolved plan (plan file or preset).
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub target: Option<String>,
    pub headers: Vec<(String, String)>,
    pub timeout: Option<Duration>,
    pub pause: Option<Duration>,
    pub check: Option<BodyCheck>,

    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub stages: Vec<Phase>,
    pub scenarios: Vec<ScenarioOptions>,

    pub thresholds: Vec<ThresholdSet>,
}

/// Command-line overrides. Anything set here wins over the plan.
#[derive(Debug, Clone, Default)]
pub struct RunConfig {
    pub target: Option<String>,
    pub vus: Option<u64>,
    pub duration: Option<Duration>,
    pub stages: Vec<Phase>,
    pub timeout: Option<Duration>,
    pub pause: Option<Duration>,
    pub thresholds: Vec<ThresholdSet>,
    /// Body fields that must be present; enables the JSON body check.
    pub require: Vec<String>,
}

/// Fully validated run description.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub pause: Duration,
    pub check: BodyCheck,
    pub scenarios: Vec<ScenarioConfig>,
    pub thresholds: Vec<ThresholdSet>,
}

impl RunPlan {
    /// Latest scenario end relative to run start.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.scenarios
            .iter()
            .map(ScenarioConfig::end_time)
            .max()
            .unwrap_or(Duration::ZERO)
    }
}

pub fn resolve_plan(opts: PlanOptions, cfg: RunConfig) -> Result<RunPlan> {
    let target = cfg
        .target
        .clone()
        .or_else(|| opts.target.clone())
        .ok_or(Error::MissingTarget)?;
    validate_target(&target)?;

    let timeout = cfg.timeout.or(opts.timeout).unwrap_or(DEFAULT_TIMEOUT);
    if timeout.is_zero() {
        return Err(Error::InvalidTimeout);
    }
    let pause = cfg.pause.or(opts.pause).unwrap_or(DEFAULT_PAUSE);

    let mut check = opts.check.clone().unwrap_or_default();
    if !cfg.require.is_empty() {
        check = check.with_required(cfg.require.iter().cloned());
    }
    check.validate()?;

    let thresholds = merge_thresholds(opts.thresholds.clone(), cfg.thresholds.clone());
    for set in &thresholds {
        if !BUILTIN_METRICS.contains(&set.metric.as_str()) {
            return Err(Error::UnknownMetric(set.metric.clone()));
        }
        for expr in &set.expressions {
            parse_threshold_expr(expr).map_err(|error| Error::InvalidThreshold {
                metric: set.key(),
                error,
            })?;
        }
    }

    let headers = opts.headers.clone();
    validate_headers(&headers)?;
    let scenarios = scenarios_from_options(opts, &cfg)?;

    Ok(RunPlan {
        target,
        headers,
        timeout,
        pause,
        check,
        scenarios,
        thresholds,
    })
}

fn validate_target(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).map_err(|_| Error::InvalidTarget(raw.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(Error::InvalidTarget(raw.to_string()));
    }
    Ok(())
}

/// Header typos must fail here rather than turn every request into an `other` error.
fn validate_headers(headers: &[(String, String)]) -> Result<()> {
    for (name, value) in headers {
        let invalid = |error: String| Error::InvalidHeader {
            name: name.clone(),
            error,
        };
        http::header::HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        http::header::HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
    }
    Ok(())
}

/// Command-line thresholds replace plan thresholds on the same metric key.
fn merge_thresholds(plan: Vec<ThresholdSet>, cli: Vec<ThresholdSet>) -> Vec<ThresholdSet> {
    let mut out: Vec<ThresholdSet> = plan
        .into_iter()
        .filter(|p| !cli.iter().any(|c| c.key() == p.key()))
        .collect();
    out.extend(cli);
    out
}

pub fn scenarios_from_options(opts: PlanOptions, cfg: &RunConfig) -> Result<Vec<ScenarioConfig>> {
    let shape_override = cfg.vus.is_some() || cfg.duration.is_some();

    let scenarios = if opts.scenarios.is_empty() {
        // Flat plan: one implicit scenario.
        let executor = if !cfg.stages.is_empty() {
            ramping(opts_start_vus(None), cfg.stages.clone())?
        } else if !shape_override && !opts.stages.is_empty() {
            ramping(opts_start_vus(None), opts.stages.clone())?
        } else {
            constant(
                cfg.vus.or(opts.vus).unwrap_or(DEFAULT_VUS),
                cfg.duration.or(opts.duration).unwrap_or(DEFAULT_DURATION),
            )?
        };

        vec![ScenarioConfig {
            name: DEFAULT_SCENARIO.to_string(),
            tags: Vec::new(),
            start_time: Duration::ZERO,
            executor,
            note: None,
        }]
    } else {
        let mut out = Vec::with_capacity(opts.scenarios.len());
        for s in opts.scenarios {
            let kind = match s.executor.as_deref() {
                Some(raw) => raw
                    .parse::<ScenarioExecutorKind>()
                    .map_err(|_| Error::InvalidExecutor(raw.to_string()))?,
                None if !s.stages.is_empty() => ScenarioExecutorKind::RampingVus,
                None => ScenarioExecutorKind::ConstantVus,
            };

            // Command-line shape flags win over the plan's executor settings.
            let executor = if !cfg.stages.is_empty() {
                ramping(opts_start_vus(s.start_vus), cfg.stages.clone())?
            } else if shape_override {
                let plan_duration = match kind {
                    ScenarioExecutorKind::ConstantVus => s.duration,
                    ScenarioExecutorKind::RampingVus => Some(total(&s.stages)),
                };
                constant(
                    cfg.vus.or(s.vus).or(opts.vus).unwrap_or(DEFAULT_VUS),
                    cfg.duration
                        .or(plan_duration)
                        .or(opts.duration)
                        .unwrap_or(DEFAULT_DURATION),
                )?
            } else {
                match kind {
                    ScenarioExecutorKind::ConstantVus => constant(
                        s.vus.or(opts.vus).unwrap_or(DEFAULT_VUS),
                        s.duration.or(opts.duration).unwrap_or(DEFAULT_DURATION),
                    )?,
                    ScenarioExecutorKind::RampingVus => {
                        ramping(opts_start_vus(s.start_vus), s.stages)?
                    }
                }
            };

            out.push(ScenarioConfig {
                name: s.name,
                tags: s.tags,
                start_time: s.start_time.unwrap_or(Duration::ZERO),
                executor,
                note: s.note,
            });
        }
        out
    };

    let mut seen = HashSet::new();
    for s in &scenarios {
        if s.name.trim().is_empty() {
            return Err(Error::EmptyScenarioName);
        }
        if !seen.insert(s.name.as_str()) {
            return Err(Error::DuplicateScenario(s.name.clone()));
        }
    }

    Ok(scenarios)
}

fn opts_start_vus(v: Option<u64>) -> u64 {
    v.unwrap_or(0)
}

fn total(stages: &[Phase]) -> Duration {
    stages
        .iter()
        .fold(Duration::ZERO, |acc, st| acc.saturating_add(st.duration))
}

fn constant(vus: u64, duration: Duration) -> Result<ScenarioExecutor> {
    if vus == 0 {
        return Err(Error::InvalidVus);
    }
    if duration.is_zero() {
        return Err(Error::InvalidDuration);
    }
    Ok(ScenarioExecutor::ConstantVus { vus, duration })
}

fn ramping(start_vus: u64, stages: Vec<Phase>) -> Result<ScenarioExecutor> {
    if stages.is_empty() || total(&stages).is_zero() {
        return Err(Error::InvalidStages);
    }
    Ok(ScenarioExecutor::RampingVus { start_vus, stages })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn base_opts() -> PlanOptions {
        PlanOptions {
            target: Some("http://127.0.0.1:8080/".to_string()),
            ..PlanOptions::default()
        }
    }

    #[test]
    fn defaults_apply_without_plan_or_flags() {
        let plan = resolve_plan(base_opts(), RunConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.timeout, DEFAULT_TIMEOUT);
        assert_eq!(plan.pause, DEFAULT_PAUSE);
        assert_eq!(plan.scenarios.len(), 1);
        assert_eq!(
            plan.scenarios[0].executor,
            ScenarioExecutor::ConstantVus {
                vus: DEFAULT_VUS,
                duration: DEFAULT_DURATION
            }
        );
    }

    #[test]
    fn missing_or_invalid_target_is_rejected() {
        let err = resolve_plan(PlanOptions::default(), RunConfig::default());
        assert!(matches!(err, Err(Error::MissingTarget)));

        let cfg = RunConfig {
            target: Some("localhost:8080".to_string()),
            ..RunConfig::default()
        };
        let err = resolve_plan(PlanOptions::default(), cfg);
        assert!(matches!(err, Err(Error::InvalidTarget(_))));
    }

    #[test]
    fn cli_target_and_timeout_override_plan() {
        let opts = PlanOptions {
            timeout: Some(secs(5)),
            ..base_opts()
        };
        let cfg = RunConfig {
            target: Some("https://gateway.example/".to_string()),
            timeout: Some(secs(2)),
            ..RunConfig::default()
        };
        let plan = resolve_plan(opts, cfg).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.target, "https://gateway.example/");
        assert_eq!(plan.timeout, secs(2));
    }

    #[test]
    fn cli_vus_turn_ramping_scenarios_into_constant() {
        let opts = PlanOptions {
            scenarios: vec![ScenarioOptions {
                name: "main".to_string(),
                executor: Some("ramping-vus".to_string()),
                stages: vec![Phase::linear(secs(10), 10), Phase::linear(secs(20), 0)],
                ..ScenarioOptions::default()
            }],
            ..base_opts()
        };
        let cfg = RunConfig {
            vus: Some(3),
            ..RunConfig::default()
        };

        let scenarios = scenarios_from_options(opts, &cfg).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            scenarios[0].executor,
            ScenarioExecutor::ConstantVus {
                vus: 3,
                duration: secs(30)
            }
        );
    }

    #[test]
    fn cli_stages_replace_flat_shape() {
        let opts = PlanOptions {
            vus: Some(4),
            duration: Some(secs(60)),
            ..base_opts()
        };
        let cfg = RunConfig {
            stages: vec![Phase::linear(secs(5), 5)],
            ..RunConfig::default()
        };
        let scenarios = scenarios_from_options(opts, &cfg).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(scenarios[0].executor.kind(), ScenarioExecutorKind::RampingVus);
    }

    #[test]
    fn invalid_shapes_are_rejected_before_running() {
        let zero_vus = RunConfig {
            vus: Some(0),
            ..RunConfig::default()
        };
        assert!(matches!(
            scenarios_from_options(base_opts(), &zero_vus),
            Err(Error::InvalidVus)
        ));

        let zero_stages = PlanOptions {
            stages: vec![Phase::linear(Duration::ZERO, 10)],
            ..base_opts()
        };
        assert!(matches!(
            scenarios_from_options(zero_stages, &RunConfig::default()),
            Err(Error::InvalidStages)
        ));

        let bad_executor = PlanOptions {
            scenarios: vec![ScenarioOptions {
                name: "x".to_string(),
                executor: Some("arrival-rate".to_string()),
                ..ScenarioOptions::default()
            }],
            ..base_opts()
        };
        assert!(matches!(
            scenarios_from_options(bad_executor, &RunConfig::default()),
            Err(Error::InvalidExecutor(_))
        ));
    }

    #[test]
    fn duplicate_scenario_names_are_rejected() {
        let s = ScenarioOptions {
            name: "warmup".to_string(),
            vus: Some(1),
            duration: Some(secs(1)),
            ..ScenarioOptions::default()
        };
        let opts = PlanOptions {
            scenarios: vec![s.clone(), s],
            ..base_opts()
        };
        assert!(matches!(
            scenarios_from_options(opts, &RunConfig::default()),
            Err(Error::DuplicateScenario(name)) if name == "warmup"
        ));
    }

    #[test]
    fn malformed_threshold_is_fatal() {
        let opts = PlanOptions {
            thresholds: vec![ThresholdSet::new("error_rate", ["rate<<0.01"])],
            ..base_opts()
        };
        assert!(matches!(
            resolve_plan(opts, RunConfig::default()),
            Err(Error::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn unknown_threshold_metric_is_fatal() {
        let opts = PlanOptions {
            thresholds: vec![ThresholdSet::new("eror_rate", ["rate<0.01"])],
            ..base_opts()
        };
        let err = resolve_plan(opts, RunConfig::default());
        assert!(matches!(&err, Err(Error::UnknownMetric(m)) if m == "eror_rate"), "{err:?}");

        // Selectors do not change the metric name check.
        let opts = PlanOptions {
            thresholds: vec![ThresholdSet {
                metric: "errors_502".to_string(),
                tags: vec![("scenario".to_string(), "rolling_update".to_string())],
                expressions: vec!["count==0".to_string()],
            }],
            ..base_opts()
        };
        assert!(resolve_plan(opts, RunConfig::default()).is_ok());
    }

    #[test]
    fn malformed_headers_are_fatal() {
        for (name, value) in [("bad header", "v"), ("x-ok", "line\nbreak")] {
            let opts = PlanOptions {
                headers: vec![(name.to_string(), value.to_string())],
                ..base_opts()
            };
            let err = resolve_plan(opts, RunConfig::default());
            assert!(
                matches!(&err, Err(Error::InvalidHeader { name: n, .. }) if n == name),
                "{name}: {err:?}"
            );
        }

        let opts = PlanOptions {
            headers: vec![("x-request-source".to_string(), "surge".to_string())],
            ..base_opts()
        };
        let plan = resolve_plan(opts, RunConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.headers.len(), 1);
    }

    #[test]
    fn cli_thresholds_replace_same_metric() {
        let opts = PlanOptions {
            thresholds: vec![
                ThresholdSet::new("error_rate", ["rate<0.01"]),
                ThresholdSet::new("http_req_duration", ["p(95)<5000"]),
            ],
            ..base_opts()
        };
        let cfg = RunConfig {
            thresholds: vec![ThresholdSet::new("error_rate", ["rate<0.5"])],
            ..RunConfig::default()
        };
        let plan = resolve_plan(opts, cfg).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.thresholds.len(), 2);
        let error_rate = plan
            .thresholds
            .iter()
            .find(|t| t.metric == "error_rate")
            .unwrap_or_else(|| panic!("missing error_rate"));
        assert_eq!(error_rate.expressions, vec!["rate<0.5".to_string()]);
    }

    #[test]
    fn require_flag_enables_json_check() {
        let cfg = RunConfig {
            require: vec!["backend.hostname".to_string()],
            ..RunConfig::default()
        };
        let plan = resolve_plan(base_opts(), cfg).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(plan.check, BodyCheck::Json { ref require, .. } if require == &["backend.hostname".to_string()]));
    }

    #[test]
    fn total_duration_covers_offset_scenarios() {
        let opts = PlanOptions {
            scenarios: vec![
                ScenarioOptions {
                    name: "warmup".to_string(),
                    vus: Some(5),
                    duration: Some(secs(15)),
                    ..ScenarioOptions::default()
                },
                ScenarioOptions {
                    name: "rolling_update".to_string(),
                    vus: Some(20),
                    duration: Some(secs(90)),
                    start_time: Some(secs(15)),
                    ..ScenarioOptions::default()
                },
            ],
            ..base_opts()
        };
        let plan = resolve_plan(opts, RunConfig::default()).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(plan.total_duration(), secs(105));
    }
}

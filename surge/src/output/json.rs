use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::sync::Arc;

use surge_core::{OutcomeTotals, ProgressUpdate, RunPlan, RunSummary, render_metric_key};
use surge_metrics::{MetricValue, TrendSummary};

use super::OutputFormatter;

/// NDJSON on stdout: one `progress` line per scenario per tick, then one `summary` line.
pub(crate) struct JsonOutput;

impl OutputFormatter for JsonOutput {
    fn print_header(&self, _source: &str, _plan: &RunPlan) {}

    fn progress(&self) -> Option<surge_core::ProgressFn> {
        Some(Arc::new(move |u| {
            let line = build_progress_line(&u);
            emit_json_line(&line);
        }))
    }

    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()> {
        let line = build_summary_line(summary);
        emit_json_line(&line);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonProgressLine {
    pub kind: &'static str,
    pub tick: u64,
    pub elapsed_secs: f64,
    pub scenario: String,
    pub state: String,
    pub scenario_elapsed_secs: f64,
    pub scenario_duration_secs: f64,
    pub active_vus: u64,
    pub stage: Option<JsonStage>,

    pub requests_per_sec: f64,
    pub error_rate: f64,
    pub requests_total: u64,
    pub successes_total: u64,
    pub errors_502_total: u64,
    pub errors_504_total: u64,
    pub errors_other_total: u64,
    pub retries_total: u64,
    pub latency_p95_ms: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonStage {
    pub name: String,
    pub stage: usize,
    pub stages: usize,
    pub current_target: u64,
    pub stage_remaining_secs: f64,
}

fn build_progress_line(u: &ProgressUpdate) -> JsonProgressLine {
    JsonProgressLine {
        kind: "progress",
        tick: u.tick,
        elapsed_secs: u.elapsed.as_secs_f64(),
        scenario: u.scenario.clone(),
        state: u.state.to_string(),
        scenario_elapsed_secs: u.scenario_elapsed.as_secs_f64(),
        scenario_duration_secs: u.scenario_duration.as_secs_f64(),
        active_vus: u.active_vus,
        stage: u.stage.as_ref().map(|s| JsonStage {
            name: s.name.clone(),
            stage: s.stage,
            stages: s.stages,
            current_target: s.current_target,
            stage_remaining_secs: s.stage_remaining.as_secs_f64(),
        }),

        requests_per_sec: u.metrics.rps_now,
        error_rate: u.metrics.error_rate_now,
        requests_total: u.metrics.requests_total,
        successes_total: u.metrics.successes_total,
        errors_502_total: u.metrics.errors_502_total,
        errors_504_total: u.metrics.errors_504_total,
        errors_other_total: u.metrics.errors_other_total,
        retries_total: u.metrics.retries_total,
        latency_p95_ms: u.metrics.latency_p95_ms,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonSummaryLine {
    pub kind: &'static str,
    pub verdict: JsonVerdict,
    pub elapsed_secs: f64,
    pub totals: JsonTotals,
    pub scenarios: Vec<JsonScenarioSummary>,
    pub thresholds: Vec<JsonThreshold>,
    pub metrics: Vec<JsonMetricSeries>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonVerdict {
    pub passed: bool,
    pub zero_errors: bool,
    pub thresholds_passed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonTotals {
    pub requests: u64,
    pub successes: u64,
    pub errors_502: u64,
    pub errors_504: u64,
    pub errors_other: u64,
    pub errors: u64,
    pub error_rate: Option<f64>,
    pub retries: u64,
    pub latency_ms: JsonLatencySummary,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonLatencySummary {
    pub count: u64,
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub med: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonScenarioSummary {
    pub scenario: String,
    pub vus_max: u64,
    pub totals: JsonTotals,
    pub phases: Vec<JsonPhaseSummary>,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonPhaseSummary {
    pub phase: String,
    pub totals: JsonTotals,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonThreshold {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonMetricSeries {
    pub name: String,
    pub kind: String,
    pub tags: BTreeMap<String, String>,
    pub value: JsonMetricValue,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum JsonMetricValue {
    Counter { count: u64 },
    Gauge { value: i64 },
    Rate { total: u64, hits: u64, rate: Option<f64> },
    Trend(JsonLatencySummary),
}

fn latency(t: &TrendSummary) -> JsonLatencySummary {
    JsonLatencySummary {
        count: t.count,
        avg: t.mean,
        min: t.min,
        med: t.med,
        p90: t.p90,
        p95: t.p95,
        p99: t.p99,
        max: t.max,
    }
}

fn totals(t: &OutcomeTotals) -> JsonTotals {
    JsonTotals {
        requests: t.requests,
        successes: t.successes,
        errors_502: t.errors_502,
        errors_504: t.errors_504,
        errors_other: t.errors_other,
        errors: t.errors(),
        error_rate: t.error_rate(),
        retries: t.retries,
        latency_ms: latency(&t.latency),
    }
}

fn metric_value(v: &MetricValue) -> JsonMetricValue {
    match v {
        MetricValue::Counter(count) => JsonMetricValue::Counter { count: *count },
        MetricValue::Gauge(value) => JsonMetricValue::Gauge { value: *value },
        MetricValue::Rate { total, hits, rate } => JsonMetricValue::Rate {
            total: *total,
            hits: *hits,
            rate: *rate,
        },
        MetricValue::Trend(t) => JsonMetricValue::Trend(latency(t)),
    }
}

fn build_summary_line(summary: &RunSummary) -> JsonSummaryLine {
    let verdict = summary.verdict();

    JsonSummaryLine {
        kind: "summary",
        verdict: JsonVerdict {
            passed: verdict.passed(),
            zero_errors: verdict.zero_errors,
            thresholds_passed: verdict.thresholds_passed,
        },
        elapsed_secs: summary.elapsed.as_secs_f64(),
        totals: totals(&summary.totals),
        scenarios: summary
            .scenarios
            .iter()
            .map(|s| JsonScenarioSummary {
                scenario: s.scenario.clone(),
                vus_max: s.vus_max,
                totals: totals(&s.totals),
                phases: s
                    .phases
                    .iter()
                    .map(|p| JsonPhaseSummary {
                        phase: p.phase.clone(),
                        totals: totals(&p.totals),
                    })
                    .collect(),
            })
            .collect(),
        thresholds: summary
            .thresholds
            .iter()
            .map(|t| JsonThreshold {
                metric: render_metric_key(&t.metric, &t.tags),
                expression: t.expression.clone(),
                observed: t.observed,
                passed: t.passed,
            })
            .collect(),
        metrics: summary
            .metrics
            .iter()
            .map(|m| JsonMetricSeries {
                name: m.name.clone(),
                kind: m.kind.to_string(),
                tags: m.tags.iter().cloned().collect(),
                value: metric_value(&m.values),
            })
            .collect(),
    }
}

fn emit_json_line<T: Serialize>(line: &T) {
    let mut out = std::io::stdout().lock();
    if serde_json::to_writer(&mut out, line).is_ok() {
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::time::Duration;
    use surge_core::{ScenarioSummary, ThresholdOutcome};
    use surge_metrics::{MetricKind, MetricSeriesSummary};

    fn to_value<T: Serialize>(line: &T) -> Value {
        match serde_json::to_value(line) {
            Ok(v) => v,
            Err(err) => panic!("to_value failed: {err}"),
        }
    }

    fn summary() -> RunSummary {
        let t = OutcomeTotals {
            requests: 100,
            successes: 90,
            errors_502: 10,
            ..OutcomeTotals::default()
        };
        RunSummary {
            totals: t.clone(),
            scenarios: vec![ScenarioSummary {
                scenario: "rolling_update".to_string(),
                totals: t,
                vus_max: 20,
                phases: Vec::new(),
            }],
            thresholds: vec![ThresholdOutcome {
                metric: "error_rate".to_string(),
                tags: vec![("scenario".to_string(), "rolling_update".to_string())],
                expression: "rate<0.01".to_string(),
                observed: Some(0.1),
                passed: false,
            }],
            metrics: vec![MetricSeriesSummary {
                name: "errors_502".to_string(),
                kind: MetricKind::Counter,
                tags: vec![("scenario".to_string(), "rolling_update".to_string())],
                values: MetricValue::Counter(10),
            }],
            elapsed: Duration::from_secs(2),
        }
    }

    #[test]
    fn summary_line_carries_verdict_and_totals() {
        let v = to_value(&build_summary_line(&summary()));

        assert_eq!(v.get("kind").and_then(Value::as_str), Some("summary"));
        assert_eq!(v.pointer("/verdict/passed").and_then(Value::as_bool), Some(false));
        assert_eq!(v.pointer("/verdict/zero_errors").and_then(Value::as_bool), Some(false));
        assert_eq!(v.pointer("/totals/errors_502").and_then(Value::as_u64), Some(10));
        assert_eq!(v.pointer("/totals/error_rate").and_then(Value::as_f64), Some(0.1));
        assert_eq!(
            v.pointer("/totals/latency_ms/p95"),
            Some(&Value::Null),
            "no latency samples"
        );
        assert_eq!(
            v.pointer("/scenarios/0/scenario").and_then(Value::as_str),
            Some("rolling_update")
        );
        assert_eq!(
            v.pointer("/thresholds/0/metric").and_then(Value::as_str),
            Some("error_rate{scenario=rolling_update}")
        );
        assert_eq!(v.pointer("/metrics/0/kind").and_then(Value::as_str), Some("counter"));
        assert_eq!(v.pointer("/metrics/0/value/count").and_then(Value::as_u64), Some(10));
    }

    #[test]
    fn progress_line_has_kind_and_state() {
        let u = ProgressUpdate {
            tick: 1,
            elapsed: Duration::from_secs(1),
            scenario: "warmup".to_string(),
            state: surge_core::ScenarioState::Running,
            scenario_elapsed: Duration::from_secs(1),
            scenario_duration: Duration::from_secs(15),
            active_vus: 5,
            stage: None,
            metrics: surge_core::LiveMetrics {
                requests_total: 12,
                ..surge_core::LiveMetrics::default()
            },
        };
        let v = to_value(&build_progress_line(&u));
        assert_eq!(v.get("kind").and_then(Value::as_str), Some("progress"));
        assert_eq!(v.get("state").and_then(Value::as_str), Some("running"));
        assert_eq!(v.get("active_vus").and_then(Value::as_u64), Some(5));
        assert_eq!(v.get("requests_total").and_then(Value::as_u64), Some(12));
        assert_eq!(v.get("stage"), Some(&Value::Null));
    }
}

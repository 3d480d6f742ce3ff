use std::time::Duration;

use surge_metrics::agg::{per_sec, rate_of};
use surge_metrics::{KeyId, Registry, TagSet};

use crate::progress::LiveMetrics;
use crate::request_metrics::{RequestMetricIds, TAG_PHASE, TAG_SCENARIO};
use crate::summary::{OutcomeTotals, PhaseSummary, RunSummary, ScenarioSummary};
use crate::thresholds_eval::ThresholdOutcome;

/// Counter totals remembered between progress ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScenarioSnapshot {
    requests_total: u64,
    errors_total: u64,
}

#[derive(Debug, Clone, Copy)]
struct TagKeys {
    scenario: KeyId,
    phase: KeyId,
}

/// Reads request outcome aggregates back out of the registry.
#[derive(Debug, Clone, Copy)]
pub(crate) struct MetricComputer {
    ids: RequestMetricIds,
    keys: TagKeys,
}

impl MetricComputer {
    pub(crate) fn new(metrics: &Registry, ids: RequestMetricIds) -> Self {
        Self {
            ids,
            keys: TagKeys {
                scenario: metrics.resolve_key(TAG_SCENARIO),
                phase: metrics.resolve_key(TAG_PHASE),
            },
        }
    }

    pub(crate) fn outcome_totals(&self, metrics: &Registry, selector: &TagSet) -> OutcomeTotals {
        let ids = self.ids;
        let counter = |id| metrics.fold_counter_sum(id, |tags| tags.contains_all(selector));

        OutcomeTotals {
            requests: counter(ids.http_reqs),
            successes: counter(ids.success_count),
            errors_502: counter(ids.errors_502),
            errors_504: counter(ids.errors_504),
            errors_other: counter(ids.errors_other),
            retries: counter(ids.retry_total),
            latency: metrics
                .fold_trend(ids.http_req_duration, |tags| tags.contains_all(selector))
                .map(|t| t.summary())
                .unwrap_or_default(),
        }
    }

    fn scenario_selector(&self, metrics: &Registry, scenario: &str) -> TagSet {
        TagSet::from_sorted_iter([(self.keys.scenario, metrics.resolve_key(scenario))])
    }

    pub(crate) fn compute_live_metrics(
        &self,
        metrics: &Registry,
        scenario: &str,
        prev: ScenarioSnapshot,
        dt: Duration,
    ) -> (LiveMetrics, ScenarioSnapshot) {
        let selector = self.scenario_selector(metrics, scenario);
        let totals = self.outcome_totals(metrics, &selector);

        let snapshot = ScenarioSnapshot {
            requests_total: totals.requests,
            errors_total: totals.errors(),
        };
        let delta_requests = snapshot.requests_total.saturating_sub(prev.requests_total);
        let delta_errors = snapshot.errors_total.saturating_sub(prev.errors_total);

        let live = LiveMetrics {
            rps_now: per_sec(delta_requests, dt.as_secs_f64()),
            error_rate_now: rate_of(delta_errors, delta_requests).unwrap_or(0.0),
            requests_total: totals.requests,
            successes_total: totals.successes,
            errors_502_total: totals.errors_502,
            errors_504_total: totals.errors_504,
            errors_other_total: totals.errors_other,
            retries_total: totals.retries,
            latency_p95_ms: totals.latency.p95,
        };

        (live, snapshot)
    }

    fn vus_max(&self, metrics: &Registry, selector: &TagSet) -> u64 {
        metrics
            .fold_gauges(self.ids.vus_max, |tags| tags.contains_all(selector))
            .into_iter()
            .max()
            .map(|v| u64::try_from(v).unwrap_or(0))
            .unwrap_or(0)
    }

    /// `scenarios` pairs each scenario name with its phase names in schedule order.
    pub(crate) fn build_run_summary(
        &self,
        metrics: &Registry,
        scenarios: &[(String, Vec<String>)],
        thresholds: Vec<ThresholdOutcome>,
        elapsed: Duration,
    ) -> RunSummary {
        let totals = self.outcome_totals(metrics, &TagSet::default());

        let scenarios = scenarios
            .iter()
            .map(|(name, phase_names)| {
                let selector = self.scenario_selector(metrics, name);
                let scenario_value = metrics.resolve_key(name);

                let mut phases: Vec<PhaseSummary> = Vec::new();
                for phase in phase_names {
                    if phases.iter().any(|p| &p.phase == phase) {
                        continue;
                    }
                    let phase_selector = TagSet::from_sorted_iter(sorted_pair(
                        (self.keys.scenario, scenario_value),
                        (self.keys.phase, metrics.resolve_key(phase)),
                    ));
                    let totals = self.outcome_totals(metrics, &phase_selector);
                    if totals.requests > 0 {
                        phases.push(PhaseSummary {
                            phase: phase.clone(),
                            totals,
                        });
                    }
                }

                ScenarioSummary {
                    scenario: name.clone(),
                    totals: self.outcome_totals(metrics, &selector),
                    vus_max: self.vus_max(metrics, &selector),
                    phases,
                }
            })
            .collect();

        RunSummary {
            totals,
            scenarios,
            thresholds,
            metrics: metrics.summarize(),
            elapsed,
        }
    }
}

fn sorted_pair(a: (KeyId, KeyId), b: (KeyId, KeyId)) -> [(KeyId, KeyId); 2] {
    if a.0 <= b.0 { [a, b] } else { [b, a] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ErrorKind, RequestOutcome};
    use crate::request_metrics::RequestSample;

    fn record(metrics: &Registry, ids: &RequestMetricIds, scenario: &str, phase: &str, error: Option<ErrorKind>) {
        let outcome = RequestOutcome {
            status: Some(200),
            latency: Duration::from_millis(5),
            error,
            retries: 0,
            transport_error: None,
        };
        ids.record_request(
            metrics,
            RequestSample {
                scenario,
                phase,
                outcome: &outcome,
            },
            &[],
        );
    }

    #[test]
    fn summary_breaks_down_by_scenario_and_phase() {
        let metrics = Registry::default();
        let ids = RequestMetricIds::register(&metrics);
        let computer = MetricComputer::new(&metrics, ids);

        record(&metrics, &ids, "warmup", "steady", None);
        record(&metrics, &ids, "rolling_update", "ramp", None);
        record(&metrics, &ids, "rolling_update", "hold", Some(ErrorKind::ConnRefused));
        record(&metrics, &ids, "rolling_update", "hold", None);
        ids.record_active_vus(&metrics, "rolling_update", 20);

        let scenarios = vec![
            ("warmup".to_string(), vec!["steady".to_string()]),
            (
                "rolling_update".to_string(),
                vec!["ramp".to_string(), "hold".to_string(), "idle".to_string()],
            ),
        ];
        let s = computer.build_run_summary(&metrics, &scenarios, Vec::new(), Duration::from_secs(3));

        assert_eq!(s.totals.requests, 4);
        assert_eq!(s.totals.errors_502, 1);
        assert_eq!(s.totals.latency.count, 4);

        let rolling = &s.scenarios[1];
        assert_eq!(rolling.totals.requests, 3);
        assert_eq!(rolling.vus_max, 20);
        let names: Vec<&str> = rolling.phases.iter().map(|p| p.phase.as_str()).collect();
        assert_eq!(names, vec!["ramp", "hold"]);
        assert_eq!(rolling.phases[1].totals.errors_502, 1);
        assert_eq!(s.scenarios[0].totals.errors(), 0);
    }

    #[test]
    fn live_metrics_use_deltas_between_ticks() {
        let metrics = Registry::default();
        let ids = RequestMetricIds::register(&metrics);
        let computer = MetricComputer::new(&metrics, ids);

        for _ in 0..10 {
            record(&metrics, &ids, "s", "p", None);
        }
        let (live, snap) =
            computer.compute_live_metrics(&metrics, "s", ScenarioSnapshot::default(), Duration::from_secs(1));
        assert_eq!(live.requests_total, 10);
        assert!((live.rps_now - 10.0).abs() < 1e-9);
        assert_eq!(live.error_rate_now, 0.0);

        record(&metrics, &ids, "s", "p", Some(ErrorKind::GatewayTimeout));
        record(&metrics, &ids, "s", "p", None);
        let (live, _) = computer.compute_live_metrics(&metrics, "s", snap, Duration::from_secs(2));
        assert!((live.rps_now - 1.0).abs() < 1e-9);
        assert!((live.error_rate_now - 0.5).abs() < 1e-9);
        assert_eq!(live.errors_504_total, 1);
    }
}

use surge_metrics::{MetricId, MetricKind, Registry};

use crate::outcome::{ErrorKind, RequestOutcome};

pub const HTTP_REQS: &str = "http_reqs";
pub const SUCCESS_COUNT: &str = "success_count";
pub const ERRORS_502: &str = "errors_502";
pub const ERRORS_504: &str = "errors_504";
pub const ERRORS_OTHER: &str = "errors_other";
pub const RETRY_TOTAL: &str = "retry_total";
pub const ERROR_RATE: &str = "error_rate";
pub const HTTP_REQ_DURATION: &str = "http_req_duration";
pub const VUS: &str = "vus";
pub const VUS_MAX: &str = "vus_max";

/// Every metric a run records; thresholds may only name these.
pub const BUILTIN_METRICS: [&str; 10] = [
    HTTP_REQS,
    SUCCESS_COUNT,
    ERRORS_502,
    ERRORS_504,
    ERRORS_OTHER,
    RETRY_TOTAL,
    ERROR_RATE,
    HTTP_REQ_DURATION,
    VUS,
    VUS_MAX,
];

pub const TAG_SCENARIO: &str = "scenario";
pub const TAG_PHASE: &str = "phase";

#[derive(Debug, Clone, Copy)]
pub struct RequestMetricIds {
    pub http_reqs: MetricId,
    pub success_count: MetricId,
    pub errors_502: MetricId,
    pub errors_504: MetricId,
    pub errors_other: MetricId,
    pub retry_total: MetricId,
    pub error_rate: MetricId,
    /// Request latency in milliseconds.
    pub http_req_duration: MetricId,
    pub vus: MetricId,
    pub vus_max: MetricId,
}

#[derive(Debug, Clone, Copy)]
pub struct RequestSample<'a> {
    pub scenario: &'a str,
    pub phase: &'a str,
    pub outcome: &'a RequestOutcome,
}

impl RequestMetricIds {
    pub fn register(metrics: &Registry) -> Self {
        Self {
            http_reqs: metrics.register(HTTP_REQS, MetricKind::Counter),
            success_count: metrics.register(SUCCESS_COUNT, MetricKind::Counter),
            errors_502: metrics.register(ERRORS_502, MetricKind::Counter),
            errors_504: metrics.register(ERRORS_504, MetricKind::Counter),
            errors_other: metrics.register(ERRORS_OTHER, MetricKind::Counter),
            retry_total: metrics.register(RETRY_TOTAL, MetricKind::Counter),
            error_rate: metrics.register(ERROR_RATE, MetricKind::Rate),
            http_req_duration: metrics.register(HTTP_REQ_DURATION, MetricKind::Trend),
            vus: metrics.register(VUS, MetricKind::Gauge),
            vus_max: metrics.register(VUS_MAX, MetricKind::Gauge),
        }
    }

    fn error_counter(&self, kind: ErrorKind) -> MetricId {
        match kind {
            ErrorKind::ConnRefused => self.errors_502,
            ErrorKind::GatewayTimeout => self.errors_504,
            ErrorKind::Other => self.errors_other,
        }
    }

    /// Records one finished request. Each request updates exactly one of the success or
    /// error counters.
    pub fn record_request(
        &self,
        metrics: &Registry,
        sample: RequestSample<'_>,
        extra_tags: &[(String, String)],
    ) {
        let mut tags: Vec<(&str, &str)> = Vec::with_capacity(2 + extra_tags.len());
        tags.push((TAG_SCENARIO, sample.scenario));
        tags.push((TAG_PHASE, sample.phase));
        tags.extend(
            extra_tags
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), TAG_SCENARIO | TAG_PHASE))
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );
        let tags = metrics.resolve_tags(&tags);
        let outcome = sample.outcome;

        if let Some(h) = metrics.get_handle(self.http_reqs, tags.clone()) {
            h.increment(1);
        }

        let outcome_counter = match outcome.error {
            None => self.success_count,
            Some(kind) => self.error_counter(kind),
        };
        if let Some(h) = metrics.get_handle(outcome_counter, tags.clone()) {
            h.increment(1);
        }

        if let Some(h) = metrics.get_handle(self.error_rate, tags.clone()) {
            h.add_rate(outcome.error.is_some());
        }

        if outcome.retries > 0
            && let Some(h) = metrics.get_handle(self.retry_total, tags.clone())
        {
            h.increment(outcome.retries);
        }

        if let Some(h) = metrics.get_handle(self.http_req_duration, tags) {
            h.observe(outcome.latency.as_secs_f64() * 1000.0);
        }
    }

    /// Updates the scenario's active and peak VU gauges.
    pub fn record_active_vus(&self, metrics: &Registry, scenario: &str, active: u64) {
        let tags = metrics.resolve_tags(&[(TAG_SCENARIO, scenario)]);
        let active = i64::try_from(active).unwrap_or(i64::MAX);
        if let Some(h) = metrics.get_handle(self.vus, tags.clone()) {
            h.set_gauge(active);
        }
        if let Some(h) = metrics.get_handle(self.vus_max, tags) {
            h.max_gauge(active);
        }
    }
}

use surge_metrics::{MetricId, MetricKind, Registry, TagSet};

use crate::error::{Error, Result};
use crate::thresholds::{ThresholdAgg, ThresholdSet, parse_threshold_expr};

/// Outcome of one threshold expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: String,
    pub tags: Vec<(String, String)>,
    pub expression: String,
    /// `None` when the metric, series or aggregate is undefined.
    pub observed: Option<f64>,
    pub passed: bool,
}

pub fn evaluate_thresholds(metrics: &Registry, sets: &[ThresholdSet]) -> Result<Vec<ThresholdOutcome>> {
    let mut out = Vec::new();

    for set in sets {
        let lookup = metrics.lookup_metric(&set.metric);
        let selector = selector_tags(metrics, &set.tags);

        for expr_raw in &set.expressions {
            let expr = parse_threshold_expr(expr_raw).map_err(|error| Error::InvalidThreshold {
                metric: set.key(),
                error,
            })?;

            // Missing metric => all expressions fail.
            let observed = lookup.and_then(|(id, kind)| observed_value(metrics, id, kind, &selector, expr.agg));
            let passed = observed.is_some_and(|v| expr.op.compare(v, expr.value));

            out.push(ThresholdOutcome {
                metric: set.metric.clone(),
                tags: set.tags.clone(),
                expression: expr_raw.clone(),
                observed,
                passed,
            });
        }
    }

    Ok(out)
}

fn selector_tags(metrics: &Registry, tags: &[(String, String)]) -> TagSet {
    let borrowed: Vec<(&str, &str)> = tags.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    metrics.resolve_tags(&borrowed)
}

fn observed_value(
    metrics: &Registry,
    id: MetricId,
    kind: MetricKind,
    selector: &TagSet,
    agg: ThresholdAgg,
) -> Option<f64> {
    let filter = |tags: &TagSet| tags.contains_all(selector);
    if metrics.count_series(id, filter) == 0 {
        return None;
    }

    match kind {
        MetricKind::Counter => match agg {
            ThresholdAgg::Count | ThresholdAgg::Value => {
                Some(metrics.fold_counter_sum(id, filter) as f64)
            }
            _ => None,
        },

        MetricKind::Rate => {
            let (total, _hits, rate) = metrics.fold_rate_sum(id, filter);
            match agg {
                ThresholdAgg::Rate | ThresholdAgg::Value => rate,
                ThresholdAgg::Count => Some(total as f64),
                _ => None,
            }
        }

        MetricKind::Trend => {
            let cell = metrics.fold_trend(id, filter)?;
            let summary = cell.summary();
            match agg {
                ThresholdAgg::Avg => summary.mean,
                ThresholdAgg::Min => summary.min,
                ThresholdAgg::Max => summary.max,
                ThresholdAgg::Med => summary.med,
                ThresholdAgg::Count => Some(summary.count as f64),
                ThresholdAgg::P(p) => cell.percentile(p),
                ThresholdAgg::Rate | ThresholdAgg::Value => None,
            }
        }

        MetricKind::Gauge => {
            let values = metrics.fold_gauges(id, filter);
            match agg {
                ThresholdAgg::Value | ThresholdAgg::Max => values.iter().max().map(|v| *v as f64),
                ThresholdAgg::Min => values.iter().min().map(|v| *v as f64),
                ThresholdAgg::Avg if !values.is_empty() => {
                    Some(values.iter().map(|v| *v as f64).sum::<f64>() / values.len() as f64)
                }
                _ => None,
            }
        }
    }
}

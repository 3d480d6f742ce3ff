/// Pass/fail criteria for one metric, optionally narrowed to a tag selector
/// (`error_rate{scenario=rolling_update}`).
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub tags: Vec<(String, String)>,
    pub expressions: Vec<String>,
}

impl ThresholdSet {
    pub fn new<I, S>(metric: impl Into<String>, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric: metric.into(),
            tags: Vec::new(),
            expressions: expressions.into_iter().map(Into::into).collect(),
        }
    }

    /// Rendered metric key, `name` or `name{k=v,...}`.
    #[must_use]
    pub fn key(&self) -> String {
        render_metric_key(&self.metric, &self.tags)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    Neq,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    Value,
    P(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, expected: f64) -> bool {
        match self {
            ThresholdOp::Lt => observed < expected,
            ThresholdOp::Lte => observed <= expected,
            ThresholdOp::Gt => observed > expected,
            ThresholdOp::Gte => observed >= expected,
            ThresholdOp::Eq => observed == expected,
            ThresholdOp::Neq => observed != expected,
        }
    }
}

pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    // Two-character operators first so `<=` is not read as `<`.
    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::Neq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| format!("invalid threshold (missing operator): {raw}"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() || right.is_empty() {
        return Err(format!("invalid threshold: {raw}"));
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            // `p(95)` and the shorthand `p95`.
            let inner = other
                .strip_prefix("p(")
                .and_then(|v| v.strip_suffix(')'))
                .or_else(|| other.strip_prefix('p'));
            let Some(inner) = inner.filter(|v| !v.is_empty()) else {
                return Err(format!("unknown aggregation `{left}` in threshold: {raw}"));
            };
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile in threshold: {raw}"))?;
            if !(p > 0.0 && p <= 100.0) {
                return Err(format!("percentile out of range in threshold: {raw}"));
            }
            ThresholdAgg::P(p)
        }
    };

    // Latency is recorded in milliseconds, so an explicit `ms` suffix is accepted.
    let value: f64 = right
        .strip_suffix("ms")
        .unwrap_or(right)
        .parse()
        .map_err(|_| format!("invalid numeric value in threshold: {raw}"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value in threshold: {raw}"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// Splits `name{k=v,k2=v2}` into the metric name and its sorted tag selector.
pub fn parse_threshold_metric_key(raw: &str) -> Result<(String, Vec<(String, String)>), String> {
    let raw = raw.trim();
    let Some(open) = raw.find('{') else {
        if raw.is_empty() || raw.contains('}') {
            return Err(format!("invalid metric key `{raw}`"));
        }
        return Ok((raw.to_string(), Vec::new()));
    };

    let name = raw[..open].trim();
    let Some(inner) = raw[open + 1..].strip_suffix('}') else {
        return Err(format!("unterminated tag selector in `{raw}`"));
    };
    if name.is_empty() {
        return Err(format!("missing metric name in `{raw}`"));
    }

    let mut tags = Vec::new();
    for pair in inner.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((k, v)) = pair.split_once('=') else {
            return Err(format!("invalid tag selector `{pair}` in `{raw}` (expected key=value)"));
        };
        let (k, v) = (k.trim(), v.trim());
        if k.is_empty() {
            return Err(format!("empty tag key in `{raw}`"));
        }
        tags.push((k.to_string(), v.to_string()));
    }
    tags.sort();
    tags.dedup_by(|a, b| a.0 == b.0);

    Ok((name.to_string(), tags))
}

pub fn render_metric_key(metric: &str, tags: &[(String, String)]) -> String {
    if tags.is_empty() {
        return metric.to_string();
    }
    let inner: Vec<String> = tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{metric}{{{}}}", inner.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_threshold_expr_trims_whitespace() {
        let expr = parse_threshold_expr("  avg  <=  123  ").unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(expr.agg, ThresholdAgg::Avg));
        assert!(matches!(expr.op, ThresholdOp::Lte));
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn parse_threshold_expr_reads_default_gate_expressions() {
        let rate = parse_threshold_expr("rate<0.01").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(rate.agg, ThresholdAgg::Rate);
        assert_eq!(rate.op, ThresholdOp::Lt);
        assert_eq!(rate.value, 0.01);

        let p95 = parse_threshold_expr("p(95)<5000").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p95.agg, ThresholdAgg::P(95.0));
        assert_eq!(p95.value, 5000.0);

        let p999 = parse_threshold_expr("p(99.9)<=800").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p999.agg, ThresholdAgg::P(99.9));

        let neq = parse_threshold_expr("count!=0").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(neq.op, ThresholdOp::Neq);
    }

    #[test]
    fn parse_threshold_expr_accepts_shorthand_percentile_and_ms() {
        let p95 = parse_threshold_expr("p95 < 5000ms").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p95.agg, ThresholdAgg::P(95.0));
        assert_eq!(p95.op, ThresholdOp::Lt);
        assert_eq!(p95.value, 5000.0);

        let p99 = parse_threshold_expr("p(99)<=1500ms").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p99.agg, ThresholdAgg::P(99.0));
        assert_eq!(p99.value, 1500.0);

        for raw in ["p<1", "px<1", "p(95<1", "p95<5000s", "pnan<1"] {
            assert!(parse_threshold_expr(raw).is_err(), "accepted `{raw}`");
        }
    }

    #[test]
    fn parse_threshold_expr_rejects_malformed_input() {
        for raw in ["", "rate", "p(101)<1", "p(0)<1", "rate<<0.01", "foo<1", "rate<abc", "<1"] {
            assert!(parse_threshold_expr(raw).is_err(), "accepted `{raw}`");
        }
    }

    #[test]
    fn parse_metric_key_with_selector() {
        let (name, tags) = parse_threshold_metric_key("error_rate{scenario=rolling_update, phase=steady}")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(name, "error_rate");
        assert_eq!(
            tags,
            vec![
                ("phase".to_string(), "steady".to_string()),
                ("scenario".to_string(), "rolling_update".to_string()),
            ]
        );
        assert_eq!(
            render_metric_key(&name, &tags),
            "error_rate{phase=steady,scenario=rolling_update}"
        );
    }

    #[test]
    fn parse_metric_key_rejects_broken_selectors() {
        for raw in ["", "{a=b}", "m{a=b", "m{ab}", "m{=b}", "m}"] {
            assert!(parse_threshold_metric_key(raw).is_err(), "accepted `{raw}`");
        }
    }

    #[test]
    fn compare_covers_all_operators() {
        assert!(ThresholdOp::Lt.compare(1.0, 2.0));
        assert!(ThresholdOp::Lte.compare(2.0, 2.0));
        assert!(ThresholdOp::Gt.compare(3.0, 2.0));
        assert!(ThresholdOp::Gte.compare(2.0, 2.0));
        assert!(ThresholdOp::Eq.compare(2.0, 2.0));
        assert!(ThresholdOp::Neq.compare(1.0, 2.0));
        assert!(!ThresholdOp::Lt.compare(2.0, 2.0));
    }
}

use std::time::Duration;

/// Milliseconds with one decimal, or `N/A` when no sample exists.
pub(crate) fn format_ms_opt(v: Option<f64>) -> String {
    match v {
        Some(ms) if ms.is_finite() => format!("{ms:.1}ms"),
        _ => "N/A".to_string(),
    }
}

/// Ratio (0..=1) as a percentage with two decimals.
pub(crate) fn format_percent_opt(v: Option<f64>) -> String {
    match v {
        Some(r) if r.is_finite() => format!("{:.2}%", r * 100.0),
        _ => "N/A".to_string(),
    }
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

pub(crate) fn format_observed(v: Option<f64>) -> String {
    match v {
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => format!("{v:.4}"),
        None => "-".to_string(),
    }
}

/// Single rounded component: `850ms`, `12s`, `2m05s`.
pub(crate) fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    // Ties round up.
    let secs = (ms + 500) / 1_000;
    if secs < 60 {
        return format!("{secs}s");
    }
    format!("{}m{:02}s", secs / 60, secs % 60)
}

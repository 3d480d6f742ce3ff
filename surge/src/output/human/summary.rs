use std::fmt::Write as _;

use surge_core::{ErrorKind, OutcomeTotals, RunSummary, render_metric_key};

use super::format::{format_duration, format_ms_opt, format_observed, format_percent_opt, format_rate};

const WIDTH: usize = 60;

/// Renders the end-of-run report. Pure: the same summary always renders the same text.
pub(crate) fn render(summary: &RunSummary) -> String {
    let mut out = String::new();
    let heavy = "=".repeat(WIDTH);
    let light = "-".repeat(WIDTH);
    let t = &summary.totals;

    writeln!(out, "{heavy}").ok();
    writeln!(out, "  RUN RESULTS").ok();
    writeln!(out, "{heavy}").ok();
    render_counts(&mut out, t);
    writeln!(out, "{light}").ok();
    writeln!(out, "  {:<18}{}", "Avg latency:", format_ms_opt(t.latency.mean)).ok();
    writeln!(out, "  {:<18}{}", "p95 latency:", format_ms_opt(t.latency.p95)).ok();
    writeln!(out, "  {:<18}{}", "Max latency:", format_ms_opt(t.latency.max)).ok();
    let secs = summary.elapsed.as_secs_f64().max(1e-9);
    writeln!(
        out,
        "  {:<18}{} ({} req/s)",
        "Elapsed:",
        format_duration(summary.elapsed),
        format_rate(t.requests as f64 / secs)
    )
    .ok();
    writeln!(out, "{heavy}").ok();

    if !summary.scenarios.is_empty() {
        out.push_str("\nscenarios\n");
        for s in &summary.scenarios {
            writeln!(out, "  {} (vus_max={})", s.scenario, s.vus_max).ok();
            writeln!(out, "    {}", slice_line(&s.totals)).ok();
            for p in &s.phases {
                writeln!(out, "    phase {}: {}", p.phase, slice_line(&p.totals)).ok();
            }
        }
    }

    if !summary.thresholds.is_empty() {
        out.push_str("\nthresholds\n");
        for th in &summary.thresholds {
            let mark = if th.passed { "ok  " } else { "FAIL" };
            writeln!(
                out,
                "  {mark} {}: {} (observed {})",
                render_metric_key(&th.metric, &th.tags),
                th.expression,
                format_observed(th.observed)
            )
            .ok();
        }
    }

    out.push('\n');
    render_verdict(&mut out, summary);
    out
}

fn render_counts(out: &mut String, t: &OutcomeTotals) {
    let rows: [(&str, u64, Option<ErrorKind>); 5] = [
        ("Total requests:", t.requests, None),
        ("Successful:", t.successes, None),
        ("502 errors:", t.errors_502, Some(ErrorKind::ConnRefused)),
        ("504 errors:", t.errors_504, Some(ErrorKind::GatewayTimeout)),
        ("Other errors:", t.errors_other, Some(ErrorKind::Other)),
    ];
    for (label, value, kind) in rows {
        match kind {
            Some(kind) => writeln!(out, "  {label:<18}{value} ({})", kind.describe()).ok(),
            None => writeln!(out, "  {label:<18}{value}").ok(),
        };
    }
    writeln!(out, "  {:<18}{}", "Total errors:", t.errors()).ok();
    writeln!(out, "  {:<18}{}", "Error rate:", format_percent_opt(t.error_rate())).ok();
    if t.retries > 0 {
        writeln!(out, "  {:<18}{}", "Retries:", t.retries).ok();
    }
}

fn slice_line(t: &OutcomeTotals) -> String {
    format!(
        "requests={} errors={} (502={} 504={} other={}) error_rate={} p95={}",
        t.requests,
        t.errors(),
        t.errors_502,
        t.errors_504,
        t.errors_other,
        format_percent_opt(t.error_rate()),
        format_ms_opt(t.latency.p95)
    )
}

fn render_verdict(out: &mut String, summary: &RunSummary) {
    let v = summary.verdict();
    if v.zero_errors {
        writeln!(out, "PASS: Zero-downtime rolling update achieved!").ok();
    } else {
        writeln!(
            out,
            "FAIL: {} errors detected during the run.",
            summary.totals.errors()
        )
        .ok();
        writeln!(
            out,
            "      Expected under the currently deployed configuration; fix the shutdown path and re-run."
        )
        .ok();
    }

    let failed = summary.threshold_violations().count();
    if failed > 0 {
        writeln!(out, "FAIL: {failed} threshold(s) failed.").ok();
    } else if !summary.thresholds.is_empty() {
        writeln!(out, "PASS: all thresholds passed.").ok();
    }
}

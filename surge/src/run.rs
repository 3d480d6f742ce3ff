use anyhow::Context as _;
use std::sync::Arc;

use surge_core::{PlanOptions, RunConfig, ThresholdSet, parse_threshold_metric_key};
use surge_http::HttpClient;
use surge_metrics::Registry;

use crate::cli::{RunArgs, ThresholdArg};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::plan_yaml;
use crate::run_error::RunError;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let out = output::formatter(args.output);

    let (source, opts) = load_plan_options(&args)
        .await
        .map_err(RunError::invalid_input)?;
    let cfg = run_config(&args).map_err(RunError::invalid_input)?;
    let plan = surge_core::resolve_plan(opts, cfg)
        .context("invalid run plan")
        .map_err(RunError::invalid_input)?;

    out.print_header(&source, &plan);

    let transport = Arc::new(HttpClient::default());
    let metrics = Arc::new(Registry::default());
    let summary = surge_core::run_plan(&plan, transport, metrics, out.progress())
        .await
        .context("load run failed")
        .map_err(RunError::runtime)?;

    out.print_summary(&summary).map_err(RunError::runtime)?;

    let verdict = summary.verdict();
    tracing::info!(
        zero_errors = verdict.zero_errors,
        thresholds_passed = verdict.thresholds_passed,
        "verdict"
    );
    Ok(ExitCode::from_verdict(verdict))
}

async fn load_plan_options(args: &RunArgs) -> anyhow::Result<(String, PlanOptions)> {
    if let Some(path) = &args.plan {
        let opts = plan_yaml::load_plan(path).await?;
        return Ok((path.display().to_string(), opts));
    }
    if let Some(preset) = args.preset {
        return Ok((format!("preset {preset}"), preset.load()?));
    }
    Ok(("flags".to_string(), PlanOptions::default()))
}

fn run_config(args: &RunArgs) -> anyhow::Result<RunConfig> {
    Ok(RunConfig {
        target: args.target.clone(),
        vus: args.vus,
        duration: args.duration,
        stages: args.stages.clone().map(|s| s.0).unwrap_or_default(),
        timeout: args.timeout,
        pause: args.pause,
        thresholds: threshold_sets(&args.thresholds)?,
        require: args.require.clone(),
    })
}

/// Repeated flags on the same metric key accumulate into one set.
fn threshold_sets(args: &[ThresholdArg]) -> anyhow::Result<Vec<ThresholdSet>> {
    let mut out: Vec<ThresholdSet> = Vec::new();
    for arg in args {
        let (metric, tags) = parse_threshold_metric_key(&arg.key)
            .map_err(|e| anyhow::anyhow!("invalid --threshold `{}`: {e}", arg.key))?;
        let set = ThresholdSet {
            metric,
            tags,
            expressions: vec![arg.expression.clone()],
        };
        match out.iter_mut().find(|s| s.key() == set.key()) {
            Some(existing) => existing.expressions.extend(set.expressions),
            None => out.push(set),
        }
    }
    Ok(out)
}

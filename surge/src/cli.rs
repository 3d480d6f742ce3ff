use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use surge_core::{Phase, Ramp};

use crate::presets::Preset;

const DURATION_HINT: &str = "expected e.g. 10s, 250ms, 2m";

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err(format!("duration cannot be empty ({DURATION_HINT})"));
    }
    // Bare numbers are seconds, matching plan files.
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|err| format!("invalid duration '{s}': {err} ({DURATION_HINT})"))
}

/// Comma separated `duration:target[:ramp]` items, e.g. `10s:10,2m:20,10s:0`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageList(pub Vec<Phase>);

fn parse_stages(input: &str) -> Result<StageList, String> {
    let mut phases = Vec::new();
    for item in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let mut parts = item.split(':').map(str::trim);
        let (Some(duration), Some(target)) = (parts.next(), parts.next()) else {
            return Err(format!("invalid stage '{item}' (expected duration:target[:ramp])"));
        };
        let duration = parse_duration(duration)?;
        let target: u64 = target
            .parse()
            .map_err(|_| format!("invalid stage target '{target}' in '{item}'"))?;
        let ramp = match parts.next() {
            Some(raw) => raw
                .parse::<Ramp>()
                .map_err(|_| format!("invalid ramp '{raw}' in '{item}' (expected linear or instant)"))?,
            None => Ramp::Linear,
        };
        if parts.next().is_some() {
            return Err(format!("invalid stage '{item}' (expected duration:target[:ramp])"));
        }
        phases.push(Phase {
            name: None,
            duration,
            target,
            ramp,
        });
    }
    if phases.is_empty() {
        return Err("stages cannot be empty (expected e.g. 10s:10,2m:20,10s:0)".to_string());
    }
    Ok(StageList(phases))
}

/// `metric=expr` or `metric{tag=value}=expr`.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdArg {
    pub key: String,
    pub expression: String,
}

fn parse_threshold_arg(input: &str) -> Result<ThresholdArg, String> {
    let s = input.trim();
    // The selector may itself contain `=`, so split after its closing brace.
    let key_end = match (s.find('{'), s.find('=')) {
        (Some(open), Some(eq)) if open < eq => s[open..]
            .find('}')
            .map(|close| open + close + 1)
            .ok_or_else(|| format!("unterminated tag selector in '{s}'"))?,
        (_, Some(eq)) => eq,
        (_, None) => return Err(format!("invalid threshold '{s}' (expected metric=expr)")),
    };

    let (key, rest) = s.split_at(key_end);
    let Some(expression) = rest.trim_start().strip_prefix('=') else {
        return Err(format!("invalid threshold '{s}' (expected metric=expr)"));
    };
    let (key, expression) = (key.trim(), expression.trim());
    if key.is_empty() || expression.is_empty() {
        return Err(format!("invalid threshold '{s}' (expected metric=expr)"));
    }
    Ok(ThresholdArg {
        key: key.to_string(),
        expression: expression.to_string(),
    })
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Live progress bars and a human-readable summary.
    HumanReadable,
    /// Emit JSON progress lines and a final summary line (NDJSON) to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Phased HTTP load generator for zero-downtime rollout checks",
    long_about = "surge drives phased HTTP GET load at a single target and reports every dropped request.\n\nRun it against a gateway while a rolling update happens: 502s (connection refused), 504s (timeouts) and invalid responses are counted separately, and the run passes only when thresholds hold and zero errors were observed.",
    after_help = "Examples:\n  surge run --preset rolling-update --target http://localhost:8080/\n  surge run --target http://localhost:8080/ --stages 10s:10,2m:20,10s:0\n  surge run --plan plan.yaml --threshold 'error_rate=rate<0.01' --output json\n  TARGET_URL=http://gateway/ surge run --preset gateway-retry --require worker\n\nExit codes: 0 pass, 10 errors detected, 11 thresholds failed, 12 both, 30 invalid input, 40 runtime error."
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against a target URL
    #[command(
        long_about = "Run a load plan against the target.\n\nThe plan comes from --plan, --preset, or the flags alone. Flags override plan values."
    )]
    Run(RunArgs),

    /// List the built-in plan presets, or print one as YAML
    Presets(PresetsArgs),
}

#[derive(Debug, Args)]
pub struct PresetsArgs {
    /// Print the YAML of this preset instead of listing all of them
    #[arg(long, value_enum, value_name = "NAME")]
    pub show: Option<Preset>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Plan file (.yaml/.yml)
    #[arg(long, value_name = "FILE", conflicts_with = "preset")]
    pub plan: Option<PathBuf>,

    /// Built-in plan
    #[arg(long, value_enum, value_name = "NAME")]
    pub preset: Option<Preset>,

    /// Target URL (http:// or https://)
    #[arg(long, env = "TARGET_URL", value_name = "URL")]
    pub target: Option<String>,

    /// Number of virtual users (turns every scenario into constant-vus)
    #[arg(long)]
    pub vus: Option<u64>,

    /// Test duration (e.g. 30s, 2m)
    #[arg(long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Ramping stages, `duration:target[:ramp]` comma separated (e.g. 10s:10,2m:20,10s:0)
    #[arg(long, value_parser = parse_stages, conflicts_with_all = ["vus", "duration"])]
    pub stages: Option<StageList>,

    /// Per-request timeout
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// Pause between requests of one virtual user
    #[arg(long, value_parser = parse_duration)]
    pub pause: Option<Duration>,

    /// Threshold, `metric=expr` (repeatable; replaces plan thresholds on the same metric)
    #[arg(long = "threshold", value_name = "METRIC=EXPR", value_parser = parse_threshold_arg)]
    pub thresholds: Vec<ThresholdArg>,

    /// Body field that must be present and truthy (repeatable; enables the JSON body check)
    #[arg(long = "require", value_name = "FIELD")]
    pub require: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,
}

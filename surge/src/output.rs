use surge_core::{ProgressFn, RunPlan, RunSummary};

use crate::cli::OutputFormat;

mod human;
mod json;

/// Renders one run: a header before load starts, live progress, then the summary.
pub(crate) trait OutputFormatter: Send + Sync {
    /// `source` names where the plan came from: a file path, `preset <name>` or `flags`.
    fn print_header(&self, source: &str, plan: &RunPlan);
    fn progress(&self) -> Option<ProgressFn>;
    fn print_summary(&self, summary: &RunSummary) -> anyhow::Result<()>;
}

pub(crate) fn formatter(format: OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        OutputFormat::HumanReadable => Box::new(human::HumanReadableOutput::new()),
        OutputFormat::Json => Box::new(json::JsonOutput),
    }
}

use std::sync::Arc;

mod format;
mod progress;
mod summary;

use format::{format_duration, format_ms_opt, format_percent_opt, format_rate};
use progress::HumanProgress;
use summary::render;
use surge_core::{BodyCheck, ProgressUpdate, RunPlan, ScenarioExecutor, ScenarioState};

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

fn describe_check(check: &BodyCheck) -> String {
    match check {
        BodyCheck::None => "status 200".to_string(),
        BodyCheck::Json { require, equals } => {
            let mut parts: Vec<String> = require.clone();
            parts.extend(equals.iter().map(|(k, v)| format!("{k}=={v}")));
            format!("status 200 + json [{}]", parts.join(", "))
        }
    }
}

fn describe_executor(executor: &ScenarioExecutor) -> String {
    match executor {
        ScenarioExecutor::ConstantVus { vus, duration } => {
            format!("constant-vus vus={vus} duration={}", format_duration(*duration))
        }
        ScenarioExecutor::RampingVus { start_vus, stages } => {
            let stages = stages
                .iter()
                .map(|p| format!("{}:{}", format_duration(p.duration), p.target))
                .collect::<Vec<_>>()
                .join(",");
            format!("ramping-vus start={start_vus} stages={stages}")
        }
    }
}

fn progress_message(u: &ProgressUpdate) -> String {
    match u.state {
        ScenarioState::Pending => "pending".to_string(),
        ScenarioState::Finished => format!(
            "done requests={} errors={}",
            u.metrics.requests_total,
            u.metrics.errors_total()
        ),
        ScenarioState::Running => {
            let stage = u
                .stage
                .as_ref()
                .map(|s| format!(" {}({}/{}) target={}", s.name, s.stage, s.stages, s.current_target))
                .unwrap_or_default();
            format!(
                "vus={}{stage} rps={} err={} errors={} (502={} 504={} other={}) p95={}",
                u.active_vus,
                format_rate(u.metrics.rps_now),
                format_percent_opt(Some(u.metrics.error_rate_now)),
                u.metrics.errors_total(),
                u.metrics.errors_502_total,
                u.metrics.errors_504_total,
                u.metrics.errors_other_total,
                format_ms_opt(u.metrics.latency_p95_ms)
            )
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, source: &str, plan: &RunPlan) {
        println!("plan: {source}");
        println!("target: {}", plan.target);
        println!(
            "timeout={} pause={} check={}",
            format_duration(plan.timeout),
            format_duration(plan.pause),
            describe_check(&plan.check)
        );
        for s in &plan.scenarios {
            println!(
                "scenario: {} start={} {}",
                s.name,
                format_duration(s.start_time),
                describe_executor(&s.executor)
            );
            self.progress
                .register(&s.name, s.executor.schedule().total_duration());
        }
        println!();
    }

    fn progress(&self) -> Option<surge_core::ProgressFn> {
        let progress = self.progress.clone();
        Some(Arc::new(move |u| {
            let message = progress_message(&u);
            progress.update(&u.scenario, u.scenario_duration, u.scenario_elapsed, message);
        }))
    }

    fn print_summary(&self, summary: &surge_core::RunSummary) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(summary));

        let violations: Vec<_> = summary.threshold_violations().collect();
        if !violations.is_empty() {
            eprintln!("thresholds failed:");
            for v in violations {
                let key = surge_core::render_metric_key(&v.metric, &v.tags);
                match v.observed {
                    Some(obs) => eprintln!("  {key}: {} (observed {obs})", v.expression),
                    None => eprintln!("  {key}: {} (no data)", v.expression),
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use surge_core::{LiveMetrics, Phase, StageProgress};

    fn update(state: ScenarioState) -> ProgressUpdate {
        ProgressUpdate {
            tick: 3,
            elapsed: Duration::from_secs(3),
            scenario: "rolling_update".to_string(),
            state,
            scenario_elapsed: Duration::from_secs(3),
            scenario_duration: Duration::from_secs(90),
            active_vus: 20,
            stage: Some(StageProgress {
                stage: 1,
                stages: 1,
                name: "steady".to_string(),
                stage_elapsed: Duration::from_secs(3),
                stage_remaining: Duration::from_secs(87),
                start_target: 20,
                end_target: 20,
                current_target: 20,
            }),
            metrics: LiveMetrics {
                rps_now: 66.4,
                error_rate_now: 0.05,
                requests_total: 200,
                successes_total: 190,
                errors_502_total: 10,
                latency_p95_ms: Some(41.31),
                ..LiveMetrics::default()
            },
        }
    }

    #[test]
    fn running_message_shows_live_counters() {
        let msg = progress_message(&update(ScenarioState::Running));
        assert_eq!(
            msg,
            "vus=20 steady(1/1) target=20 rps=66 err=5.00% errors=10 (502=10 504=0 other=0) p95=41.3ms"
        );
        assert_eq!(
            progress_message(&update(ScenarioState::Finished)),
            "done requests=200 errors=10"
        );
    }

    #[test]
    fn describes_plan_pieces() {
        assert_eq!(describe_check(&BodyCheck::None), "status 200");
        assert_eq!(
            describe_check(&BodyCheck::gateway()),
            "status 200 + json [worker, gateway, status==\"ok\"]"
        );
        let ramp = ScenarioExecutor::RampingVus {
            start_vus: 0,
            stages: vec![
                Phase::linear(Duration::from_secs(10), 10),
                Phase::linear(Duration::from_secs(120), 20),
            ],
        };
        assert_eq!(describe_executor(&ramp), "ramping-vus start=0 stages=10s:10,2m00s:20");
    }
}

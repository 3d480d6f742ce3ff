use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use surge_metrics::Registry;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::executor::RequestExecutor;
use super::schedule::PhaseSchedule;
use super::vu::{ScenarioRuntime, StopSignal, VuContext, run_vu};
use crate::config::{RunPlan, ScenarioConfig};
use crate::error::Result;
use crate::metrics_agg::{MetricComputer, ScenarioSnapshot};
use crate::progress::{ProgressFn, ProgressUpdate, ScenarioState, StageProgress};
use crate::request_metrics::RequestMetricIds;
use crate::summary::RunSummary;
use crate::thresholds_eval::evaluate_thresholds;
use crate::transport::Transport;

/// How often each scenario re-reads its schedule.
pub const CONTROL_TICK: Duration = Duration::from_millis(10);
pub const PROGRESS_TICK: Duration = Duration::from_secs(1);

/// Live state the progress ticker reads.
#[derive(Debug)]
struct ScenarioHandle {
    name: String,
    schedule: Arc<PhaseSchedule>,
    started: Arc<OnceCell<Instant>>,
    finished: Arc<AtomicBool>,
    active_vus: Arc<AtomicU64>,
}

struct Shared<T> {
    executor: RequestExecutor<T>,
    metrics: Arc<Registry>,
    ids: RequestMetricIds,
    pause: Duration,
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            executor: self.executor.clone(),
            metrics: self.metrics.clone(),
            ids: self.ids,
            pause: self.pause,
        }
    }
}

/// Runs every scenario of `plan` to completion, then evaluates thresholds and
/// summarizes. Scenarios start together, each offset by its `start_time`.
pub async fn run_plan<T: Transport>(
    plan: &RunPlan,
    transport: Arc<T>,
    metrics: Arc<Registry>,
    progress: Option<ProgressFn>,
) -> Result<RunSummary> {
    let ids = RequestMetricIds::register(&metrics);
    let computer = MetricComputer::new(&metrics, ids);
    let shared = Shared {
        executor: RequestExecutor::new(transport, plan),
        metrics: metrics.clone(),
        ids,
        pause: plan.pause,
    };

    let run_started = Instant::now();
    tracing::info!(
        target_url = %plan.target,
        scenarios = plan.scenarios.len(),
        duration = ?plan.total_duration(),
        "run started"
    );

    let mut handles: Vec<ScenarioHandle> = Vec::with_capacity(plan.scenarios.len());
    let mut tasks: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(plan.scenarios.len());
    for scenario in &plan.scenarios {
        let handle = ScenarioHandle {
            name: scenario.name.clone(),
            schedule: Arc::new(scenario.executor.schedule()),
            started: Arc::new(OnceCell::new()),
            finished: Arc::new(AtomicBool::new(false)),
            active_vus: Arc::new(AtomicU64::new(0)),
        };

        tasks.push(tokio::spawn(run_scenario(
            scenario.clone(),
            run_started,
            handle.schedule.clone(),
            handle.started.clone(),
            handle.active_vus.clone(),
            handle.finished.clone(),
            shared.clone(),
        )));
        handles.push(handle);
    }

    let handles = Arc::new(handles);
    let progress_task = progress.map(|progress| {
        tokio::spawn(progress_loop(
            progress,
            handles.clone(),
            metrics.clone(),
            computer,
            run_started,
        ))
    });

    let mut first_err = None;
    for task in tasks {
        let res = match task.await {
            Ok(res) => res,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = res
            && first_err.is_none()
        {
            first_err = Some(err);
        }
    }

    if let Some(task) = progress_task {
        task.abort();
        let _ = task.await;
    }

    if let Some(err) = first_err {
        return Err(err);
    }

    let elapsed = run_started.elapsed();
    let thresholds = evaluate_thresholds(&metrics, &plan.thresholds)?;
    let phase_names: Vec<(String, Vec<String>)> = handles
        .iter()
        .map(|h| {
            (
                h.name.clone(),
                h.schedule.names().iter().map(|n| n.to_string()).collect(),
            )
        })
        .collect();

    let summary = computer.build_run_summary(&metrics, &phase_names, thresholds, elapsed);
    tracing::info!(
        requests = summary.totals.requests,
        errors = summary.totals.errors(),
        elapsed = ?elapsed,
        "run finished"
    );
    Ok(summary)
}

async fn run_scenario<T: Transport>(
    scenario: ScenarioConfig,
    run_started: Instant,
    schedule: Arc<PhaseSchedule>,
    started_cell: Arc<OnceCell<Instant>>,
    active_vus: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
    shared: Shared<T>,
) -> Result<()> {
    tokio::time::sleep_until(run_started + scenario.start_time).await;

    let name: Arc<str> = Arc::from(scenario.name.as_str());
    if let Some(note) = &scenario.note {
        tracing::warn!(scenario = %name, "{note}");
    }
    tracing::info!(
        scenario = %name,
        executor = %scenario.executor.kind(),
        duration = ?schedule.total_duration(),
        max_vus = schedule.max_target(),
        "scenario started"
    );

    let started = Instant::now();
    let _ = started_cell.set(started);
    let runtime = Arc::new(ScenarioRuntime {
        name: name.clone(),
        tags: scenario.tags.clone(),
        schedule: (*schedule).clone(),
        started,
        deadline: started + schedule.total_duration(),
    });

    // Most recently started VU last, so scale-down pops it first.
    let mut running: Vec<(Arc<StopSignal>, JoinHandle<()>)> = Vec::new();
    let mut retired: Vec<JoinHandle<()>> = Vec::new();
    let mut next_vu_id: u64 = 1;
    let mut current_phase: Option<usize> = None;

    let mut interval = tokio::time::interval(CONTROL_TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let elapsed = started.elapsed();
        if schedule.is_done(elapsed) {
            break;
        }

        if let Some(idx) = schedule.phase_at(elapsed)
            && current_phase != Some(idx)
        {
            current_phase = Some(idx);
            let phase = &schedule.phases()[idx];
            tracing::info!(
                scenario = %name,
                phase = %schedule.names()[idx],
                target = phase.target,
                ramp = %phase.ramp,
                duration = ?phase.duration,
                "phase started"
            );
        }

        let target = usize::try_from(schedule.target_at(elapsed)).unwrap_or(usize::MAX);
        while running.len() < target {
            let stop = Arc::new(StopSignal::new());
            let ctx = VuContext {
                vu_id: next_vu_id,
                scenario: runtime.clone(),
                executor: shared.executor.clone(),
                metrics: shared.metrics.clone(),
                ids: shared.ids,
                pause: shared.pause,
                stop: stop.clone(),
            };
            next_vu_id = next_vu_id.saturating_add(1);
            running.push((stop, tokio::spawn(run_vu(ctx))));
        }
        while running.len() > target {
            let Some((stop, handle)) = running.pop() else {
                break;
            };
            stop.stop();
            retired.push(handle);
        }

        let active = running.len() as u64;
        if active_vus.swap(active, Ordering::Relaxed) != active {
            shared
                .ids
                .record_active_vus(&shared.metrics, &name, active);
        }
    }

    for (stop, _) in &running {
        stop.stop();
    }
    retired.extend(running.into_iter().map(|(_, h)| h));
    for handle in retired {
        handle.await?;
    }

    active_vus.store(0, Ordering::Relaxed);
    shared.ids.record_active_vus(&shared.metrics, &name, 0);
    finished.store(true, Ordering::Release);
    tracing::info!(scenario = %name, "scenario finished");
    Ok(())
}

async fn progress_loop(
    progress: ProgressFn,
    scenarios: Arc<Vec<ScenarioHandle>>,
    metrics: Arc<Registry>,
    computer: MetricComputer,
    run_started: Instant,
) {
    let mut interval = tokio::time::interval_at(run_started + PROGRESS_TICK, PROGRESS_TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut tick: u64 = 0;
    let mut last_at = run_started;
    let mut last: HashMap<String, ScenarioSnapshot> = HashMap::new();

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);
        let now = Instant::now();
        let dt = now.duration_since(last_at);
        last_at = now;

        for s in scenarios.iter() {
            let prev = last.get(&s.name).copied().unwrap_or_default();
            let (live, snapshot) = computer.compute_live_metrics(&metrics, &s.name, prev, dt);
            last.insert(s.name.clone(), snapshot);

            let (state, scenario_elapsed) = match s.started.get() {
                None => (ScenarioState::Pending, Duration::ZERO),
                Some(_) if s.finished.load(Ordering::Acquire) => {
                    (ScenarioState::Finished, s.schedule.total_duration())
                }
                Some(started) => (
                    ScenarioState::Running,
                    now.saturating_duration_since(*started),
                ),
            };

            let stage = s
                .schedule
                .stage_snapshot_at(scenario_elapsed)
                .map(|st| StageProgress {
                    stage: st.index + 1,
                    stages: st.count,
                    name: st.name.to_string(),
                    stage_elapsed: st.stage_elapsed,
                    stage_remaining: st.stage_remaining,
                    start_target: st.start_target,
                    end_target: st.end_target,
                    current_target: st.current_target,
                });

            progress(ProgressUpdate {
                tick,
                elapsed: now.saturating_duration_since(run_started),
                scenario: s.name.clone(),
                state,
                scenario_elapsed,
                scenario_duration: s.schedule.total_duration(),
                active_vus: s.active_vus.load(Ordering::Relaxed),
                stage,
                metrics: live,
            });
        }
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use surge_metrics::Registry;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::executor::RequestExecutor;
use super::schedule::PhaseSchedule;
use crate::request_metrics::{RequestMetricIds, RequestSample};
use crate::transport::Transport;

/// Cooperative stop flag, checked by a VU between iterations.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            // Register before checking so a concurrent `stop` is never missed.
            let notified = self.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Per-scenario state shared by all of its VUs.
#[derive(Debug)]
pub struct ScenarioRuntime {
    pub name: Arc<str>,
    pub tags: Vec<(String, String)>,
    pub schedule: PhaseSchedule,
    pub started: Instant,
    pub deadline: Instant,
}

#[derive(Debug)]
pub struct VuContext<T> {
    pub vu_id: u64,
    pub scenario: Arc<ScenarioRuntime>,
    pub executor: RequestExecutor<T>,
    pub metrics: Arc<Registry>,
    pub ids: RequestMetricIds,
    pub pause: Duration,
    pub stop: Arc<StopSignal>,
}

pub async fn run_vu<T: Transport>(ctx: VuContext<T>) {
    let scenario = &ctx.scenario;

    loop {
        if ctx.stop.is_stopped() {
            break;
        }
        let now = Instant::now();
        if now >= scenario.deadline {
            break;
        }

        let phase = scenario
            .schedule
            .phase_name_at(now.saturating_duration_since(scenario.started));
        let outcome = ctx.executor.execute().await;

        ctx.ids.record_request(
            &ctx.metrics,
            RequestSample {
                scenario: &scenario.name,
                phase: &phase,
                outcome: &outcome,
            },
            &scenario.tags,
        );

        if let Some(kind) = outcome.error {
            tracing::debug!(
                vu = ctx.vu_id,
                scenario = %scenario.name,
                phase = %phase,
                status = ?outcome.status,
                error = %kind,
                transport_error = ?outcome.transport_error,
                latency_ms = outcome.latency.as_millis() as u64,
                "request failed: {}",
                kind.describe()
            );
        }

        if ctx.pause.is_zero() {
            tokio::task::yield_now().await;
            continue;
        }

        tokio::select! {
            _ = tokio::time::sleep(ctx.pause) => {}
            _ = ctx.stop.wait() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stop_wakes_waiters_and_sticks() {
        let stop = Arc::new(StopSignal::new());
        let waiter = {
            let stop = stop.clone();
            tokio::spawn(async move { stop.wait().await })
        };
        tokio::task::yield_now().await;
        stop.stop();

        if tokio::time::timeout(Duration::from_secs(1), waiter).await.is_err() {
            panic!("waiter did not observe stop");
        }
        assert!(stop.is_stopped());
        // Already stopped: returns immediately.
        stop.wait().await;
    }
}

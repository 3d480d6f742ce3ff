use std::sync::Arc;
use std::time::Duration;

use crate::config::{Phase, Ramp};

#[derive(Debug, Clone)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub name: Arc<str>,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// Target concurrency over time for one scenario, measured from the scenario start.
#[derive(Debug, Clone)]
pub struct PhaseSchedule {
    start: u64,
    phases: Vec<Phase>,
    names: Vec<Arc<str>>,
    cumulative_ends: Vec<Duration>,
}

impl PhaseSchedule {
    pub fn new(start: u64, phases: Vec<Phase>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(phases.len());
        let mut acc = Duration::ZERO;
        for p in &phases {
            acc = acc.saturating_add(p.duration);
            cumulative_ends.push(acc);
        }

        // Unnamed phases are numbered from 1.
        let names = phases
            .iter()
            .enumerate()
            .map(|(i, p)| match &p.name {
                Some(n) => Arc::from(n.as_str()),
                None => Arc::from(format!("stage_{}", i + 1)),
            })
            .collect();

        Self {
            start,
            phases,
            names,
            cumulative_ends,
        }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn names(&self) -> &[Arc<str>] {
        &self.names
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_done(&self, elapsed: Duration) -> bool {
        elapsed >= self.total_duration()
    }

    /// Highest target any phase asks for.
    pub fn max_target(&self) -> u64 {
        self.phases
            .iter()
            .map(|p| p.target)
            .chain(std::iter::once(self.start))
            .max()
            .unwrap_or(0)
    }

    /// Index of the phase active at `elapsed`. Phases own `[start, end)`, so a
    /// zero-duration phase is never active.
    pub fn phase_at(&self, elapsed: Duration) -> Option<usize> {
        let idx = self.cumulative_ends.partition_point(|end| *end <= elapsed);
        (idx < self.phases.len()).then_some(idx)
    }

    /// Phase name for tagging. Past the end this is the last phase that had any time.
    pub fn phase_name_at(&self, elapsed: Duration) -> Arc<str> {
        let idx = self.phase_at(elapsed).or_else(|| {
            self.phases
                .iter()
                .rposition(|p| !p.duration.is_zero())
        });
        match idx.and_then(|i| self.names.get(i)) {
            Some(n) => n.clone(),
            None => Arc::from("stage_1"),
        }
    }

    fn bounds(&self, idx: usize) -> (Duration, Duration) {
        let end = self.cumulative_ends[idx];
        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        (start, end)
    }

    fn start_target(&self, idx: usize) -> u64 {
        if idx == 0 {
            self.start
        } else {
            self.phases[idx - 1].target
        }
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(idx) = self.phase_at(elapsed) else {
            return self.phases.last().map(|p| p.target).unwrap_or(self.start);
        };

        let phase = &self.phases[idx];
        let start_target = self.start_target(idx);
        let end_target = phase.target;
        if phase.ramp == Ramp::Instant {
            return end_target;
        }

        let (stage_start, stage_end) = self.bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        // Linear interpolation across the phase, rounded to the nearest VU.
        let start_i = start_target as i128;
        let delta = end_target as i128 - start_i;
        let num = stage_elapsed.as_nanos() as i128;
        let den = (stage_duration.as_nanos() as i128).max(1);

        let cur = start_i + div_round(delta.saturating_mul(num), den);
        cur.clamp(0, u64::MAX as i128) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.phases.is_empty() {
            return None;
        }

        let total = self.total_duration();
        let clamped = elapsed.min(total);
        let idx = self
            .phase_at(clamped)
            .unwrap_or(self.phases.len().saturating_sub(1));

        let (stage_start, stage_end) = self.bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start).min(stage_duration);

        Some(StageSnapshot {
            index: idx,
            count: self.phases.len(),
            name: self.names[idx].clone(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target: self.start_target(idx),
            end_target: self.phases[idx].target,
            current_target: self.target_at(clamped),
        })
    }
}

/// Integer division rounding half away from zero. `den` must be positive.
fn div_round(num: i128, den: i128) -> i128 {
    let half = den / 2;
    if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn linear_ramp_interpolates() {
        let s = PhaseSchedule::new(0, vec![Phase::linear(secs(10), 10), Phase::linear(secs(10), 0)]);
        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(secs(5)), 5);
        assert_eq!(s.target_at(secs(10)), 10);
        assert_eq!(s.target_at(secs(15)), 5);
        assert_eq!(s.target_at(secs(20)), 0);
        assert!(s.is_done(secs(20)));
        assert!(!s.is_done(Duration::from_millis(19_999)));
    }

    #[test]
    fn linear_ramp_rounds_to_nearest() {
        let s = PhaseSchedule::new(0, vec![Phase::linear(secs(10), 3)]);
        // 3 * 0.5 = 1.5 rounds up.
        assert_eq!(s.target_at(secs(5)), 2);
        // 3 * 0.4 = 1.2 rounds down.
        assert_eq!(s.target_at(secs(4)), 1);

        let down = PhaseSchedule::new(3, vec![Phase::linear(secs(10), 0)]);
        assert_eq!(down.target_at(secs(5)), 1);
    }

    #[test]
    fn instant_ramp_jumps_at_phase_start() {
        let s = PhaseSchedule::new(
            0,
            vec![Phase::instant(secs(5), 5), Phase::instant(secs(5), 200)],
        );
        assert_eq!(s.target_at(Duration::ZERO), 5);
        assert_eq!(s.target_at(secs(5)), 200);
        assert_eq!(s.max_target(), 200);
    }

    #[test]
    fn zero_duration_phase_is_skipped() {
        let s = PhaseSchedule::new(
            0,
            vec![
                Phase::linear(secs(10), 10).named("ramp"),
                Phase::instant(Duration::ZERO, 50).named("blip"),
                Phase::linear(secs(10), 10).named("hold"),
            ],
        );
        assert_eq!(s.phase_at(secs(10)), Some(2));
        assert_eq!(&*s.phase_name_at(secs(10)), "hold");
        // The blip's target still seeds the next linear phase.
        assert_eq!(s.target_at(secs(10)), 50);
        assert_eq!(s.target_at(secs(20)), 10);
    }

    #[test]
    fn unnamed_phases_get_ordinal_names() {
        let s = PhaseSchedule::new(0, vec![Phase::linear(secs(1), 1), Phase::linear(secs(1), 0)]);
        assert_eq!(&*s.phase_name_at(Duration::ZERO), "stage_1");
        assert_eq!(&*s.phase_name_at(Duration::from_millis(1500)), "stage_2");
        assert_eq!(&*s.phase_name_at(secs(5)), "stage_2");
    }

    #[test]
    fn snapshot_reports_position_within_phase() {
        let s = PhaseSchedule::new(5, vec![Phase::linear(secs(10), 15), Phase::linear(secs(10), 5)]);
        let snap = s
            .stage_snapshot_at(secs(12))
            .unwrap_or_else(|| panic!("snapshot"));
        assert_eq!(snap.index, 1);
        assert_eq!(snap.count, 2);
        assert_eq!(snap.stage_elapsed, secs(2));
        assert_eq!(snap.stage_remaining, secs(8));
        assert_eq!(snap.start_target, 15);
        assert_eq!(snap.end_target, 5);
        assert_eq!(snap.current_target, 13);

        let end = s
            .stage_snapshot_at(secs(60))
            .unwrap_or_else(|| panic!("snapshot"));
        assert_eq!(end.index, 1);
        assert_eq!(end.stage_remaining, Duration::ZERO);
    }
}

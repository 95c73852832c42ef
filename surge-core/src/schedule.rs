use std::time::Duration;

use crate::config::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSnapshot {
    pub index: usize,
    pub count: usize,
    pub stage_elapsed: Duration,
    pub stage_remaining: Duration,
    pub start_target: u64,
    pub end_target: u64,
    pub current_target: u64,
}

/// VU target as a function of elapsed run time.
///
/// The target starts at 0, moves linearly towards each stage's target over the stage's
/// duration and drops to 0 once the last stage has elapsed.
#[derive(Debug, Clone)]
pub struct StageSchedule {
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl StageSchedule {
    pub fn new(stages: Vec<Stage>) -> Self {
        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Self {
            stages,
            cumulative_ends,
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
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

    pub fn max_target(&self) -> u64 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Index of the stage active at `elapsed`. A boundary instant belongs to the stage
    /// that ends there; past the last stage there is none.
    pub fn stage_index_at(&self, elapsed: Duration) -> Option<usize> {
        if self.stages.is_empty() || elapsed > self.total_duration() {
            return None;
        }
        let idx = match self.cumulative_ends.binary_search(&elapsed) {
            Ok(i) | Err(i) => i,
        };
        Some(idx.min(self.stages.len() - 1))
    }

    fn stage_bounds(&self, idx: usize) -> (Duration, Duration, u64, u64) {
        let start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };
        let start_target = if idx == 0 {
            0
        } else {
            self.stages[idx - 1].target
        };
        (
            start,
            self.cumulative_ends[idx],
            start_target,
            self.stages[idx].target,
        )
    }

    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let Some(idx) = self.stage_index_at(elapsed) else {
            return 0;
        };
        if elapsed.is_zero() {
            return 0;
        }

        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);
        if start_target == end_target {
            return end_target;
        }

        let stage_duration = stage_end.saturating_sub(stage_start).as_secs_f64();
        let stage_elapsed = elapsed.saturating_sub(stage_start).as_secs_f64();
        let frac = if stage_duration > 0.0 {
            (stage_elapsed / stage_duration).clamp(0.0, 1.0)
        } else {
            1.0
        };

        let from = start_target as f64;
        let to = end_target as f64;
        // `f64::round` rounds half away from zero.
        let cur = (from + (to - from) * frac).round();
        let hi = start_target.max(end_target) as f64;
        cur.clamp(0.0, hi) as u64
    }

    pub fn stage_snapshot_at(&self, elapsed: Duration) -> Option<StageSnapshot> {
        if self.stages.is_empty() {
            return None;
        }

        let clamped = elapsed.min(self.total_duration());
        let idx = self
            .stage_index_at(clamped)
            .unwrap_or(self.stages.len() - 1);

        let (stage_start, stage_end, start_target, end_target) = self.stage_bounds(idx);
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = clamped.saturating_sub(stage_start);

        Some(StageSnapshot {
            index: idx,
            count: self.stages.len(),
            stage_elapsed,
            stage_remaining: stage_duration.saturating_sub(stage_elapsed),
            start_target,
            end_target,
            current_target: self.target_at(elapsed),
        })
    }
}

/// Change in the running VU population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationDelta {
    Spawn(u64),
    Retire(u64),
}

/// Tracks the population the coordinator has realised and turns new targets into deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct Population {
    current: u64,
}

impl Population {
    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn advance(&mut self, target: u64) -> Option<PopulationDelta> {
        let delta = match target.cmp(&self.current) {
            std::cmp::Ordering::Greater => PopulationDelta::Spawn(target - self.current),
            std::cmp::Ordering::Less => PopulationDelta::Retire(self.current - target),
            std::cmp::Ordering::Equal => return None,
        };
        self.current = target;
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn load_profile() -> StageSchedule {
        StageSchedule::new(vec![
            Stage::new(secs(10), 5),
            Stage::new(secs(30), 5),
            Stage::new(secs(20), 20),
            Stage::new(secs(60), 20),
            Stage::new(secs(10), 50),
            Stage::new(secs(30), 50),
            Stage::new(secs(20), 5),
            Stage::new(secs(10), 0),
        ])
    }

    #[test]
    fn boundaries_match_neighbouring_targets() {
        let schedule = load_profile();
        let mut start = Duration::ZERO;
        let mut prev_target = 0;
        for stage in schedule.stages().to_vec() {
            // Just after the stage starts the target is still the previous one.
            let just_after = start + Duration::from_millis(1);
            assert_eq!(schedule.target_at(just_after), prev_target);

            let end = start + stage.duration;
            assert_eq!(schedule.target_at(end), stage.target, "end of stage at {end:?}");

            start = end;
            prev_target = stage.target;
        }
    }

    #[test]
    fn ramp_interpolates_and_rounds_half_away_from_zero() {
        let schedule = StageSchedule::new(vec![Stage::new(secs(10), 10)]);
        assert_eq!(schedule.target_at(Duration::ZERO), 0);
        assert_eq!(schedule.target_at(Duration::from_millis(2_500)), 3);
        assert_eq!(schedule.target_at(Duration::from_millis(2_400)), 2);
        assert_eq!(schedule.target_at(secs(5)), 5);

        let down = StageSchedule::new(vec![Stage::new(secs(1), 4), Stage::new(secs(4), 0)]);
        // 4 -> 0 over 4s: at 1.5s into the stage the exact value is 2.5.
        assert_eq!(down.target_at(Duration::from_millis(2_500)), 3);
    }

    #[test]
    fn plateau_is_constant_and_terminal_target_is_zero() {
        let schedule = load_profile();
        for s in [11, 20, 39] {
            assert_eq!(schedule.target_at(secs(s)), 5);
        }
        assert_eq!(schedule.total_duration(), secs(190));
        assert_eq!(schedule.target_at(secs(190)), 0);
        assert_eq!(schedule.target_at(secs(500)), 0);

        let flat = StageSchedule::new(vec![Stage::new(secs(5), 3)]);
        assert_eq!(flat.target_at(secs(5)), 3);
        assert_eq!(flat.target_at(Duration::from_millis(5_001)), 0);
        assert_eq!(flat.target_at(secs(6)), 0);
        assert!(flat.is_done(secs(5)));
    }

    #[test]
    fn target_never_exceeds_stage_bounds() {
        let schedule = load_profile();
        let mut t = Duration::ZERO;
        while t <= schedule.total_duration() {
            let target = schedule.target_at(t);
            assert!(target <= 50);
            if let Some(snap) = schedule.stage_snapshot_at(t) {
                assert!(target <= snap.start_target.max(snap.end_target));
            }
            t += Duration::from_millis(250);
        }
    }

    #[test]
    fn snapshot_reports_stage_progress() {
        let schedule = load_profile();
        let snap = schedule
            .stage_snapshot_at(secs(50))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(snap.index, 2);
        assert_eq!(snap.count, 8);
        assert_eq!(snap.stage_elapsed, secs(10));
        assert_eq!(snap.stage_remaining, secs(10));
        assert_eq!(snap.start_target, 5);
        assert_eq!(snap.end_target, 20);
        assert_eq!(snap.current_target, 13);

        let end = schedule
            .stage_snapshot_at(secs(1_000))
            .unwrap_or_else(|| panic!("expected snapshot"));
        assert_eq!(end.index, 7);
        assert_eq!(end.stage_remaining, Duration::ZERO);
        assert_eq!(end.current_target, 0);
    }

    #[test]
    fn population_emits_deltas_only_on_change() {
        let mut pop = Population::default();
        assert_eq!(pop.advance(0), None);
        assert_eq!(pop.advance(3), Some(PopulationDelta::Spawn(3)));
        assert_eq!(pop.advance(3), None);
        assert_eq!(pop.advance(1), Some(PopulationDelta::Retire(2)));
        assert_eq!(pop.current(), 1);
    }
}

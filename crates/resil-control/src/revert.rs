//! Gradual revert scheduling
//!
//! When capacity returns, load is walked back toward the target
//! distribution in discrete linear steps over a fixed window instead of
//! snapping, so a shaky path is never handed its full share at once.

use crate::rebalance::normalize;
use crate::registry::DISTRIBUTION_EPSILON;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimum per-path difference, in percentage points, before a revert is
/// worth scheduling
pub const REVERT_TRIGGER_POINTS: f64 = 1.0;

/// One scheduled distribution change
#[derive(Debug, Clone)]
pub struct RevertStep {
    /// When to apply this step
    pub at: Instant,
    pub distribution: BTreeMap<u32, f64>,
}

/// A planned walk from the current distribution to the target
#[derive(Debug, Clone)]
pub struct RevertSchedule {
    pub steps: Vec<RevertStep>,
    pub target: BTreeMap<u32, f64>,
}

impl RevertSchedule {
    /// The final distribution the schedule lands on
    pub fn final_distribution(&self) -> Option<&BTreeMap<u32, f64>> {
        self.steps.last().map(|s| &s.distribution)
    }
}

/// True when `current` differs from `target` by more than one percentage
/// point on any path
pub fn needs_revert(current: &BTreeMap<u32, f64>, target: &BTreeMap<u32, f64>) -> bool {
    target.iter().any(|(id, &want)| {
        let have = current.get(id).copied().unwrap_or(0.0);
        (have - want).abs() > REVERT_TRIGGER_POINTS
    })
}

/// Plan `steps` linear interpolation steps from `current` to `target`
/// spread evenly across `duration`, each renormalised to sum to 100.
///
/// Step `i` lands at `start + i * (duration / steps)`; the final step
/// equals the target.
pub fn plan_revert(
    current: &BTreeMap<u32, f64>,
    target: &BTreeMap<u32, f64>,
    steps: usize,
    duration: Duration,
    start: Instant,
) -> RevertSchedule {
    let step_gap = duration / steps as u32;
    let mut planned = Vec::with_capacity(steps);

    for i in 1..=steps {
        let fraction = i as f64 / steps as f64;
        let mut distribution = BTreeMap::new();
        for (&id, &want) in target {
            let have = current.get(&id).copied().unwrap_or(0.0);
            distribution.insert(id, have + (want - have) * fraction);
        }
        normalize(&mut distribution);
        planned.push(RevertStep {
            at: start + step_gap * i as u32,
            distribution,
        });
    }

    debug!(steps = planned.len(), "revert schedule planned");
    RevertSchedule {
        steps: planned,
        target: target.clone(),
    }
}

/// True when two distributions agree within the distribution tolerance;
/// applying such a step is a no-op
pub fn distributions_equal(a: &BTreeMap<u32, f64>, b: &BTreeMap<u32, f64>) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(id, &va)| {
        b.get(id)
            .map(|&vb| (va - vb).abs() <= DISTRIBUTION_EPSILON)
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dist(entries: &[(u32, f64)]) -> BTreeMap<u32, f64> {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_needs_revert_gate() {
        let optimal = dist(&[(0, 50.0), (1, 30.0), (2, 20.0)]);
        assert!(needs_revert(&dist(&[(0, 5.0), (1, 57.0), (2, 38.0)]), &optimal));
        assert!(!needs_revert(&dist(&[(0, 50.5), (1, 29.6), (2, 19.9)]), &optimal));
    }

    #[test]
    fn test_five_step_linear_walk() {
        let current = dist(&[(0, 5.0), (1, 57.0), (2, 38.0)]);
        let target = dist(&[(0, 50.0), (1, 30.0), (2, 20.0)]);
        let start = Instant::now();

        let schedule = plan_revert(&current, &target, 5, Duration::from_secs(7), start);
        assert_eq!(schedule.steps.len(), 5);

        // Every step sums to 100.
        for step in &schedule.steps {
            let sum: f64 = step.distribution.values().sum();
            assert!((sum - 100.0).abs() <= DISTRIBUTION_EPSILON);
        }

        // First step is one fifth of the way there.
        let first = &schedule.steps[0].distribution;
        assert!((first[&0] - 14.0).abs() < DISTRIBUTION_EPSILON);
        assert!((first[&1] - 51.6).abs() < DISTRIBUTION_EPSILON);

        // Final step lands exactly on the target.
        let last = schedule.final_distribution().unwrap();
        assert!((last[&0] - 50.0).abs() <= DISTRIBUTION_EPSILON);
        assert!((last[&1] - 30.0).abs() <= DISTRIBUTION_EPSILON);
        assert!((last[&2] - 20.0).abs() <= DISTRIBUTION_EPSILON);
    }

    #[test]
    fn test_step_timestamps_are_evenly_spaced() {
        let current = dist(&[(0, 5.0), (1, 95.0)]);
        let target = dist(&[(0, 50.0), (1, 50.0)]);
        let start = Instant::now();
        let duration = Duration::from_secs(7);

        let schedule = plan_revert(&current, &target, 5, duration, start);
        let gap = duration / 5;
        for (i, step) in schedule.steps.iter().enumerate() {
            assert_eq!(step.at, start + gap * (i as u32 + 1));
        }
    }

    #[test]
    fn test_identical_distributions_detected() {
        let a = dist(&[(0, 50.0), (1, 50.0)]);
        let b = dist(&[(0, 50.004), (1, 49.996)]);
        let c = dist(&[(0, 40.0), (1, 60.0)]);
        assert!(distributions_equal(&a, &b));
        assert!(!distributions_equal(&a, &c));
        assert!(!distributions_equal(&a, &dist(&[(0, 100.0)])));
    }

    #[test]
    fn test_plan_handles_paths_missing_from_current() {
        // A path registered after the last rebalance starts from zero.
        let current = dist(&[(0, 100.0)]);
        let target = dist(&[(0, 50.0), (1, 50.0)]);
        let schedule = plan_revert(&current, &target, 5, Duration::from_secs(5), Instant::now());
        let last = schedule.final_distribution().unwrap();
        assert!((last[&1] - 50.0).abs() <= DISTRIBUTION_EPSILON);
    }
}

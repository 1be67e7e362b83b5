//! Decaying per-worker performance aggregate.

use serde::{Deserialize, Serialize};
use tracing::warn;

use pacer_core::WorkerIdentity;

use crate::error::{PerfError, PerfResult};

/// Accumulated (task count, total time) for a single worker.
///
/// Once the count exceeds `limit` the aggregate is compressed back to
/// `limit` tasks, removing the average time of the surplus. The result
/// approximates recent performance instead of a lifetime average.
///
/// After `kill()` the state is a tombstone and every mutation fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPerformance {
    identity: WorkerIdentity,
    tasks: u64,
    time_ms: u64,
    limit: u64,
    killed: bool,
}

impl WorkerPerformance {
    /// An empty, unbounded aggregate.
    pub fn new(identity: WorkerIdentity) -> Self {
        Self {
            identity,
            tasks: 0,
            time_ms: 0,
            limit: u64::MAX,
            killed: false,
        }
    }

    /// The aggregate created by a worker's first reported completion.
    pub fn from_completion(identity: WorkerIdentity, elapsed_ms: u64) -> PerfResult<Self> {
        let mut state = Self::new(identity);
        state.add_task(elapsed_ms)?;
        Ok(state)
    }

    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    pub fn tasks(&self) -> u64 {
        self.tasks
    }

    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// Record one completed unit.
    pub fn add_task(&mut self, elapsed_ms: u64) -> PerfResult<()> {
        self.ensure_alive()?;
        if elapsed_ms == 0 {
            warn!(worker = %self.identity.id, "rejected completion with zero elapsed time");
            return Err(PerfError::ZeroElapsed);
        }
        self.tasks += 1;
        self.time_ms = self.time_ms.saturating_add(elapsed_ms);
        self.decay();
        Ok(())
    }

    /// Fold another aggregate into this one.
    ///
    /// Identity and priority are refreshed from `other`.
    pub fn merge(&mut self, other: &WorkerPerformance) -> PerfResult<()> {
        self.ensure_alive()?;
        self.identity = other.identity.clone();
        self.tasks = self.tasks.saturating_add(other.tasks);
        self.time_ms = self.time_ms.saturating_add(other.time_ms);
        self.decay();
        Ok(())
    }

    /// Change the decay limit, compressing immediately if already above it.
    pub fn set_limit(&mut self, limit: u64) -> PerfResult<()> {
        self.ensure_alive()?;
        if limit == 0 {
            return Err(PerfError::ZeroLimit);
        }
        self.limit = limit;
        self.decay();
        Ok(())
    }

    /// Tasks per second, or `0.0` when no time has been recorded.
    pub fn performance(&self) -> f64 {
        if self.time_ms == 0 {
            0.0
        } else {
            self.tasks as f64 * 1000.0 / self.time_ms as f64
        }
    }

    /// `performance()` rounded half away from zero to `precision` decimals.
    pub fn performance_rounded(&self, precision: u32) -> f64 {
        let factor = 10f64.powi(precision as i32);
        (self.performance() * factor).round() / factor
    }

    /// Tombstone this state. Returns `true` only for the first call.
    pub fn kill(&mut self) -> bool {
        if self.killed {
            return false;
        }
        self.killed = true;
        true
    }

    /// Tombstone the state and drop its accumulated data.
    pub fn clear(&mut self) {
        self.killed = true;
        self.tasks = 0;
        self.time_ms = 0;
    }

    fn ensure_alive(&self) -> PerfResult<()> {
        if self.killed {
            warn!(worker = %self.identity.id, "rejected update of killed worker state");
            return Err(PerfError::Killed(self.identity.id));
        }
        Ok(())
    }

    fn decay(&mut self) {
        if self.tasks <= self.limit {
            return;
        }
        let diff = self.tasks - self.limit;
        let avg = self.time_ms as f64 / self.tasks as f64;
        self.tasks = self.limit;
        self.time_ms = self.time_ms.saturating_sub((avg * diff as f64).round() as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pacer_core::{WorkerId, WorkerPriority};

    fn identity(n: u64) -> WorkerIdentity {
        WorkerIdentity::new(WorkerId(n))
    }

    #[test]
    fn add_task_accumulates() {
        let mut state = WorkerPerformance::new(identity(1));
        state.add_task(100).unwrap();
        state.add_task(300).unwrap();
        assert_eq!(state.tasks(), 2);
        assert_eq!(state.time_ms(), 400);
        assert_eq!(state.performance(), 5.0);
    }

    #[test]
    fn zero_elapsed_is_rejected_without_change() {
        let mut state = WorkerPerformance::from_completion(identity(1), 50).unwrap();
        let before = state.clone();
        assert_eq!(state.add_task(0), Err(PerfError::ZeroElapsed));
        assert_eq!(state, before);
        assert!(WorkerPerformance::from_completion(identity(2), 0).is_err());
    }

    #[test]
    fn decay_keeps_count_at_limit() {
        let mut state = WorkerPerformance::new(identity(1));
        state.set_limit(3).unwrap();
        for _ in 0..3 {
            state.add_task(100).unwrap();
        }
        state.add_task(200).unwrap();
        // 4 tasks / 500ms → drop one average task (125ms).
        assert_eq!(state.tasks(), 3);
        assert_eq!(state.time_ms(), 375);
    }

    #[test]
    fn decay_rounds_half_away_from_zero() {
        let mut state = WorkerPerformance::new(identity(1));
        state.add_task(1).unwrap();
        state.add_task(2).unwrap();
        state.add_task(2).unwrap();
        state.add_task(2).unwrap();
        // avg 7/4 = 1.75, surplus 2 → 3.5 rounds to 4.
        state.set_limit(2).unwrap();
        assert_eq!(state.tasks(), 2);
        assert_eq!(state.time_ms(), 3);
    }

    #[test]
    fn decay_invariant_holds_over_sequences() {
        let samples = [12u64, 7, 300, 45, 45, 1, 999, 63, 18, 250, 3, 77, 81, 5];
        for limit in 1..=6u64 {
            let mut state = WorkerPerformance::new(identity(1));
            state.set_limit(limit).unwrap();
            for &ms in &samples {
                let tasks_before = state.tasks() + 1;
                let time_before = state.time_ms() + ms;
                let avg_before = time_before as f64 / tasks_before as f64;

                state.add_task(ms).unwrap();
                assert!(state.tasks() <= limit);

                let avg_after = state.time_ms() as f64 / state.tasks() as f64;
                assert!(
                    (avg_before - avg_after).abs() <= 1.0,
                    "limit {limit}: avg drifted {avg_before} -> {avg_after}"
                );
            }
        }
    }

    #[test]
    fn set_limit_compresses_immediately() {
        let mut state = WorkerPerformance::new(identity(1));
        for _ in 0..10 {
            state.add_task(40).unwrap();
        }
        state.set_limit(4).unwrap();
        assert_eq!(state.tasks(), 4);
        assert_eq!(state.time_ms(), 160);
        assert_eq!(state.set_limit(0), Err(PerfError::ZeroLimit));
        assert_eq!(state.limit(), 4);
    }

    #[test]
    fn merge_refreshes_identity_and_decays() {
        let mut local = WorkerPerformance::new(identity(1));
        local.set_limit(2).unwrap();
        local.add_task(100).unwrap();

        let sample = WorkerPerformance::from_completion(
            identity(1).with_priority(WorkerPriority::Low),
            100,
        )
        .unwrap();
        local.merge(&sample).unwrap();
        local.merge(&sample).unwrap();

        assert_eq!(local.identity().priority, WorkerPriority::Low);
        assert_eq!(local.tasks(), 2);
        assert_eq!(local.time_ms(), 200);
    }

    #[test]
    fn kill_is_idempotent_and_freezes_state() {
        let mut state = WorkerPerformance::from_completion(identity(3), 80).unwrap();
        assert!(state.kill());
        let frozen = state.clone();

        for _ in 0..3 {
            assert!(!state.kill());
        }
        assert_eq!(state.add_task(10), Err(PerfError::Killed(WorkerId(3))));
        assert_eq!(state.set_limit(1), Err(PerfError::Killed(WorkerId(3))));
        let other = WorkerPerformance::from_completion(identity(4), 10).unwrap();
        assert_eq!(state.merge(&other), Err(PerfError::Killed(WorkerId(3))));
        assert_eq!(state, frozen);
    }

    #[test]
    fn clear_kills_and_zeroes() {
        let mut state = WorkerPerformance::from_completion(identity(1), 80).unwrap();
        state.clear();
        assert!(state.is_killed());
        assert_eq!(state.tasks(), 0);
        assert_eq!(state.performance(), 0.0);
    }

    #[test]
    fn performance_rounding() {
        let mut state = WorkerPerformance::new(identity(1));
        assert_eq!(state.performance(), 0.0);
        state.add_task(3).unwrap();
        // 1000 / 3 = 333.333…
        assert_eq!(state.performance_rounded(2), 333.33);
        assert_eq!(state.performance_rounded(0), 333.0);
    }
}

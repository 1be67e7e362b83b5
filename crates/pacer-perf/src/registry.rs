//! Performance aggregates for every worker of a session.
//!
//! Each slot holds two aggregates for the same worker: a lifetime one
//! with no limit and a recent one that decays past `task_limit`. When a
//! worker terminates its slot is tombstoned, and the next new worker
//! takes over the first tombstoned index.

use serde::{Deserialize, Serialize};
use tracing::debug;

use pacer_core::{WorkerConfig, WorkerId, WorkerIdentity};

use crate::error::PerfResult;
use crate::state::WorkerPerformance;

struct Slot {
    global: WorkerPerformance,
    local: WorkerPerformance,
}

/// Point-in-time view of one registry slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub slot: usize,
    pub identity: WorkerIdentity,
    /// Lifetime tasks per second.
    pub performance: f64,
    /// Tasks per second over the recent (decaying) window.
    pub recent_performance: f64,
    pub tasks: u64,
    pub killed: bool,
}

pub struct WorkerRegistry {
    slots: Vec<Slot>,
    task_limit: u64,
    precision: u32,
}

impl WorkerRegistry {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            slots: Vec::new(),
            task_limit: config.task_limit,
            precision: config.precision,
        }
    }

    /// Record a completion reported by `identity`.
    ///
    /// Creates the worker's slot on its first completion.
    pub fn record(&mut self, identity: &WorkerIdentity, elapsed_ms: u64) -> PerfResult<WorkerSnapshot> {
        let sample = WorkerPerformance::from_completion(identity.clone(), elapsed_ms)?;

        let index = match self.find_live(identity.id) {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.global.merge(&sample)?;
                slot.local.merge(&sample)?;
                index
            }
            None => self.allocate(sample)?,
        };

        Ok(self.snapshot(index))
    }

    /// Tombstone the slot of a terminated worker.
    ///
    /// Returns `false` when the worker has no live slot.
    pub fn retire(&mut self, worker: WorkerId) -> bool {
        let Some(index) = self.find_live(worker) else {
            return false;
        };
        let slot = &mut self.slots[index];
        slot.global.kill();
        slot.local.kill();
        debug!(%worker, slot = index, "worker state tombstoned");
        true
    }

    /// Sum of the recent performance of all live workers, in tasks per second.
    pub fn overall_performance(&self) -> f64 {
        self.slots
            .iter()
            .filter(|s| !s.local.is_killed())
            .map(|s| s.local.performance())
            .sum()
    }

    pub fn snapshots(&self) -> Vec<WorkerSnapshot> {
        (0..self.slots.len()).map(|i| self.snapshot(i)).collect()
    }

    /// Lifetime aggregate of a slot.
    pub fn global(&self, slot: usize) -> Option<&WorkerPerformance> {
        self.slots.get(slot).map(|s| &s.global)
    }

    /// Recent (decaying) aggregate of a slot.
    pub fn local(&self, slot: usize) -> Option<&WorkerPerformance> {
        self.slots.get(slot).map(|s| &s.local)
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.global.is_killed()).count()
    }

    /// Number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    fn find_live(&self, worker: WorkerId) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| !s.global.is_killed() && s.global.identity().id == worker)
    }

    fn allocate(&mut self, sample: WorkerPerformance) -> PerfResult<usize> {
        let mut local = sample.clone();
        local.set_limit(self.task_limit)?;
        let slot = Slot {
            global: sample,
            local,
        };

        let worker = slot.global.identity().id;
        let priority = slot.global.identity().priority.label();
        match self.slots.iter().position(|s| s.global.is_killed()) {
            Some(index) => {
                self.slots[index] = slot;
                debug!(%worker, slot = index, priority, "reused tombstoned worker slot");
                Ok(index)
            }
            None => {
                self.slots.push(slot);
                debug!(%worker, slot = self.slots.len() - 1, priority, "registered new worker");
                Ok(self.slots.len() - 1)
            }
        }
    }

    fn snapshot(&self, index: usize) -> WorkerSnapshot {
        let slot = &self.slots[index];
        WorkerSnapshot {
            slot: index,
            identity: slot.global.identity().clone(),
            performance: slot.global.performance_rounded(self.precision),
            recent_performance: if slot.local.is_killed() {
                0.0
            } else {
                slot.local.performance_rounded(self.precision)
            },
            tasks: slot.global.tasks(),
            killed: slot.global.is_killed(),
        }
    }
}

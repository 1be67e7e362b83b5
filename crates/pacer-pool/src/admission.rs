//! Admission bookkeeping: how many workers may run, and how many do.
//!
//! Kept separate from the threads so the resize rules can be checked
//! without spawning anything.

/// Admission state of a pool. Always mutated under the pool's lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    /// Target number of concurrently running workers.
    ceiling: usize,
    /// Workers currently alive (executing or about to re-check admission).
    admitted: usize,
    running: bool,
}

impl Admission {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn admitted(&self) -> usize {
        self.admitted
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start admitting up to `ceiling` workers.
    ///
    /// Returns how many new workers must be spawned. Workers still
    /// finishing a unit from a previous session are counted and reused.
    pub fn start(&mut self, ceiling: usize) -> usize {
        self.running = true;
        self.resize(ceiling)
    }

    /// Move the ceiling. Returns how many new workers must be spawned.
    pub fn resize(&mut self, ceiling: usize) -> usize {
        self.ceiling = ceiling;
        if !self.running {
            return 0;
        }
        let spawn = ceiling.saturating_sub(self.admitted);
        self.admitted += spawn;
        spawn
    }

    /// Stop admitting new units; every worker retires after its current one.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Called by a worker after each unit. Returns `true` (and releases the
    /// worker's admission) when it must exit instead of pulling another unit.
    pub fn should_retire(&mut self) -> bool {
        if !self.running || self.admitted > self.ceiling {
            self.admitted = self.admitted.saturating_sub(1);
            return true;
        }
        false
    }

    /// Release the admission of a worker that exits for another reason.
    pub fn release(&mut self) {
        self.admitted = self.admitted.saturating_sub(1);
    }
}

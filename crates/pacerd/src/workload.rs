//! Synthetic CPU-bound workload: brute-force search for x³ + y³ + z³ = K.
//!
//! Each ticket fixes `x` and scans every `(y, z)` pair in
//! `[-range, range]²`, so a unit costs `(2·range + 1)²` evaluations.

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use pacer_pool::Workload;

pub const DEFAULT_TARGET: i64 = 588;
pub const DEFAULT_SEARCH_RANGE: i64 = 2000;
/// Largest range whose cubes still fit in `i64` sums.
pub const MAX_SEARCH_RANGE: i64 = 1_000_000;

#[derive(Debug)]
pub struct CubeSearch {
    range: i64,
    target: i64,
    solutions: AtomicU64,
}

impl CubeSearch {
    pub fn new(range: i64) -> Self {
        Self {
            range: range.clamp(0, MAX_SEARCH_RANGE),
            target: DEFAULT_TARGET,
            solutions: AtomicU64::new(0),
        }
    }

    pub fn with_target(mut self, target: i64) -> Self {
        self.target = target;
        self
    }

    /// Map a ticket onto the `x` it searches, cycling through the range.
    pub fn x_for(&self, ticket: u64) -> i64 {
        let span = (2 * self.range + 1) as u64;
        (ticket % span) as i64 - self.range
    }

    /// Solutions found so far by all units.
    pub fn solutions(&self) -> u64 {
        self.solutions.load(Ordering::Relaxed)
    }

    fn search(&self, x: i64) -> u64 {
        let rest = self.target - x * x * x;
        let mut found = 0;
        for y in -self.range..=self.range {
            let y3 = y * y * y;
            for z in -self.range..=self.range {
                if black_box(y3 + z * z * z) == rest {
                    info!(x, y, z, target = self.target, "found");
                    found += 1;
                }
            }
        }
        found
    }
}

impl Workload for CubeSearch {
    fn execute(&self, ticket: u64) {
        let found = self.search(self.x_for(ticket));
        if found > 0 {
            self.solutions.fetch_add(found, Ordering::Relaxed);
        }
    }
}

//! pacer-perf — per-worker performance tracking.
//!
//! Each worker owns a `WorkerPerformance` aggregate of (task count,
//! total time). Past a configured task limit the aggregate decays
//! lossily so it tracks recent behaviour in bounded memory. A killed
//! aggregate is a tombstone: every further mutation is rejected.
//!
//! # Architecture
//!
//! ```text
//! WorkerRegistry
//!   ├── slot 0: global (unbounded) + local (decaying) WorkerPerformance
//!   ├── slot 1: tombstone → reused by the next new worker
//!   └── overall_performance() = Σ live local performance
//! ```

pub mod error;
pub mod registry;
pub mod state;

pub use error::{PerfError, PerfResult};
pub use registry::{WorkerRegistry, WorkerSnapshot};
pub use state::WorkerPerformance;

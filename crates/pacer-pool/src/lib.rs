//! pacer-pool — resizable worker pool for homogeneous CPU-bound units.
//!
//! Each admitted worker runs a loop on tokio's blocking thread pool:
//! execute one unit, report its latency, pull the next unit. Resizing
//! only moves the admission ceiling; in-flight units are never
//! cancelled, and surplus workers retire after finishing their unit.
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//!   ├── Admission (ceiling, admitted, running) behind one mutex
//!   ├── Arc<dyn Workload> (opaque unit of work)
//!   └── worker loop × admitted
//!       └── PoolEvent::{Completed, Exited} → mpsc → pool owner
//! ```

pub mod admission;
pub mod error;
pub mod pool;
pub mod workload;

pub use admission::Admission;
pub use error::{PoolError, PoolResult};
pub use pool::{PoolEvent, WorkerPool};
pub use workload::Workload;

//! pacer-supervisor — the pool owner.
//!
//! Runs the single event loop that serialises every controller-owned
//! state change: completions from the pool, manual commands, and
//! shutdown. Scale decisions are applied with a two-phase handshake:
//!
//! ```text
//! controller.finished_task(ms) → ScaleUp / ScaleDown
//!   └── pool.set_concurrency(n)
//!       └── controller.set_thread_count(n)
//!           └── controller.update_system_state(direction)
//! ```

pub mod command;
pub mod error;
pub mod supervisor;

pub use command::{Command, SupervisorHandle};
pub use error::{SupervisorError, SupervisorResult};
pub use supervisor::{EnvelopeRow, SessionSummary, Supervisor};

//! Shared types used across Pacer crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque identity of a pool worker, unique for the lifetime of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Scheduling priority a worker ran its units with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerPriority {
    /// Assigned to the worker that ran a session's first unit.
    Low,
    #[default]
    Normal,
}

impl WorkerPriority {
    /// Short label used in worker listings.
    pub fn label(&self) -> &'static str {
        match self {
            WorkerPriority::Low => "L",
            WorkerPriority::Normal => "N",
        }
    }
}

/// Identity metadata attached to every completion report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerIdentity {
    pub id: WorkerId,
    pub name: String,
    pub priority: WorkerPriority,
}

impl WorkerIdentity {
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            name: id.to_string(),
            priority: WorkerPriority::Normal,
        }
    }

    pub fn with_priority(mut self, priority: WorkerPriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Direction of a pool resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleDirection {
    Up,
    Down,
}

impl ScaleDirection {
    /// Apply this step to `size`, returning `None` when it would leave `[1, max]`.
    pub fn apply(&self, size: usize, max: usize) -> Option<usize> {
        match self {
            ScaleDirection::Up if size < max => Some(size + 1),
            ScaleDirection::Down if size > 1 => Some(size - 1),
            _ => None,
        }
    }
}

/// Learned latency bounds for one pool size, in milliseconds.
///
/// `0.0` means "unset" for either bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Stable ("fast enough") latency.
    pub lower: f64,
    /// Overload ("too slow") threshold.
    pub upper: f64,
}

impl Envelope {
    pub const UNSET: Envelope = Envelope {
        lower: 0.0,
        upper: 0.0,
    };

    pub fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn has_lower(&self) -> bool {
        self.lower != 0.0
    }

    pub fn has_upper(&self) -> bool {
        self.upper != 0.0
    }
}

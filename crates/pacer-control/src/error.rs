//! Load controller error types.

use thiserror::Error;

pub type ControlResult<T> = Result<T, ControlError>;

/// Rejected controller inputs. Rejection never changes controller state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    #[error("pool size {size} outside 1..={max}")]
    PoolSizeOutOfRange { size: usize, max: usize },

    #[error("no envelope slot for pool size {size} (depth {depth})")]
    NoEnvelopeSlot { size: usize, depth: usize },

    #[error("latency must be a positive number of milliseconds, got {0}")]
    InvalidLatency(f64),
}

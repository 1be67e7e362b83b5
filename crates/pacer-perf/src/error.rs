//! Worker performance error types.

use thiserror::Error;

use pacer_core::WorkerId;

pub type PerfResult<T> = Result<T, PerfError>;

/// Reasons a performance update is rejected. The aggregate is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PerfError {
    #[error("worker state is killed: {0}")]
    Killed(WorkerId),

    #[error("elapsed time must be positive")]
    ZeroElapsed,

    #[error("task limit must be at least 1")]
    ZeroLimit,
}

//! Worker pool error types.

use thiserror::Error;

pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("concurrency {requested} outside 1..={max}")]
    OutOfRange { requested: usize, max: usize },

    #[error("worker pool requires a tokio runtime")]
    NoRuntime,
}

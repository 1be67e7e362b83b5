//! Supervisor error types.

use thiserror::Error;

pub type SupervisorResult<T> = Result<T, SupervisorError>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("config error: {0}")]
    Config(#[from] pacer_core::ConfigError),

    #[error("pool error: {0}")]
    Pool(#[from] pacer_pool::PoolError),

    #[error("control error: {0}")]
    Control(#[from] pacer_control::ControlError),

    #[error("supervisor is no longer running")]
    Closed,
}

pub mod config;
pub mod error;
pub mod types;

pub use config::{ControlConfig, PacerConfig, PoolSettings, WorkerConfig};
pub use error::{ConfigError, ConfigResult};
pub use types::*;

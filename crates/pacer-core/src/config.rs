//! pacer.toml configuration parser.
//!
//! Every field has a default so an empty file is a valid configuration.
//! The parsed value is validated once and then passed by value into the
//! controller, registry and pool constructors.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Minimum completed units before a measurement is trusted.
pub const DEFAULT_WAIT_COUNT: u32 = 9;
/// Tolerance and smoothing multiplier.
pub const DEFAULT_SCALE: u32 = 2;
/// Number of distinct pool sizes with an envelope slot.
pub const DEFAULT_DATA_DEPTH: usize = 20;
/// Decay limit of a worker's recent performance aggregate.
pub const DEFAULT_TASK_LIMIT: u64 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    pub control: ControlConfig,
    pub workers: WorkerConfig,
    pub pool: PoolSettings,
}

/// Tunables of the load controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Pool size ceiling.
    pub max_workers: usize,
    /// WAITCOUNT: samples required before underload is trusted.
    pub wait_count: u32,
    /// SCALE: multiplier on `wait_count` for commits and smoothing.
    pub scale: u32,
    /// DATADEPTH: highest pool size with an envelope slot.
    pub data_depth: usize,
    /// Number of diagnostic overload samples retained.
    pub overload_history: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            wait_count: DEFAULT_WAIT_COUNT,
            scale: DEFAULT_SCALE,
            data_depth: DEFAULT_DATA_DEPTH,
            overload_history: 64,
        }
    }
}

impl ControlConfig {
    /// `WAITCOUNT × SCALE`, the commit threshold and smoothing weight.
    pub fn window(&self) -> u32 {
        self.wait_count.saturating_mul(self.scale)
    }
}

/// Per-worker performance aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Task-count limit of the recent aggregate before decay applies.
    pub task_limit: u64,
    /// Decimal places used when reporting rounded performance.
    pub precision: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            task_limit: DEFAULT_TASK_LIMIT,
            precision: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Pool size at session start.
    pub initial_workers: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { initial_workers: 1 }
    }
}

impl PacerConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: PacerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The default configuration for this machine, as written by `pacerd scaffold`.
    pub fn scaffold() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let control = &self.control;
        if control.max_workers == 0 {
            return Err(invalid("control.max_workers must be at least 1"));
        }
        if control.wait_count == 0 {
            return Err(invalid("control.wait_count must be at least 1"));
        }
        if control.scale == 0 {
            return Err(invalid("control.scale must be at least 1"));
        }
        if control.wait_count.checked_mul(control.scale).is_none() {
            return Err(invalid(format!(
                "control.wait_count ({}) × control.scale ({}) overflows",
                control.wait_count, control.scale
            )));
        }
        if control.data_depth == 0 {
            return Err(invalid("control.data_depth must be at least 1"));
        }
        if control.max_workers > control.data_depth {
            return Err(invalid(format!(
                "control.max_workers ({}) exceeds control.data_depth ({})",
                control.max_workers, control.data_depth
            )));
        }
        if self.workers.task_limit == 0 {
            return Err(invalid("workers.task_limit must be at least 1"));
        }
        let initial = self.pool.initial_workers;
        if initial == 0 || initial > control.max_workers {
            return Err(invalid(format!(
                "pool.initial_workers ({initial}) must be within 1..={}",
                control.max_workers
            )));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Available hardware parallelism, capped to the default envelope depth.
fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(DEFAULT_DATA_DEPTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PacerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.control.wait_count, 9);
        assert_eq!(config.control.scale, 2);
        assert_eq!(config.control.data_depth, 20);
        assert_eq!(config.control.window(), 18);
        assert_eq!(config.workers.task_limit, 10);
    }

    #[test]
    fn test_parse_empty() {
        let config = PacerConfig::from_toml_str("").unwrap();
        assert_eq!(config, PacerConfig::default());
    }

    #[test]
    fn test_parse_partial() {
        let toml_str = r#"
[control]
max_workers = 4
wait_count = 5

[workers]
task_limit = 50
"#;
        let config = PacerConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.control.max_workers, 4);
        assert_eq!(config.control.wait_count, 5);
        assert_eq!(config.control.scale, DEFAULT_SCALE);
        assert_eq!(config.workers.task_limit, 50);
        assert_eq!(config.pool.initial_workers, 1);
    }

    #[test]
    fn rejects_max_workers_beyond_depth() {
        let toml_str = r#"
[control]
max_workers = 30
data_depth = 20
"#;
        let err = PacerConfig::from_toml_str(toml_str).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_initial_workers_out_of_range() {
        let mut config = PacerConfig::default();
        config.control.max_workers = 2;
        config.pool.initial_workers = 3;
        assert!(config.validate().is_err());

        config.pool.initial_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_tunables() {
        for doc in [
            "[control]\nwait_count = 0",
            "[control]\nscale = 0",
            "[control]\nmax_workers = 0",
            "[workers]\ntask_limit = 0",
        ] {
            assert!(PacerConfig::from_toml_str(doc).is_err(), "accepted: {doc}");
        }
    }

    #[test]
    fn rejects_overflowing_window() {
        let err = PacerConfig::from_toml_str("[control]\nmax_workers = 1\nwait_count = 4294967295\nscale = 2")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("overflows")));

        // The largest window that still fits is accepted.
        let config = PacerConfig::from_toml_str("[control]\nmax_workers = 1\nwait_count = 2147483647\nscale = 2").unwrap();
        assert_eq!(config.control.window(), 4294967294);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = PacerConfig::from_toml_str("[control\nmax_workers = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_scaffold_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pacer.toml");
        let rendered = PacerConfig::scaffold().to_toml_string().unwrap();
        assert!(rendered.contains("wait_count"));
        std::fs::write(&path, rendered).unwrap();

        let loaded = PacerConfig::from_file(&path).unwrap();
        assert_eq!(loaded, PacerConfig::scaffold());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = PacerConfig::from_file(Path::new("/nonexistent/pacer.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

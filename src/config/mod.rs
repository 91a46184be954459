//! # Grid Executor Configuration
//!
//! Layered configuration for the clustered executor core.
//!
//! ## Sources
//!
//! 1. Built-in defaults (every section is `#[serde(default)]`)
//! 2. An optional TOML file (`GRID_CONFIG_PATH` or an explicit path)
//! 3. Environment overrides of the form `GRID__SECTION__KEY`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use grid_executor::config::ConfigLoader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigLoader::load_from_env()?;
//! let threshold = config.partitions.transfer_threshold;
//! # let _ = threshold;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};

use crate::constants::{
    cookie_formats, DEFAULT_ASSIGNMENT_MAP_NAME, DEFAULT_LISTENER_EXECUTOR_NAME,
    DEFAULT_MEMBER_NAME, DEFAULT_PARTITION_COUNT, DEFAULT_TASK_MAP_NAME,
    DEFAULT_TRANSFER_THRESHOLD,
};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigLoader;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GridConfig {
    /// Member identity and clustered map names
    pub cluster: ClusterConfig,

    /// Partitioning and scatter-gather paging
    pub partitions: PartitionConfig,

    /// Task coordinator settings
    pub coordinator: CoordinatorConfig,

    /// Log output settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub member_name: String,
    pub task_map_name: String,
    pub assignment_map_name: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            member_name: DEFAULT_MEMBER_NAME.to_string(),
            task_map_name: DEFAULT_TASK_MAP_NAME.to_string(),
            assignment_map_name: DEFAULT_ASSIGNMENT_MAP_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PartitionConfig {
    pub partition_count: u32,
    /// Byte budget for a single paged response
    pub transfer_threshold: u64,
    /// Cookie codec name, see [`crate::constants::cookie_formats`]
    pub cookie_format: String,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            transfer_threshold: DEFAULT_TRANSFER_THRESHOLD,
            cookie_format: cookie_formats::BINARY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Label for the executor that attaches and detaches record listeners
    pub executor_name: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            executor_name: DEFAULT_LISTENER_EXECUTOR_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; falls back to the environment default
    pub level: Option<String>,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl GridConfig {
    /// Validate values that serde cannot check on its own
    pub fn validate(&self) -> ConfigResult<()> {
        if self.partitions.partition_count == 0 {
            return Err(ConfigurationError::invalid_value(
                "partitions.partition_count",
                self.partitions.partition_count,
                "must be greater than zero",
            ));
        }

        if self.partitions.transfer_threshold == 0 {
            return Err(ConfigurationError::invalid_value(
                "partitions.transfer_threshold",
                self.partitions.transfer_threshold,
                "must be greater than zero",
            ));
        }

        if !cookie_formats::ALL.contains(&self.partitions.cookie_format.as_str()) {
            return Err(ConfigurationError::invalid_value(
                "partitions.cookie_format",
                &self.partitions.cookie_format,
                format!("expected one of {:?}", cookie_formats::ALL),
            ));
        }

        if self.cluster.task_map_name == self.cluster.assignment_map_name {
            return Err(ConfigurationError::invalid_value(
                "cluster.assignment_map_name",
                &self.cluster.assignment_map_name,
                "must differ from cluster.task_map_name",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GridConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.partitions.partition_count, 257);
        assert_eq!(config.partitions.transfer_threshold, 524_288);
        assert_eq!(config.cluster.task_map_name, "executor-tasks");
    }

    #[test]
    fn test_validation_rejects_zero_partitions() {
        let mut config = GridConfig::default();
        config.partitions.partition_count = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validation_rejects_unknown_cookie_format() {
        let mut config = GridConfig::default();
        config.partitions.cookie_format = "pof".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cookie_format"));
    }

    #[test]
    fn test_validation_rejects_shared_map_names() {
        let mut config = GridConfig::default();
        config.cluster.assignment_map_name = config.cluster.task_map_name.clone();
        assert!(config.validate().is_err());
    }
}

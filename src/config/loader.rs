//! Configuration Loader
//!
//! Merges built-in defaults, an optional TOML file and `GRID__*` environment
//! overrides, then validates the result.

use super::error::{ConfigResult, ConfigurationError};
use super::GridConfig;
use crate::constants::env;
use config::{Config, Environment, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Zero-state loader; every method is an associated function
#[derive(Debug)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load using `GRID_CONFIG_PATH` when set, defaults otherwise
    pub fn load_from_env() -> ConfigResult<GridConfig> {
        let path = std::env::var(env::CONFIG_PATH).ok().map(PathBuf::from);
        Self::load(path.as_deref(), true)
    }

    /// Load from an explicit TOML file, still honouring environment overrides
    pub fn load_from_path(path: &Path) -> ConfigResult<GridConfig> {
        Self::load(Some(path), true)
    }

    /// Load from a TOML file without consulting the process environment
    pub fn load_file_only(path: &Path) -> ConfigResult<GridConfig> {
        Self::load(Some(path), false)
    }

    fn load(path: Option<&Path>, with_env: bool) -> ConfigResult<GridConfig> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigurationError::ConfigFileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!(path = %path.display(), "Adding configuration file source");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(env::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let source_name = path
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "defaults".to_string());

        let merged = builder
            .build()
            .map_err(|e| ConfigurationError::load_error(&source_name, e))?;

        let config: GridConfig =
            merged
                .try_deserialize()
                .map_err(|e| ConfigurationError::DeserializeError {
                    error: e.to_string(),
                })?;

        config.validate()?;

        info!(
            source = %source_name,
            partition_count = config.partitions.partition_count,
            transfer_threshold = config.partitions.transfer_threshold,
            cookie_format = %config.partitions.cookie_format,
            "Configuration loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp config");
        file.write_all(contents.as_bytes()).expect("write temp config");
        file
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let file = write_config(
            r#"
            [partitions]
            partition_count = 31
            transfer_threshold = 4096
            "#,
        );

        let config = ConfigLoader::load_file_only(file.path()).unwrap();
        assert_eq!(config.partitions.partition_count, 31);
        assert_eq!(config.partitions.transfer_threshold, 4096);
        assert_eq!(config.partitions.cookie_format, "binary");
        assert_eq!(config.cluster.assignment_map_name, "executor-assignments");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let file = write_config(
            r#"
            [partitions]
            cookie_format = "xml"
            "#,
        );

        let err = ConfigLoader::load_file_only(file.path()).unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidValue { .. }));
    }

    #[test]
    fn test_missing_file_is_reported() {
        let err = ConfigLoader::load_file_only(Path::new("/nonexistent/grid.toml")).unwrap_err();
        assert!(matches!(err, ConfigurationError::ConfigFileNotFound { .. }));
    }

    #[test]
    fn test_load_full_file() {
        let file = write_config(
            r#"
            [cluster]
            member_name = "member-a"
            task_map_name = "tasks"
            assignment_map_name = "assignments"

            [coordinator]
            executor_name = "coord"

            [logging]
            level = "warn"
            json = true
            "#,
        );

        let config = ConfigLoader::load_file_only(file.path()).unwrap();
        assert_eq!(config.cluster.member_name, "member-a");
        assert_eq!(config.coordinator.executor_name, "coord");
        assert_eq!(config.logging.level.as_deref(), Some("warn"));
        assert!(config.logging.json);
    }
}

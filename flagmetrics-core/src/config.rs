// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Configuration for the metrics store
//!
//! Loaded from a TOML file; every field has a default so an empty file (or
//! no file) is a valid configuration. A couple of environment variables
//! override the file for container deployments:
//!
//! - `FLAGMETRICS_DB_PATH`: SQLite database path
//! - `FLAGMETRICS_RETENTION_HOURS`: hourly detail retention horizon

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default lookback for windowed queries
pub const DEFAULT_HOURS_BACK: u32 = 24;

/// Default retention for hourly detail rows
pub const DEFAULT_RETENTION_HOURS: u32 = 48;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// SQLite database file (":memory:" for a private in-memory database)
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// How long a writer waits for another writer's lock before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct QueryConfig {
    /// Lookback used when a caller does not pass one
    #[serde(default = "default_hours_back")]
    pub default_hours_back: u32,
}

/// What happens to variant rows when hourly rows age out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantRetention {
    /// Variant rows are never swept
    Keep,
    /// Variant rows are swept with the same horizon as hourly rows
    #[default]
    Coordinated,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetentionConfig {
    /// Hourly detail older than this many hours is deleted by the sweeper
    #[serde(default = "default_retention_hours")]
    pub hourly_hours: u32,

    #[serde(default)]
    pub variants: VariantRetention,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IngestConfig {
    /// How long applied batch tokens are remembered for replay detection
    #[serde(default = "default_idempotency_window_hours")]
    pub idempotency_window_hours: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./flagmetrics.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_hours_back() -> u32 {
    DEFAULT_HOURS_BACK
}

fn default_retention_hours() -> u32 {
    DEFAULT_RETENTION_HOURS
}

fn default_idempotency_window_hours() -> u32 {
    72
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_hours_back: default_hours_back(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            hourly_hours: default_retention_hours(),
            variants: VariantRetention::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            idempotency_window_hours: default_idempotency_window_hours(),
        }
    }
}

impl MetricsConfig {
    /// Load configuration from an optional TOML file, then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = std::env::var("FLAGMETRICS_DB_PATH") {
            tracing::debug!(db_path = %path, "db path overridden from environment");
            self.storage.db_path = PathBuf::from(path);
        }
        if let Ok(value) = std::env::var("FLAGMETRICS_RETENTION_HOURS") {
            self.retention.hourly_hours =
                value.parse().map_err(|_| ConfigError::InvalidValue {
                    name: "FLAGMETRICS_RETENTION_HOURS",
                    value,
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention.hourly_hours == 0 {
            return Err(ConfigError::InvalidValue {
                name: "retention.hourly_hours",
                value: "0".into(),
            });
        }
        if self.query.default_hours_back == 0 {
            return Err(ConfigError::InvalidValue {
                name: "query.default_hours_back",
                value: "0".into(),
            });
        }
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "storage.db_path",
                value: String::new(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert_eq!(config.query.default_hours_back, 24);
        assert_eq!(config.retention.hourly_hours, 48);
        assert_eq!(config.retention.variants, VariantRetention::Coordinated);
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = MetricsConfig::from_toml("").unwrap();
        assert_eq!(config, MetricsConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = MetricsConfig::from_toml(
            r#"
            [storage]
            db_path = "/var/lib/flagmetrics/metrics.db"

            [retention]
            hourly_hours = 168
            variants = "keep"
            "#,
        )
        .unwrap();

        assert_eq!(
            config.storage.db_path,
            PathBuf::from("/var/lib/flagmetrics/metrics.db")
        );
        assert_eq!(config.storage.busy_timeout_ms, 5_000);
        assert_eq!(config.retention.hourly_hours, 168);
        assert_eq!(config.retention.variants, VariantRetention::Keep);
        assert_eq!(config.ingest.idempotency_window_hours, 72);
    }

    #[test]
    fn test_unknown_variant_policy_is_rejected() {
        let result = MetricsConfig::from_toml("[retention]\nvariants = \"sometimes\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_retention_is_invalid() {
        let mut config = MetricsConfig::default();
        config.retention.hourly_hours = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { name: "retention.hourly_hours", .. })
        ));
    }

    #[test]
    fn test_from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "[query]\ndefault_hours_back = 6\n").unwrap();

        let config = MetricsConfig::from_file(tmp.path()).unwrap();
        assert_eq!(config.query.default_hours_back, 6);
    }

    #[test]
    fn test_missing_file() {
        let result = MetricsConfig::from_file(Path::new("/nonexistent/flagmetrics.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}

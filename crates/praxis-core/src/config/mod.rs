//! Configuration parsing and management.
//!
//! Configuration is deserialized from TOML with per-field defaults, then
//! validated fail-closed before anything is constructed from it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Semantic validation failure.
    #[error("invalid config: {0}")]
    Validation(String),
}

/// Top-level configuration for the placement core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CoreConfig {
    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Outbox drain settings.
    #[serde(default)]
    pub outbox: OutboxConfig,
}

impl CoreConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` on the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.outbox.validate()
    }
}

/// Database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("praxis.db")
}

/// Outbox drain settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Maximum outbox rows examined per drain pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Backoff after the first failed delivery attempt, in milliseconds.
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,

    /// Upper bound on the backoff, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl OutboxConfig {
    /// Backoff before the next attempt, given the attempts so far.
    ///
    /// Exponential (doubling per attempt), capped at `max_backoff_ms`.
    #[must_use]
    pub fn backoff_for(&self, attempts: u32) -> u64 {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        self.base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }

    /// Validates semantic constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` on the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::Validation(
                "outbox.batch_size must be at least 1".to_string(),
            ));
        }
        if self.base_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "outbox.base_backoff_ms must be at least 1".to_string(),
            ));
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(ConfigError::Validation(
                "outbox.max_backoff_ms must not be below outbox.base_backoff_ms".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            base_backoff_ms: default_base_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

const fn default_batch_size() -> u32 {
    64
}

const fn default_base_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::from_toml("").unwrap();
        assert_eq!(config.database.path, PathBuf::from("praxis.db"));
        assert_eq!(config.outbox.batch_size, 64);
        assert_eq!(config.outbox.base_backoff_ms, 100);
        assert_eq!(config.outbox.max_backoff_ms, 30_000);
    }

    #[test]
    fn test_parse_overrides() {
        let config = CoreConfig::from_toml(
            r#"
[database]
path = "/var/lib/praxis/ledger.db"

[outbox]
batch_size = 16
base_backoff_ms = 50
max_backoff_ms = 1000
"#,
        )
        .unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/praxis/ledger.db"));
        assert_eq!(config.outbox.batch_size, 16);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let err = CoreConfig::from_toml("[outbox]\nbatch_size = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_backoff_inversion_rejected() {
        let err = CoreConfig::from_toml(
            "[outbox]\nbase_backoff_ms = 1000\nmax_backoff_ms = 100",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_backoff_schedule() {
        let config = OutboxConfig {
            batch_size: 64,
            base_backoff_ms: 100,
            max_backoff_ms: 30_000,
        };
        assert_eq!(config.backoff_for(0), 100);
        assert_eq!(config.backoff_for(1), 200);
        assert_eq!(config.backoff_for(2), 400);
        assert_eq!(config.backoff_for(8), 25_600);
        assert_eq!(config.backoff_for(9), 30_000);
        assert_eq!(config.backoff_for(64), 30_000);
    }
}

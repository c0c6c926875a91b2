//! Store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::ValidationLevel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Configuration for a document store and the schemas applied to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_name: String,
    /// Upper bound on how long a store call may wait before failing with a
    /// transient timeout.
    pub operation_timeout_ms: u64,
    /// Largest intermediate aggregation result kept without `allow_disk_use`.
    pub max_working_set: usize,
    /// Level applied by `EduHub::setup`.
    pub validation_level: ValidationLevel,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_name: "eduhub_db".to_string(),
            operation_timeout_ms: 5_000,
            max_working_set: 10_000,
            validation_level: ValidationLevel::Strict,
        }
    }
}

impl StoreConfig {
    /// Parse a JSON config; absent keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout_ms == 0 {
            return Err(ConfigError::Invalid("operation_timeout_ms must be positive"));
        }
        if self.max_working_set == 0 {
            return Err(ConfigError::Invalid("max_working_set must be positive"));
        }
        Ok(())
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_working_set(mut self, documents: usize) -> Self {
        self.max_working_set = documents;
        self
    }

    pub fn with_validation_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = level;
        self
    }
}

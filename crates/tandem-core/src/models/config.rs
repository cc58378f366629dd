//! Application configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub version: String,
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub endpoint: EndpointConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    pub socket_path: String,
    pub log_level: String,
}

/// Per-endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointConfig {
    /// Number of workers executing deferred handler work
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

fn default_max_workers() -> usize {
    EndpointConfig::DEFAULT_MAX_WORKERS
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.daemon.validate()?;
        self.endpoint.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            daemon: DaemonConfig::default(),
            endpoint: EndpointConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Validate daemon configuration
    pub fn validate(&self) -> Result<()> {
        if self.socket_path.trim().is_empty() {
            return Err(Error::Validation("Socket path cannot be empty".to_string()));
        }

        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(Error::Validation(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.log_level,
                valid_log_levels.join(", ")
            )));
        }

        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: "/tmp/tandem.sock".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl EndpointConfig {
    pub const DEFAULT_MAX_WORKERS: usize = 5;
    pub const MAX_WORKERS_LIMIT: usize = 256;

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::Validation(
                "Worker pool size must be greater than 0".to_string(),
            ));
        }

        if self.max_workers > Self::MAX_WORKERS_LIMIT {
            return Err(Error::Validation(format!(
                "Worker pool too large (max {} workers)",
                Self::MAX_WORKERS_LIMIT
            )));
        }

        Ok(())
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            max_workers: Self::DEFAULT_MAX_WORKERS,
        }
    }
}

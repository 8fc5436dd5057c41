//! Auto-miner configuration
//!
//! Settings are read from an optional JSON file and then overridden from the
//! command line.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default node WebSocket endpoint (geth --dev --ws)
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8546";

/// Default number of mining threads
pub const DEFAULT_THREADS: NonZeroU32 = NonZeroU32::MIN;

/// Default per-request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid endpoint: {0} (expected ws://host:port)")]
    InvalidEndpoint(String),
    #[error("Request timeout must be greater than zero")]
    InvalidTimeout,
}

/// Auto-miner configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomineConfig {
    /// Node JSON-RPC WebSocket endpoint
    pub endpoint: String,
    /// Thread count passed to `miner_start`
    pub threads: NonZeroU32,
    /// Timeout for a single RPC request
    pub request_timeout_ms: u64,
}

impl Default for AutomineConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            threads: DEFAULT_THREADS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl AutomineConfig {
    /// Load configuration from a JSON file. Missing fields take defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Write configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, endpoint: Option<String>, threads: Option<NonZeroU32>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        if let Some(threads) = threads {
            self.threads = threads;
        }
        self
    }

    /// Check the settings that serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Only plain ws:// is supported; dev nodes listen on localhost
        if !self.endpoint.starts_with("ws://") || self.endpoint.len() <= "ws://".len() {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

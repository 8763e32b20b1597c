//! Character configuration.
//!
//! Durations are stored as milliseconds so the structs map one-to-one onto
//! JSON documents and environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{TheaterError, TheaterResult};

/// Lower bound for the pool's missed-wake-up re-check.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const ENV_PREFIX: &str = "THEATER_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// How long dispose waits for the execution unit to exit
    pub shutdown_timeout_ms: u64,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: 10_000,
        }
    }
}

impl CharacterConfig {
    pub fn with_shutdown_timeout(timeout: Duration) -> Self {
        Self {
            shutdown_timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of acts running at once
    pub max_concurrency: usize,
    /// Re-check interval while waiting for a free slot
    pub poll_interval_ms: u64,
    #[serde(flatten)]
    pub character: CharacterConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            poll_interval_ms: MIN_POLL_INTERVAL.as_millis() as u64,
            character: CharacterConfig::default(),
        }
    }
}

impl PoolConfig {
    pub fn with_max_concurrency(max_concurrency: usize) -> Self {
        Self {
            max_concurrency,
            ..Default::default()
        }
    }

    /// Never shorter than [`MIN_POLL_INTERVAL`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms).max(MIN_POLL_INTERVAL)
    }

    pub fn validate(&self) -> TheaterResult<()> {
        if self.max_concurrency == 0 {
            return Err(TheaterError::configuration(
                "max concurrency must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TheaterConfig {
    pub character: CharacterConfig,
    pub pool: PoolConfig,
}

impl TheaterConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse theater config")
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Defaults, then `THEATER_*` environment overrides.
    pub fn from_env() -> Self {
        Self::default().apply_env_overrides()
    }

    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|key| env::var(key).ok())
    }

    /// Apply overrides from any key/value source. Unparsable values are ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(timeout) = read("SHUTDOWN_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            debug!(shutdown_timeout_ms = timeout, "shutdown timeout overridden");
            self.character.shutdown_timeout_ms = timeout;
            self.pool.character.shutdown_timeout_ms = timeout;
        }

        if let Some(max) = read("POOL_MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
            debug!(max_concurrency = max, "pool concurrency overridden");
            self.pool.max_concurrency = max;
        }

        if let Some(interval) = read("POOL_POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.pool.poll_interval_ms = interval;
        }

        self
    }

    pub fn validate(&self) -> TheaterResult<()> {
        self.pool.validate()
    }
}

//! Toolkit configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{PeerKitError, Result};

/// Default flush period for backends without damage notification.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;

/// Toolkit configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolkitConfig {
    /// Display/target identifier handed to native init
    pub display: Option<String>,

    /// Flush thread period in milliseconds
    pub flush_interval_ms: u64,

    /// Upper bound on a window-creation hand-off, `None` waits forever
    pub create_timeout_ms: Option<u64>,
}

impl Default for ToolkitConfig {
    fn default() -> Self {
        Self {
            display: None,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            create_timeout_ms: None,
        }
    }
}

impl ToolkitConfig {
    /// Build a configuration from the process environment.
    ///
    /// `PEERKIT_DISPLAY` wins over `DISPLAY`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.display = lookup("PEERKIT_DISPLAY")
            .or_else(|| lookup("DISPLAY"))
            .filter(|d| !d.is_empty());

        if let Some(raw) = lookup("PEERKIT_FLUSH_INTERVAL_MS") {
            config.flush_interval_ms = parse_millis("PEERKIT_FLUSH_INTERVAL_MS", &raw)?;
        }

        if let Some(raw) = lookup("PEERKIT_CREATE_TIMEOUT_MS") {
            config.create_timeout_ms = Some(parse_millis("PEERKIT_CREATE_TIMEOUT_MS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| PeerKitError::config_with_source("invalid toolkit config", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Reject values the threads cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.flush_interval_ms == 0 {
            return Err(PeerKitError::config("flush_interval_ms must be positive"));
        }
        if self.create_timeout_ms == Some(0) {
            return Err(PeerKitError::config("create_timeout_ms must be positive"));
        }
        Ok(())
    }

    /// Set the display identifier.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Set the flush period.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Bound the window-creation hand-off.
    pub fn with_create_timeout(mut self, timeout: Duration) -> Self {
        self.create_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn create_timeout(&self) -> Option<Duration> {
        self.create_timeout_ms.map(Duration::from_millis)
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|e| PeerKitError::config_with_source(format!("{} is not a number: {:?}", key, raw), e))
}

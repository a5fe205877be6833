//! Logging configuration and setup.
//!
//! Almost every interesting line PeerKit logs is about which thread did
//! what, so thread names are always printed and the default filter only
//! opens up PeerKit's own targets.

use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::{PeerKitError, Result};

/// Targets enabled at the configured level; everything else logs warnings only.
pub const PEERKIT_TARGETS: [&str; 4] = [
    "peerkit_core",
    "peerkit_headless",
    "peerkit_smoke",
    "peerkit_bench",
];

/// Modules that log thread hand-offs: startup, dispatch and the rendezvous.
const HANDOFF_TARGETS: [&str; 4] = [
    "peerkit_core::collector",
    "peerkit_core::dispatch",
    "peerkit_core::rendezvous",
    "peerkit_core::event",
];

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    /// Print thread ids next to thread names.
    pub thread_ids: bool,
    /// Extra directives appended to the default ones.
    pub directives: Vec<String>,
    /// Full filter string; replaces both `RUST_LOG` and the defaults.
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            thread_ids: false,
            directives: Vec::new(),
            filter: None,
        }
    }
}

impl LogConfig {
    /// Trace every hand-off between requesting and owning threads.
    pub fn handoff() -> Self {
        Self {
            thread_ids: true,
            directives: HANDOFF_TARGETS
                .iter()
                .map(|target| format!("{}=trace", target))
                .collect(),
            ..Default::default()
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Filter directives used when neither `filter` nor `RUST_LOG` is set.
    pub fn default_directives(&self) -> String {
        let level = self.level.to_string().to_ascii_lowercase();
        let mut directives = vec!["warn".to_string()];
        directives.extend(PEERKIT_TARGETS.iter().map(|t| format!("{}={}", t, level)));
        directives.extend(self.directives.iter().cloned());
        directives.join(",")
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_directives());
        match &self.filter {
            Some(filter) => EnvFilter::try_new(filter).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install the global subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(config: LogConfig) -> Result<()> {
    let base = fmt::layer()
        .with_thread_names(true)
        .with_thread_ids(config.thread_ids);

    let layer = match config.format {
        LogFormat::Pretty => base.with_target(true).boxed(),
        LogFormat::Compact => base.compact().with_target(false).boxed(),
        LogFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(layer)
        .try_init()
        .map_err(|e| PeerKitError::config_with_source("logging already initialized", e))
}

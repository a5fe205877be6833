//! # PeerKit Common
//!
//! Shared error types, logging setup and configuration for the PeerKit
//! native bridge.
//!
//! ## Features
//!
//! - Unified error type with backtrace support
//! - Logging configuration and setup
//! - Toolkit configuration (env, JSON file)
//! - Result extension traits

use std::time::Duration;
use thiserror::Error;

pub mod config;
pub mod logging;

pub use config::ToolkitConfig;
pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for PeerKit.
#[derive(Error, Debug)]
pub enum PeerKitError {
    /// The native layer could not be brought up. Never retried.
    #[error("Native init failed: {message}")]
    FatalInit {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A native primitive (flush, window creation, clipboard) failed.
    #[error("Native call failed: {message}")]
    NativeCall {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// I/O errors (thread spawn, config files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A bounded wait expired.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The toolkit has already been torn down.
    #[error("Toolkit terminated")]
    Terminated,

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl PeerKitError {
    /// Create a fatal init error.
    pub fn fatal_init(message: impl Into<String>) -> Self {
        Self::FatalInit {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fatal init error with source.
    pub fn fatal_init_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::FatalInit {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a native call error.
    pub fn native_call(message: impl Into<String>) -> Self {
        Self::NativeCall {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Whether this error aborts toolkit startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PeerKitError::FatalInit { .. })
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            PeerKitError::FatalInit { .. } => "fatal_init",
            PeerKitError::NativeCall { .. } => "native_call",
            PeerKitError::Config { .. } => "config",
            PeerKitError::Io(_) => "io",
            PeerKitError::Timeout(_) => "timeout",
            PeerKitError::Terminated => "terminated",
            PeerKitError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for PeerKit operations.
pub type Result<T> = std::result::Result<T, PeerKitError>;

/// Extension trait for I/O results such as thread spawns.
pub trait ResultExt<T> {
    /// Prefix the error with `message`, keeping it a [`PeerKitError::Io`].
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for std::io::Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let kind = e.kind();
            PeerKitError::Io(std::io::Error::new(kind, format!("{}: {}", message.into(), e)))
        })
    }
}

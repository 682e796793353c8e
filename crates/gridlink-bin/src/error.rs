// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command-level errors and process exit codes.
//!
//! | Exit code | Meaning                                   |
//! |-----------|-------------------------------------------|
//! | 1         | site file missing, malformed or invalid   |
//! | 2         | logging or signal handlers not installed  |
//! | 3         | polling produced nothing or a task failed |
//! | 4         | reading or writing a local file failed    |
//! | 5         | a device driver could not be built        |

use gridlink_config::ConfigError;
use gridlink_devices::DeviceError;
use thiserror::Error;

/// Result alias used by every command.
pub type BinResult<T> = Result<T, BinError>;

/// Failure of a `gridlink` command.
#[derive(Debug, Error)]
pub enum BinError {
    /// The site configuration cannot be used.
    #[error("Invalid site configuration: {0}")]
    Configuration(String),

    /// Startup could not complete.
    #[error("Startup failed: {0}")]
    Initialization(String),

    /// Polling failed after startup.
    #[error("Polling failed: {0}")]
    Runtime(String),

    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The site file could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A device driver rejected its settings.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Another error with a description of what was being done.
    #[error("{context}: {source}")]
    WithContext {
        /// What was being done.
        context: String,
        /// The failure.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Configuration failure.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Startup failure.
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Initialization(msg.into())
    }

    /// Polling failure.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Wraps `self` with a description of the step that failed.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Process exit code. Context wrappers report their innermost error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Initialization(_) => 2,
            Self::Runtime(_) => 3,
            Self::Io(_) => 4,
            Self::Device(_) => 5,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Runtime(format!("{err:#}"))
    }
}

/// Writes `error` and each cause on its own line to stderr.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {error}");

    let mut cause = std::error::Error::source(error);
    while let Some(inner) = cause {
        eprintln!("  Caused by: {inner}");
        cause = inner.source();
    }
}

/// Reports `error` and exits with its code.
pub fn report_error_and_exit(error: BinError) -> ! {
    report_error(&error);
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_message_and_code() {
        let err = BinError::config("battery bat-1 has no inverter");
        assert_eq!(
            err.to_string(),
            "Invalid site configuration: battery bat-1 has no inverter"
        );
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_context_keeps_inner_exit_code() {
        let err = BinError::runtime("no records").with_context("run --once");
        assert_eq!(err.to_string(), "run --once: Polling failed: no records");
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_config_error_maps_to_exit_one() {
        let err: BinError = ConfigError::duplicate_device_id("inv-1").into();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_anyhow_chain_is_flattened() {
        let err: BinError = anyhow::anyhow!("inner").context("outer").into();
        assert_eq!(err.to_string(), "Polling failed: outer: inner");
    }
}

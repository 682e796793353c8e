// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for device drivers and their collaborators.
//!
//! ```text
//! DeviceError
//! ├── Configuration          - register map rejected at construction (fatal)
//! ├── Connection             - link could not be opened (caller may retry)
//! ├── NotConnected           - poll requested before connect()
//! ├── DependencyNotConnected - battery polled while its inverter is down
//! └── Store                  - appliance store rejected a read or write
//! ```
//!
//! Register read failures never appear here: they are recovered inside
//! `update_data()` and show up as omitted or defaulted fields.

use thiserror::Error;

use gridlink_modbus::{ConfigurationError, ModbusError};

use crate::appliance::ApplianceId;

/// Errors raised by device drivers.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The driver's register map or settings are invalid.
    #[error("Device '{device}' is misconfigured: {source}")]
    Configuration {
        /// Device name.
        device: String,
        /// Underlying configuration error.
        #[source]
        source: ConfigurationError,
    },

    /// The transport link could not be opened.
    #[error("Device '{device}' failed to connect: {source}")]
    Connection {
        /// Device name.
        device: String,
        /// Underlying transport error.
        #[source]
        source: ModbusError,
    },

    /// The operation requires a connected device.
    #[error("Device '{device}' is not connected")]
    NotConnected {
        /// Device name.
        device: String,
    },

    /// The device shares another device's link, which is not connected.
    #[error("Device '{device}' requires '{dependency}' to be connected first")]
    DependencyNotConnected {
        /// Device name.
        device: String,
        /// Name of the device that owns the link.
        dependency: String,
    },

    /// The appliance store failed.
    #[error("Appliance store failed for device '{device}': {source}")]
    Store {
        /// Device name.
        device: String,
        /// Underlying store error.
        #[source]
        source: StoreError,
    },
}

impl DeviceError {
    /// Creates a configuration error.
    pub fn configuration(device: impl Into<String>, source: ConfigurationError) -> Self {
        Self::Configuration {
            device: device.into(),
            source,
        }
    }

    /// Creates a not connected error.
    pub fn not_connected(device: impl Into<String>) -> Self {
        Self::NotConnected {
            device: device.into(),
        }
    }

    /// Returns the name of the device the error belongs to.
    pub fn device(&self) -> &str {
        match self {
            Self::Configuration { device, .. }
            | Self::Connection { device, .. }
            | Self::NotConnected { device }
            | Self::DependencyNotConnected { device, .. }
            | Self::Store { device, .. } => device,
        }
    }

    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Configuration { .. } => false,
            Self::Connection { source, .. } => source.is_retryable(),
            Self::NotConnected { .. } | Self::DependencyNotConnected { .. } => true,
            Self::Store { source, .. } => source.is_retryable(),
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Connection { .. } => "connection",
            Self::NotConnected { .. } => "not_connected",
            Self::DependencyNotConnected { .. } => "dependency",
            Self::Store { .. } => "store",
        }
    }
}

/// Result type for device operations.
pub type DeviceResult<T> = Result<T, DeviceError>;

// =============================================================================
// StoreError
// =============================================================================

/// Errors raised by an appliance store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Update requested for an identifier the store does not know.
    #[error("Appliance '{0}' not found")]
    NotFound(ApplianceId),

    /// The store could not be reached.
    #[error("Appliance store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns `true` if a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

// =============================================================================
// SinkError
// =============================================================================

/// Errors raised by a telemetry sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The sink has been shut down.
    #[error("Telemetry sink is closed")]
    Closed,

    /// The sink refused the records.
    #[error("Telemetry rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_retryable_classification() {
        let timeout = DeviceError::Connection {
            device: "inv-1".into(),
            source: ModbusError::read_timeout(Duration::from_secs(1)),
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.device(), "inv-1");

        let config = DeviceError::configuration("inv-1", ConfigurationError::missing_field("host"));
        assert!(!config.is_retryable());
        assert_eq!(config.category(), "configuration");

        let dependency = DeviceError::DependencyNotConnected {
            device: "bat-1".into(),
            dependency: "inv-1".into(),
        };
        assert!(dependency.is_retryable());
        assert!(dependency.to_string().contains("'inv-1' to be connected first"));
    }

    #[test]
    fn test_store_error_retryable() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(!StoreError::NotFound(ApplianceId::new("x")).is_retryable());
    }
}

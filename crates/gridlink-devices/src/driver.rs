// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The device driver capability and the context drivers share.
//!
//! ```text
//!            connect() ok
//! Disconnected ──▶ Connecting ──▶ Connected
//!      ▲               │              │
//!      └── error ──────┘              │
//!      └────────── disconnect() ──────┘
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use gridlink_modbus::client::HealthSnapshot;
use gridlink_modbus::{HealthThresholds, RegisterMap, RegisterReadings, RegisterValue, TransportConnector};

use crate::appliance::{sync_appliance, Appliance, ApplianceDetails, ApplianceDraft, ApplianceKind, ApplianceStore};
use crate::error::{DeviceError, DeviceResult};
use crate::telemetry::{TelemetryMessage, DEFAULT_RESOLUTION};

// =============================================================================
// DeviceState
// =============================================================================

/// Connection state of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceState {
    /// No link, or the last connect failed.
    #[default]
    Disconnected,
    /// `connect()` in progress.
    Connecting,
    /// Metadata discovered and appliance synchronised.
    Connected,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

// =============================================================================
// DeviceDriver
// =============================================================================

/// A polled appliance: inverter, meter or battery.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Returns the configured device name.
    fn name(&self) -> &str;

    /// Returns the appliance kind this driver produces.
    fn kind(&self) -> ApplianceKind;

    /// Returns the current connection state.
    fn state(&self) -> DeviceState;

    /// Opens the link, discovers metadata and synchronises the appliance.
    ///
    /// Never retries. On error the driver is left `Disconnected`.
    async fn connect(&mut self) -> DeviceResult<()>;

    /// Closes the link. Errors are logged, never returned.
    async fn disconnect(&mut self);

    /// Returns `true` if the link is open and healthy.
    fn is_connected(&self) -> bool;

    /// Reads the register map and builds one telemetry record.
    ///
    /// # Errors
    ///
    /// `DeviceError::NotConnected` unless the driver is `Connected`. Register
    /// failures are not errors; they produce omitted or defaulted fields.
    async fn update_data(&self) -> DeviceResult<TelemetryMessage>;

    /// Returns the appliance record cached by the last successful connect.
    fn appliance(&self) -> Option<&Appliance>;

    /// Returns the health of the link the driver reads through.
    fn health(&self) -> HealthSnapshot;
}

// =============================================================================
// DriverContext
// =============================================================================

/// Collaborators shared by every driver of a site.
#[derive(Clone)]
pub struct DriverContext {
    /// Appliance persistence.
    pub store: Arc<dyn ApplianceStore>,
    /// Opens transports for inverter and meter links.
    pub connector: Arc<dyn TransportConnector>,
    /// Link health thresholds.
    pub health: HealthThresholds,
    /// Nominal resolution attached to records.
    pub resolution: String,
}

impl DriverContext {
    /// Creates a context with default thresholds and resolution.
    pub fn new(store: Arc<dyn ApplianceStore>, connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            store,
            connector,
            health: HealthThresholds::default(),
            resolution: DEFAULT_RESOLUTION.to_string(),
        }
    }

    /// Sets the link health thresholds.
    pub fn with_health(mut self, health: HealthThresholds) -> Self {
        self.health = health;
        self
    }

    /// Sets the nominal resolution.
    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }
}

impl fmt::Debug for DriverContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverContext")
            .field("health", &self.health)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// DeviceIdentity
// =============================================================================

/// Names a device in logs and on its appliance record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Configured device name, unique per site.
    pub name: String,
    /// Network device the appliance sits behind.
    pub network_device_id: String,
}

impl DeviceIdentity {
    /// Creates an identity.
    pub fn new(name: impl Into<String>, network_device_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            network_device_id: network_device_id.into(),
        }
    }
}

/// Validates a driver's register map and state mappings.
///
/// Collects every problem into one configuration error.
pub(crate) fn validate_registers(
    device: &str,
    map: &RegisterMap,
    extra_errors: Vec<String>,
) -> DeviceResult<()> {
    let mut report = gridlink_modbus::validate_register_map(map);
    if !extra_errors.is_empty() {
        report.valid = false;
        report.errors.extend(extra_errors);
    }

    report.into_result().map_err(|source| {
        tracing::error!(device = device, error = %source, "Register map rejected");
        DeviceError::configuration(device, source)
    })
}

/// Reads the serial number from text or integer registers. Blank is `None`.
pub(crate) fn serial_number(readings: &RegisterReadings) -> Option<String> {
    match readings.get("serial_number")? {
        RegisterValue::Text(text) if text.trim().is_empty() => None,
        RegisterValue::Text(text) => Some(text.trim().to_string()),
        number @ RegisterValue::Number(_) => number.as_i64().map(|n| n.to_string()),
    }
}

/// Creates or updates the appliance record for `identity`.
pub(crate) async fn synchronise(
    store: &dyn ApplianceStore,
    identity: &DeviceIdentity,
    serial_number: Option<String>,
    details: ApplianceDetails,
) -> DeviceResult<Appliance> {
    let draft = ApplianceDraft {
        name: identity.name.clone(),
        network_device_ids: vec![identity.network_device_id.clone()],
        serial_number,
        details,
    };

    sync_appliance(store, draft)
        .await
        .map_err(|source| DeviceError::Store {
            device: identity.name.clone(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_modbus::{DataType, RegisterDescriptor};

    #[test]
    fn test_state_display() {
        assert_eq!(DeviceState::default(), DeviceState::Disconnected);
        assert_eq!(DeviceState::Connecting.to_string(), "connecting");
    }

    #[test]
    fn test_validate_registers_merges_errors() {
        let mut map = RegisterMap::new();
        map.insert("name", RegisterDescriptor::new(40001, DataType::String));

        let err = validate_registers("inv", &map, vec!["state: unknown state name 'x'".into()]).unwrap_err();
        match err {
            DeviceError::Configuration { source, .. } => {
                let message = source.to_string();
                assert!(message.contains("unknown state name"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serial_number_from_text_or_integer() {
        let mut readings = RegisterReadings::new();
        assert_eq!(serial_number(&readings), None);

        readings.insert("serial_number", RegisterValue::Text("  ".into()));
        assert_eq!(serial_number(&readings), None);

        readings.insert("serial_number", RegisterValue::Text("SN-42 ".into()));
        assert_eq!(serial_number(&readings).as_deref(), Some("SN-42"));

        readings.insert("serial_number", RegisterValue::Number(3_001_234_567.0));
        assert_eq!(serial_number(&readings).as_deref(), Some("3001234567"));
    }

    #[test]
    fn test_validate_registers_ok() {
        let mut map = RegisterMap::new();
        map.insert("power", RegisterDescriptor::new(30775, DataType::Int32));
        assert!(validate_registers("inv", &map, Vec::new()).is_ok());
    }
}

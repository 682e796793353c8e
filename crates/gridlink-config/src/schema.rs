// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for gridlink.
//!
//! ```yaml
//! site: { id: home, name: Home }
//! polling: { interval: 10s, resolution: 10s }
//! health: { max_consecutive_failures: 5, stale_after: 5m }
//! reconnect: { initial_delay: 1s, max_delay: 60s }
//! telemetry: { sink: log }
//! logging: { level: info, format: text }
//! devices:
//!   - kind: inverter
//!     id: inv-1
//!     network_device_id: "aa:bb:cc"
//!     connection: { host: 192.168.1.50, unit_id: 3 }
//!     registers:
//!       power: { address: 30775, data_type: int32 }
//!   - kind: battery
//!     id: bat-1
//!     inverter: inv-1
//!     network_device_id: "aa:bb:cc"
//!     registers:
//!       soc: { address: 30845, data_type: uint32, required: true }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gridlink_devices::{BatteryRegisters, DeviceError, InverterRegisters, MeterRegisters, DEFAULT_RESOLUTION};
use gridlink_modbus::client::ExponentialBackoff;
use gridlink_modbus::{HealthThresholds, ModbusTcpConfig};

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Root Configuration
// =============================================================================

/// Root configuration structure for gridlink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GridlinkConfig {
    /// Site identification.
    #[serde(default)]
    pub site: SiteConfig,

    /// Poll loop timing.
    #[serde(default)]
    pub polling: PollingConfig,

    /// Link health thresholds, shared by every device.
    #[serde(default)]
    pub health: HealthThresholds,

    /// Backoff between reconnect attempts.
    #[serde(default)]
    pub reconnect: ExponentialBackoff,

    /// Where telemetry records go.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Polled devices.
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

impl GridlinkConfig {
    /// Validates the entire configuration.
    ///
    /// The first problem found is returned. Devices are checked after the
    /// global sections, battery references last.
    pub fn validate(&self) -> ConfigResult<()> {
        self.site.validate()?;
        self.polling.validate()?;
        validate_health(&self.health)?;
        self.telemetry.validate()?;

        let mut kinds: HashMap<&str, DeviceKind> = HashMap::new();
        for device in &self.devices {
            if kinds.insert(device.id(), device.kind()).is_some() {
                return Err(ConfigError::duplicate_device_id(device.id()));
            }
            device.validate()?;
        }

        for device in &self.devices {
            if let DeviceConfig::Battery(battery) = device {
                match kinds.get(battery.inverter.as_str()) {
                    Some(DeviceKind::Inverter) => {}
                    _ => {
                        return Err(ConfigError::unknown_reference(
                            &battery.id,
                            &battery.inverter,
                            "inverter",
                        ))
                    }
                }
            }
        }

        Ok(())
    }

    /// Returns a device configuration by ID.
    pub fn get_device(&self, device_id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id() == device_id)
    }

    /// Number of devices of `kind`.
    pub fn count(&self, kind: DeviceKind) -> usize {
        self.devices.iter().filter(|d| d.kind() == kind).count()
    }
}

// =============================================================================
// Site, Polling, Telemetry
// =============================================================================

/// Site identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier.
    #[serde(default = "default_site_id")]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
}

fn default_site_id() -> String {
    "gridlink".to_string()
}

impl SiteConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.id.trim().is_empty() {
            return Err(ConfigError::validation("site.id", "cannot be empty"));
        }
        if self.id.len() > 64 {
            return Err(ConfigError::validation("site.id", "cannot exceed 64 characters"));
        }
        Ok(())
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            id: default_site_id(),
            name: None,
        }
    }
}

/// Poll loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Time between two polls of a device.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Nominal resolution attached to every record.
    #[serde(default = "default_resolution")]
    pub resolution: String,
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_resolution() -> String {
    DEFAULT_RESOLUTION.to_string()
}

impl PollingConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::validation("polling.interval", "must be greater than zero"));
        }
        if self.resolution.trim().is_empty() {
            return Err(ConfigError::validation("polling.resolution", "cannot be empty"));
        }
        Ok(())
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            resolution: default_resolution(),
        }
    }
}

fn validate_health(health: &HealthThresholds) -> ConfigResult<()> {
    if health.max_consecutive_failures == 0 {
        return Err(ConfigError::validation(
            "health.max_consecutive_failures",
            "must be at least 1",
        ));
    }
    if health.stale_after.is_zero() {
        return Err(ConfigError::validation("health.stale_after", "must be greater than zero"));
    }
    Ok(())
}

/// Telemetry sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Structured log events.
    #[default]
    Log,
    /// In-process broadcast channel.
    Broadcast,
}

/// Telemetry sink settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Sink to publish to.
    #[serde(default)]
    pub sink: SinkKind,

    /// Broadcast channel capacity.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_channel_capacity() -> usize {
    1024
}

impl TelemetryConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::validation("telemetry.channel_capacity", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Kind of a configured device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// PV inverter.
    Inverter,
    /// Grid meter.
    Meter,
    /// Battery behind an inverter.
    Battery,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inverter => write!(f, "inverter"),
            Self::Meter => write!(f, "meter"),
            Self::Battery => write!(f, "battery"),
        }
    }
}

/// One polled device, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceConfig {
    /// PV inverter with its own link.
    Inverter(InverterDeviceConfig),
    /// Grid meter with its own link.
    Meter(MeterDeviceConfig),
    /// Battery reading through an inverter's link.
    Battery(BatteryDeviceConfig),
}

/// Inverter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InverterDeviceConfig {
    /// Unique device identifier.
    pub id: String,
    /// Appliance display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Network device the inverter sits behind.
    pub network_device_id: String,
    /// Modbus TCP endpoint.
    pub connection: ModbusTcpConfig,
    /// Register layout.
    #[serde(default)]
    pub registers: InverterRegisters,
}

/// Meter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterDeviceConfig {
    /// Unique device identifier.
    pub id: String,
    /// Appliance display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Network device the meter sits behind.
    pub network_device_id: String,
    /// Modbus TCP endpoint.
    pub connection: ModbusTcpConfig,
    /// Register layout.
    #[serde(default)]
    pub registers: MeterRegisters,
}

/// Battery settings. The battery has no endpoint of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatteryDeviceConfig {
    /// Unique device identifier.
    pub id: String,
    /// Appliance display name; defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Id of the inverter whose link is used.
    pub inverter: String,
    /// Network device the battery sits behind.
    pub network_device_id: String,
    /// Register layout.
    #[serde(default)]
    pub registers: BatteryRegisters,
}

impl DeviceConfig {
    /// Returns the device id.
    pub fn id(&self) -> &str {
        match self {
            Self::Inverter(d) => &d.id,
            Self::Meter(d) => &d.id,
            Self::Battery(d) => &d.id,
        }
    }

    /// Returns the appliance name, falling back to the id.
    pub fn display_name(&self) -> &str {
        let (name, id) = match self {
            Self::Inverter(d) => (&d.name, &d.id),
            Self::Meter(d) => (&d.name, &d.id),
            Self::Battery(d) => (&d.name, &d.id),
        };
        name.as_deref().unwrap_or(id)
    }

    /// Returns the network device id.
    pub fn network_device_id(&self) -> &str {
        match self {
            Self::Inverter(d) => &d.network_device_id,
            Self::Meter(d) => &d.network_device_id,
            Self::Battery(d) => &d.network_device_id,
        }
    }

    /// Returns the device kind.
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::Inverter(_) => DeviceKind::Inverter,
            Self::Meter(_) => DeviceKind::Meter,
            Self::Battery(_) => DeviceKind::Battery,
        }
    }

    /// Returns the endpoint, if the device has one.
    pub fn connection(&self) -> Option<&ModbusTcpConfig> {
        match self {
            Self::Inverter(d) => Some(&d.connection),
            Self::Meter(d) => Some(&d.connection),
            Self::Battery(_) => None,
        }
    }

    /// Validates one device in isolation.
    pub fn validate(&self) -> ConfigResult<()> {
        let id = self.id();
        if id.trim().is_empty() {
            return Err(ConfigError::validation("devices.id", "cannot be empty"));
        }
        if self.network_device_id().trim().is_empty() {
            return Err(ConfigError::validation(
                format!("devices.{id}.network_device_id"),
                "cannot be empty",
            ));
        }

        if let Some(connection) = self.connection() {
            connection
                .validate()
                .map_err(|e| ConfigError::validation(format!("devices.{id}.connection"), e.to_string()))?;
        }

        let registers = match self {
            Self::Inverter(d) => d.registers.validate(id),
            Self::Meter(d) => d.registers.validate(id),
            Self::Battery(d) => d.registers.validate(id),
        };
        registers.map_err(|e| register_error(id, e))
    }
}

fn register_error(id: &str, error: DeviceError) -> ConfigError {
    let message = match error {
        DeviceError::Configuration { source, .. } => source.to_string(),
        other => other.to_string(),
    };
    ConfigError::validation(format!("devices.{id}.registers"), message)
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the directive understood by `EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name, accepting `warning` for `warn`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, multi-field lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
    /// Terse single-line output.
    Compact,
}

impl LogFormat {
    /// Returns the format name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Compact => "compact",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

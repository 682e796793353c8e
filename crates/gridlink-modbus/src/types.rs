// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Register descriptor model and connection configuration.
//!
//! A device driver describes each logical field it wants from a device as a
//! [`RegisterDescriptor`]: where the field lives, how its bytes are laid out,
//! how it is scaled and which raw codes map to which named states. The
//! descriptors of one device are collected into a [`RegisterMap`].
//!
//! ```text
//! RegisterMap (ordered, unique names)
//! ├── "power"         → { address: 30775, data_type: int32 }
//! ├── "state"         → { address: 30201, data_type: uint32, value_mapping: [307 → mppt] }
//! └── "serial_number" → { address: 30057, data_type: string, quantity: 16 }
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ConfigurationError, ModbusError};

// =============================================================================
// DataType
// =============================================================================

/// Layout of a register value on the wire.
///
/// All multi-register values are big-endian (high word first, high byte first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataType {
    /// 16-bit unsigned integer (1 register).
    #[default]
    UInt16,

    /// 16-bit signed integer (1 register).
    Int16,

    /// 32-bit unsigned integer (2 registers).
    UInt32,

    /// 32-bit signed integer (2 registers).
    Int32,

    /// 32-bit IEEE 754 float (2 registers).
    Float32,

    /// Fixed-length text, 2 characters per register. Needs an explicit quantity.
    String,
}

impl DataType {
    /// All supported data types.
    pub const ALL: [DataType; 6] = [
        Self::UInt16,
        Self::Int16,
        Self::UInt32,
        Self::Int32,
        Self::Float32,
        Self::String,
    ];

    /// Returns the configuration name of this data type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UInt16 => "uint16",
            Self::Int16 => "int16",
            Self::UInt32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::String => "string",
        }
    }

    /// Returns the natural register width, or `None` for variable-length text.
    #[inline]
    pub const fn register_count(&self) -> Option<u16> {
        match self {
            Self::UInt16 | Self::Int16 => Some(1),
            Self::UInt32 | Self::Int32 | Self::Float32 => Some(2),
            Self::String => None,
        }
    }

    /// Returns `true` for signed integer types.
    #[inline]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int16 | Self::Int32)
    }

    /// Returns `true` for every type that decodes to a number.
    #[inline]
    pub const fn is_numeric(&self) -> bool {
        !matches!(self, Self::String)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|dt| dt.as_str() == lowered)
            .ok_or_else(|| ConfigurationError::unknown_data_type(s))
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// ValueMapping
// =============================================================================

/// Maps one raw register value onto a named device state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueMapping {
    /// Raw integer value as decoded from the register.
    pub raw_value: i64,
    /// State name the raw value stands for.
    pub mapped_state: String,
}

impl ValueMapping {
    /// Creates a new mapping.
    pub fn new(raw_value: i64, mapped_state: impl Into<String>) -> Self {
        Self {
            raw_value,
            mapped_state: mapped_state.into(),
        }
    }
}

// =============================================================================
// RegisterDescriptor
// =============================================================================

/// Describes where a value lives on a device and how to decode it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDescriptor {
    /// Holding register address (1-based).
    pub address: u16,

    /// Wire layout.
    pub data_type: DataType,

    /// Decimal scale; the decoded number is divided by `10^scale`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u8>,

    /// Register count. Derived from the data type when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u16>,

    /// Whether a failed read is reported as missing required data.
    #[serde(default)]
    pub required: bool,

    /// Raw value to state mappings, searched in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_mapping: Vec<ValueMapping>,
}

impl RegisterDescriptor {
    /// Creates an optional, unscaled descriptor.
    pub fn new(address: u16, data_type: DataType) -> Self {
        Self {
            address,
            data_type,
            scale: None,
            quantity: None,
            required: false,
            value_mapping: Vec::new(),
        }
    }

    /// Sets the decimal scale.
    pub fn with_scale(mut self, scale: u8) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets an explicit register count.
    pub fn with_quantity(mut self, quantity: u16) -> Self {
        self.quantity = Some(quantity);
        self
    }

    /// Marks the descriptor as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Appends a raw value to state mapping.
    pub fn with_mapping(mut self, raw_value: i64, mapped_state: impl Into<String>) -> Self {
        self.value_mapping.push(ValueMapping::new(raw_value, mapped_state));
        self
    }

    /// Returns the register count to read: explicit quantity, else the type width.
    pub fn resolved_quantity(&self) -> Result<u16, ConfigurationError> {
        match self.quantity {
            Some(quantity) => Ok(quantity),
            None => self
                .data_type
                .register_count()
                .ok_or_else(|| ConfigurationError::quantity_required(self.data_type)),
        }
    }

    /// Returns the state mapped to `raw`, first match wins.
    pub fn map_value(&self, raw: i64) -> Option<&str> {
        self.value_mapping
            .iter()
            .find(|m| m.raw_value == raw)
            .map(|m| m.mapped_state.as_str())
    }
}

// =============================================================================
// RegisterMap
// =============================================================================

/// Ordered mapping from logical field name to descriptor.
///
/// Names are unique and case-sensitive; inserting an existing name replaces
/// its descriptor in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterMap {
    entries: Vec<(String, RegisterDescriptor)>,
}

impl RegisterMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a descriptor.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: RegisterDescriptor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = descriptor,
            None => self.entries.push((name, descriptor)),
        }
    }

    /// Inserts a descriptor if present; `None` entries are skipped.
    pub fn insert_optional(&mut self, name: impl Into<String>, descriptor: Option<&RegisterDescriptor>) {
        if let Some(descriptor) = descriptor {
            self.insert(name, descriptor.clone());
        }
    }

    /// Builder form of [`insert_optional`](Self::insert_optional).
    pub fn with_optional(mut self, name: impl Into<String>, descriptor: Option<&RegisterDescriptor>) -> Self {
        self.insert_optional(name, descriptor);
        self
    }

    /// Returns the descriptor for `name`.
    pub fn get(&self, name: &str) -> Option<&RegisterDescriptor> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, d)| d)
    }

    /// Iterates descriptors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisterDescriptor)> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d))
    }

    /// Returns the number of descriptors.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the map has no descriptors.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, RegisterDescriptor)> for RegisterMap {
    fn from_iter<I: IntoIterator<Item = (N, RegisterDescriptor)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, descriptor) in iter {
            map.insert(name, descriptor);
        }
        map
    }
}

// =============================================================================
// ModbusTcpConfig
// =============================================================================

/// Connection parameters of one Modbus TCP link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModbusTcpConfig {
    /// Target host name or IP address.
    pub host: String,

    /// Target port (default: 502).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Unit ID / slave address (default: 1).
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout")]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Per-request response timeout.
    #[serde(default = "default_operation_timeout", alias = "timeout")]
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Enable TCP_NODELAY.
    #[serde(default = "default_true")]
    pub tcp_nodelay: bool,
}

fn default_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_operation_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_true() -> bool {
    true
}

impl ModbusTcpConfig {
    /// Creates a new builder.
    pub fn builder() -> ModbusTcpConfigBuilder {
        ModbusTcpConfigBuilder::default()
    }

    /// Creates a configuration with defaults for everything but the host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Returns the `host:port` string.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), ModbusError> {
        if self.host.trim().is_empty() {
            return Err(ModbusError::configuration(ConfigurationError::missing_field(
                "host",
            )));
        }

        if self.host.chars().any(char::is_whitespace) {
            return Err(ModbusError::configuration(ConfigurationError::invalid_host(
                &self.host,
                "host must not contain whitespace",
            )));
        }

        if self.port == 0 {
            return Err(ModbusError::configuration(ConfigurationError::invalid_port(
                0,
                "port must be greater than 0",
            )));
        }

        if self.connect_timeout.is_zero() || self.operation_timeout.is_zero() {
            return Err(ModbusError::configuration(ConfigurationError::missing_field(
                "timeout (must be greater than 0)",
            )));
        }

        Ok(())
    }
}

impl Default for ModbusTcpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            unit_id: default_unit_id(),
            connect_timeout: default_connect_timeout(),
            operation_timeout: default_operation_timeout(),
            tcp_nodelay: true,
        }
    }
}

/// Builder for [`ModbusTcpConfig`].
#[derive(Debug, Default)]
pub struct ModbusTcpConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    unit_id: Option<u8>,
    connect_timeout: Option<Duration>,
    operation_timeout: Option<Duration>,
    tcp_nodelay: Option<bool>,
}

impl ModbusTcpConfigBuilder {
    /// Sets the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the unit ID.
    pub fn unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = Some(unit_id);
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Sets the response timeout.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    /// Sets TCP_NODELAY.
    pub fn tcp_nodelay(mut self, nodelay: bool) -> Self {
        self.tcp_nodelay = Some(nodelay);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<ModbusTcpConfig, ModbusError> {
        let host = self.host.ok_or_else(|| {
            ModbusError::configuration(ConfigurationError::missing_field("host"))
        })?;

        let config = ModbusTcpConfig {
            host,
            port: self.port.unwrap_or_else(default_port),
            unit_id: self.unit_id.unwrap_or_else(default_unit_id),
            connect_timeout: self.connect_timeout.unwrap_or_else(default_connect_timeout),
            operation_timeout: self.operation_timeout.unwrap_or_else(default_operation_timeout),
            tcp_nodelay: self.tcp_nodelay.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parse_case_insensitive() {
        assert_eq!("UINT32".parse::<DataType>().unwrap(), DataType::UInt32);
        assert_eq!("Float32".parse::<DataType>().unwrap(), DataType::Float32);
        assert_eq!(" string ".parse::<DataType>().unwrap(), DataType::String);
        assert!(matches!(
            "int64".parse::<DataType>(),
            Err(ConfigurationError::UnknownDataType { .. })
        ));
    }

    #[test]
    fn test_data_type_register_count() {
        assert_eq!(DataType::UInt16.register_count(), Some(1));
        assert_eq!(DataType::Int16.register_count(), Some(1));
        assert_eq!(DataType::UInt32.register_count(), Some(2));
        assert_eq!(DataType::Float32.register_count(), Some(2));
        assert_eq!(DataType::String.register_count(), None);
    }

    #[test]
    fn test_data_type_serde() {
        let json = serde_json::to_string(&DataType::Int32).unwrap();
        assert_eq!(json, "\"int32\"");
        let parsed: DataType = serde_json::from_str("\"UInt16\"").unwrap();
        assert_eq!(parsed, DataType::UInt16);
    }

    #[test]
    fn test_descriptor_resolved_quantity() {
        let power = RegisterDescriptor::new(30775, DataType::Int32);
        assert_eq!(power.resolved_quantity().unwrap(), 2);

        let serial = RegisterDescriptor::new(30057, DataType::String).with_quantity(16);
        assert_eq!(serial.resolved_quantity().unwrap(), 16);

        let missing = RegisterDescriptor::new(30057, DataType::String);
        assert!(matches!(
            missing.resolved_quantity(),
            Err(ConfigurationError::QuantityRequired { .. })
        ));
    }

    #[test]
    fn test_descriptor_map_value_first_match() {
        let state = RegisterDescriptor::new(30201, DataType::UInt32)
            .with_mapping(307, "mppt")
            .with_mapping(307, "shadowed")
            .with_mapping(455, "derating");

        assert_eq!(state.map_value(307), Some("mppt"));
        assert_eq!(state.map_value(455), Some("derating"));
        assert_eq!(state.map_value(1), None);
    }

    #[test]
    fn test_descriptor_deserialize_defaults() {
        let json = r#"{ "address": 40100, "data_type": "int16", "scale": 1 }"#;
        let descriptor: RegisterDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(descriptor.address, 40100);
        assert_eq!(descriptor.scale, Some(1));
        assert!(!descriptor.required);
        assert!(descriptor.value_mapping.is_empty());
    }

    #[test]
    fn test_register_map_order_and_skip() {
        let power = RegisterDescriptor::new(1, DataType::Int32);
        let map = RegisterMap::new()
            .with_optional("power", Some(&power))
            .with_optional("state", None)
            .with_optional("energy", Some(&RegisterDescriptor::new(3, DataType::UInt32)));

        let names: Vec<_> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["power", "energy"]);
        assert!(map.get("state").is_none());
        assert!(map.get("Power").is_none());
    }

    #[test]
    fn test_register_map_replace_keeps_position() {
        let mut map = RegisterMap::new();
        map.insert("a", RegisterDescriptor::new(1, DataType::UInt16));
        map.insert("b", RegisterDescriptor::new(2, DataType::UInt16));
        map.insert("a", RegisterDescriptor::new(9, DataType::UInt16));

        assert_eq!(map.len(), 2);
        assert_eq!(map.iter().next().map(|(_, d)| d.address), Some(9));
    }

    #[test]
    fn test_tcp_config_builder() {
        let config = ModbusTcpConfig::builder()
            .host("192.168.1.50")
            .unit_id(3)
            .operation_timeout(Duration::from_secs(2))
            .build()
            .unwrap();

        assert_eq!(config.port, 502);
        assert_eq!(config.unit_id, 3);
        assert_eq!(config.socket_addr(), "192.168.1.50:502");
    }

    #[test]
    fn test_tcp_config_validation() {
        assert!(ModbusTcpConfig::builder().build().is_err());
        assert!(ModbusTcpConfig::new("").validate().is_err());
        assert!(ModbusTcpConfig::new("bad host").validate().is_err());

        let mut config = ModbusTcpConfig::new("localhost");
        config.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tcp_config_timeout_alias() {
        let json = r#"{ "host": "inverter.local", "timeout": "1500ms" }"#;
        let config: ModbusTcpConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.operation_timeout, Duration::from_millis(1500));
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }
}

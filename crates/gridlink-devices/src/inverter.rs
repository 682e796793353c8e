// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! PV inverter driver.
//!
//! Reads production, operating state, lifetime energy and up to four PV
//! strings. The inverter owns its [`DeviceLink`]; a battery attached to the
//! same hardware borrows it through [`InverterDriver::link`].

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridlink_modbus::client::HealthSnapshot;
use gridlink_modbus::{ModbusTcpConfig, RegisterDescriptor, RegisterMap, RegisterMapper, RegisterReadings};

use crate::appliance::{Appliance, ApplianceDetails, ApplianceId, ApplianceKind, ApplianceStore, InverterMetadata};
use crate::driver::{
    serial_number, synchronise, validate_registers, DeviceDriver, DeviceIdentity, DeviceState, DriverContext,
};
use crate::error::{DeviceError, DeviceResult};
use crate::link::DeviceLink;
use crate::telemetry::{
    invalid_state_names, map_state, InverterState, InverterTelemetry, StringReading, TelemetryMessage,
};

/// Number of PV strings an inverter may report.
pub const MAX_PV_STRINGS: u8 = 4;

// =============================================================================
// InverterRegisters
// =============================================================================

/// Register layout of an inverter. Absent fields are never read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InverterRegisters {
    /// AC production in watts.
    pub power: Option<RegisterDescriptor>,
    /// Operating state, resolved through its value mapping.
    pub state: Option<RegisterDescriptor>,
    /// Lifetime production in watt-hours.
    pub total_energy: Option<RegisterDescriptor>,
    /// String 1 power.
    pub string1_power: Option<RegisterDescriptor>,
    /// String 1 voltage.
    pub string1_voltage: Option<RegisterDescriptor>,
    /// String 2 power.
    pub string2_power: Option<RegisterDescriptor>,
    /// String 2 voltage.
    pub string2_voltage: Option<RegisterDescriptor>,
    /// String 3 power.
    pub string3_power: Option<RegisterDescriptor>,
    /// String 3 voltage.
    pub string3_voltage: Option<RegisterDescriptor>,
    /// String 4 power.
    pub string4_power: Option<RegisterDescriptor>,
    /// String 4 voltage.
    pub string4_voltage: Option<RegisterDescriptor>,
    /// Rated PV production, read once per connection.
    pub max_pv_production: Option<RegisterDescriptor>,
    /// Serial number, read once per connection.
    pub serial_number: Option<RegisterDescriptor>,
}

impl InverterRegisters {
    /// Fields read on every poll.
    pub fn telemetry_map(&self) -> RegisterMap {
        RegisterMap::new()
            .with_optional("power", self.power.as_ref())
            .with_optional("state", self.state.as_ref())
            .with_optional("total_energy", self.total_energy.as_ref())
            .with_optional("string1_power", self.string1_power.as_ref())
            .with_optional("string1_voltage", self.string1_voltage.as_ref())
            .with_optional("string2_power", self.string2_power.as_ref())
            .with_optional("string2_voltage", self.string2_voltage.as_ref())
            .with_optional("string3_power", self.string3_power.as_ref())
            .with_optional("string3_voltage", self.string3_voltage.as_ref())
            .with_optional("string4_power", self.string4_power.as_ref())
            .with_optional("string4_voltage", self.string4_voltage.as_ref())
    }

    /// Fields read once in `connect()`.
    pub fn metadata_map(&self) -> RegisterMap {
        RegisterMap::new()
            .with_optional("max_pv_production", self.max_pv_production.as_ref())
            .with_optional("serial_number", self.serial_number.as_ref())
    }

    /// Every present field.
    pub fn register_map(&self) -> RegisterMap {
        let mut map = self.telemetry_map();
        for (name, descriptor) in self.metadata_map().iter() {
            map.insert(name, descriptor.clone());
        }
        map
    }

    /// Checks descriptors and state names; all problems are reported together.
    pub fn validate(&self, device: &str) -> DeviceResult<()> {
        validate_registers(
            device,
            &self.register_map(),
            invalid_state_names::<InverterState>("state", self.state.as_ref()),
        )
    }
}

// =============================================================================
// InverterDriver
// =============================================================================

/// Driver for a PV inverter reachable over Modbus TCP.
pub struct InverterDriver {
    identity: DeviceIdentity,
    registers: InverterRegisters,
    telemetry_map: RegisterMap,
    metadata_map: RegisterMap,
    link: Arc<DeviceLink>,
    store: Arc<dyn ApplianceStore>,
    resolution: String,
    state: DeviceState,
    metadata: Option<InverterMetadata>,
    appliance: Option<Appliance>,
}

impl InverterDriver {
    /// Creates a disconnected driver.
    ///
    /// # Errors
    ///
    /// `DeviceError::Configuration` if the register map is invalid.
    pub fn new(
        identity: DeviceIdentity,
        connection: ModbusTcpConfig,
        registers: InverterRegisters,
        context: &DriverContext,
    ) -> DeviceResult<Self> {
        registers.validate(&identity.name)?;

        let link = Arc::new(DeviceLink::new(
            identity.name.clone(),
            connection,
            Arc::clone(&context.connector),
            context.health,
        ));

        Ok(Self {
            telemetry_map: registers.telemetry_map(),
            metadata_map: registers.metadata_map(),
            identity,
            registers,
            link,
            store: Arc::clone(&context.store),
            resolution: context.resolution.clone(),
            state: DeviceState::Disconnected,
            metadata: None,
            appliance: None,
        })
    }

    /// Returns the link, for devices that read through this inverter.
    pub fn link(&self) -> Arc<DeviceLink> {
        Arc::clone(&self.link)
    }

    /// Returns the metadata discovered by the last successful connect.
    pub fn metadata(&self) -> Option<&InverterMetadata> {
        self.metadata.as_ref()
    }

    /// Returns the identity of the device.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    async fn establish(&mut self) -> DeviceResult<Appliance> {
        self.link
            .open()
            .await
            .map_err(|source| DeviceError::Connection {
                device: self.identity.name.clone(),
                source,
            })?;
        let reader = self
            .link
            .reader()
            .ok_or_else(|| DeviceError::not_connected(&self.identity.name))?;

        let readings = RegisterMapper::read_multiple_registers(&reader, &self.metadata_map).await;
        let metadata = InverterMetadata {
            max_pv_production_w: readings.number("max_pv_production"),
        };
        tracing::debug!(device = %self.identity.name, metadata = ?metadata, "Inverter metadata discovered");

        let appliance = synchronise(
            self.store.as_ref(),
            &self.identity,
            serial_number(&readings),
            ApplianceDetails::Inverter(metadata.clone()),
        )
        .await?;

        self.metadata = Some(metadata);
        Ok(appliance)
    }
}

#[async_trait]
impl DeviceDriver for InverterDriver {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn kind(&self) -> ApplianceKind {
        ApplianceKind::Inverter
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    async fn connect(&mut self) -> DeviceResult<()> {
        self.state = DeviceState::Connecting;

        match self.establish().await {
            Ok(appliance) => {
                tracing::info!(
                    device = %self.identity.name,
                    appliance_id = %appliance.id,
                    endpoint = %self.link.config().socket_addr(),
                    "Inverter connected"
                );
                self.appliance = Some(appliance);
                self.state = DeviceState::Connected;
                self.link.mark_ready();
                Ok(())
            }
            Err(e) => {
                self.link.close().await;
                self.metadata = None;
                self.state = DeviceState::Disconnected;
                tracing::warn!(
                    device = %self.identity.name,
                    category = e.category(),
                    error = %e,
                    "Inverter connect failed"
                );
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.link.close().await;
        self.metadata = None;
        self.state = DeviceState::Disconnected;
        tracing::info!(device = %self.identity.name, "Inverter disconnected");
    }

    fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    async fn update_data(&self) -> DeviceResult<TelemetryMessage> {
        let (Some(appliance), DeviceState::Connected) = (&self.appliance, self.state) else {
            return Err(DeviceError::not_connected(&self.identity.name));
        };
        let reader = self
            .link
            .reader()
            .ok_or_else(|| DeviceError::not_connected(&self.identity.name))?;

        let readings = RegisterMapper::read_multiple_registers(&reader, &self.telemetry_map).await;
        Ok(TelemetryMessage::Inverter(build_inverter_telemetry(
            &self.identity.name,
            appliance.id.clone(),
            &self.registers,
            &readings,
            &self.resolution,
            Utc::now(),
        )))
    }

    fn appliance(&self) -> Option<&Appliance> {
        self.appliance.as_ref()
    }

    fn health(&self) -> HealthSnapshot {
        self.link.health_snapshot()
    }
}

// =============================================================================
// Record building
// =============================================================================

/// Builds an inverter record from one poll's readings.
pub fn build_inverter_telemetry(
    device: &str,
    appliance_id: ApplianceId,
    registers: &InverterRegisters,
    readings: &RegisterReadings,
    resolution: &str,
    timestamp: DateTime<Utc>,
) -> InverterTelemetry {
    InverterTelemetry {
        appliance_id,
        timestamp,
        resolution: resolution.to_string(),
        pv_power_w: readings.number("power").unwrap_or(0.0),
        state: map_state(device, "state", registers.state.as_ref(), readings),
        total_energy_wh: readings.number("total_energy"),
        strings: string_readings(readings),
    }
}

/// Strings with a readable power or voltage, in index order.
pub fn string_readings(readings: &RegisterReadings) -> Vec<StringReading> {
    (1..=MAX_PV_STRINGS)
        .filter_map(|index| {
            let power_w = readings.number(&format!("string{index}_power"));
            let voltage = readings.number(&format!("string{index}_voltage"));
            (power_w.is_some() || voltage.is_some()).then_some(StringReading {
                index,
                power_w,
                voltage,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_modbus::{DataType, RegisterValue};

    fn registers() -> InverterRegisters {
        InverterRegisters {
            power: Some(RegisterDescriptor::new(30775, DataType::Int32).required()),
            state: Some(
                RegisterDescriptor::new(30201, DataType::UInt32)
                    .with_mapping(307, "mppt")
                    .with_mapping(1392, "fault"),
            ),
            string1_power: Some(RegisterDescriptor::new(30773, DataType::Int32)),
            string1_voltage: Some(RegisterDescriptor::new(30771, DataType::Int32).with_scale(2)),
            ..Default::default()
        }
    }

    #[test]
    fn test_maps_split_telemetry_and_metadata() {
        let mut registers = registers();
        registers.max_pv_production = Some(RegisterDescriptor::new(30231, DataType::UInt32));

        assert_eq!(registers.telemetry_map().len(), 4);
        assert_eq!(registers.metadata_map().len(), 1);
        assert_eq!(registers.register_map().len(), 5);
    }

    #[test]
    fn test_validate_rejects_unknown_state_name() {
        let mut registers = registers();
        registers.state = Some(RegisterDescriptor::new(30201, DataType::UInt32).with_mapping(1, "dancing"));
        assert!(matches!(
            registers.validate("inv"),
            Err(DeviceError::Configuration { .. })
        ));
    }

    #[test]
    fn test_unreadable_power_defaults_to_zero_and_keeps_strings() {
        let mut readings = RegisterReadings::new();
        readings.insert("string1_power", RegisterValue::Number(1200.0));
        readings.insert("string1_voltage", RegisterValue::Number(410.5));

        let record = build_inverter_telemetry(
            "inv",
            ApplianceId::new("a"),
            &registers(),
            &readings,
            "10s",
            Utc::now(),
        );

        assert_eq!(record.pv_power_w, 0.0);
        assert_eq!(record.state, InverterState::Unknown);
        assert_eq!(record.total_energy_wh, None);
        assert_eq!(
            record.strings,
            vec![StringReading {
                index: 1,
                power_w: Some(1200.0),
                voltage: Some(410.5),
            }]
        );
    }

    #[test]
    fn test_string_with_voltage_only_is_included() {
        let mut readings = RegisterReadings::new();
        readings.insert("string3_voltage", RegisterValue::Number(380.0));

        let strings = string_readings(&readings);
        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].index, 3);
        assert_eq!(strings[0].power_w, None);
    }

    #[test]
    fn test_state_mapping_applied() {
        let mut readings = RegisterReadings::new();
        readings.insert("power", RegisterValue::Number(4321.0));
        readings.insert("state", RegisterValue::Number(307.0));

        let record = build_inverter_telemetry("inv", ApplianceId::new("a"), &registers(), &readings, "1m", Utc::now());
        assert_eq!(record.pv_power_w, 4321.0);
        assert_eq!(record.state, InverterState::Mppt);
        assert_eq!(record.resolution, "1m");
        assert!(record.strings.is_empty());
    }

    #[test]
    fn test_registers_reject_unknown_fields() {
        let json = r#"{ "power": { "address": 1, "data_type": "int32" }, "pwoer": { "address": 2, "data_type": "int32" } }"#;
        assert!(serde_json::from_str::<InverterRegisters>(json).is_err());
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Battery driver.
//!
//! A battery has no link of its own: it reads through the [`DeviceLink`] of
//! the inverter it is attached to and refuses to connect until the inverter
//! has marked that link ready.
//!
//! Battery power is resolved through a fallback chain, first match wins:
//!
//! ```text
//! 1. power                                  (direct register)
//! 2. drain_percentage × max_capacity / 100  (discharging, positive)
//!    load_percentage  × max_capacity / 100  (charging, negative)
//!    (a percentage that is not positive is skipped)
//! 3. current × voltage
//! 4. omitted
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridlink_modbus::client::HealthSnapshot;
use gridlink_modbus::{RegisterDescriptor, RegisterMap, RegisterMapper, RegisterReadings};

use crate::appliance::{Appliance, ApplianceDetails, ApplianceId, ApplianceKind, ApplianceStore, BatteryMetadata};
use crate::driver::{
    serial_number, synchronise, validate_registers, DeviceDriver, DeviceIdentity, DeviceState, DriverContext,
};
use crate::error::{DeviceError, DeviceResult};
use crate::link::DeviceLink;
use crate::telemetry::{invalid_state_names, map_state, BatteryState, BatteryTelemetry, TelemetryMessage};

// =============================================================================
// BatteryRegisters
// =============================================================================

/// Register layout of a battery. Absent fields are never read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryRegisters {
    /// State of charge in percent.
    pub soc: Option<RegisterDescriptor>,
    /// Battery power in watts, positive when discharging.
    pub power: Option<RegisterDescriptor>,
    /// Discharge rate as a percentage of capacity.
    pub drain_percentage: Option<RegisterDescriptor>,
    /// Charge rate as a percentage of capacity.
    pub load_percentage: Option<RegisterDescriptor>,
    /// Battery current in amperes.
    pub current: Option<RegisterDescriptor>,
    /// Battery voltage in volts.
    pub voltage: Option<RegisterDescriptor>,
    /// Operating state, resolved through its value mapping.
    pub state: Option<RegisterDescriptor>,
    /// Usable capacity in watt-hours, read once per connection.
    pub max_capacity: Option<RegisterDescriptor>,
    /// Maximum charge power in watts, read once per connection.
    pub max_charge_power: Option<RegisterDescriptor>,
    /// Maximum discharge power in watts, read once per connection.
    pub max_discharge_power: Option<RegisterDescriptor>,
    /// Serial number, read once per connection.
    pub serial_number: Option<RegisterDescriptor>,
}

impl BatteryRegisters {
    /// Fields read on every poll.
    pub fn telemetry_map(&self) -> RegisterMap {
        RegisterMap::new()
            .with_optional("soc", self.soc.as_ref())
            .with_optional("power", self.power.as_ref())
            .with_optional("drain_percentage", self.drain_percentage.as_ref())
            .with_optional("load_percentage", self.load_percentage.as_ref())
            .with_optional("current", self.current.as_ref())
            .with_optional("voltage", self.voltage.as_ref())
            .with_optional("state", self.state.as_ref())
    }

    /// Fields read once in `connect()`.
    pub fn metadata_map(&self) -> RegisterMap {
        RegisterMap::new()
            .with_optional("max_capacity", self.max_capacity.as_ref())
            .with_optional("max_charge_power", self.max_charge_power.as_ref())
            .with_optional("max_discharge_power", self.max_discharge_power.as_ref())
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
            invalid_state_names::<BatteryState>("state", self.state.as_ref()),
        )
    }
}

// =============================================================================
// BatteryDriver
// =============================================================================

/// Driver for a battery attached to an inverter.
pub struct BatteryDriver {
    identity: DeviceIdentity,
    registers: BatteryRegisters,
    telemetry_map: RegisterMap,
    metadata_map: RegisterMap,
    link: Arc<DeviceLink>,
    store: Arc<dyn ApplianceStore>,
    resolution: String,
    state: DeviceState,
    metadata: Option<BatteryMetadata>,
    appliance: Option<Appliance>,
}

impl BatteryDriver {
    /// Creates a disconnected driver reading through `inverter_link`.
    ///
    /// # Errors
    ///
    /// `DeviceError::Configuration` if the register map is invalid.
    pub fn new(
        identity: DeviceIdentity,
        inverter_link: Arc<DeviceLink>,
        registers: BatteryRegisters,
        context: &DriverContext,
    ) -> DeviceResult<Self> {
        registers.validate(&identity.name)?;

        Ok(Self {
            telemetry_map: registers.telemetry_map(),
            metadata_map: registers.metadata_map(),
            identity,
            registers,
            link: inverter_link,
            store: Arc::clone(&context.store),
            resolution: context.resolution.clone(),
            state: DeviceState::Disconnected,
            metadata: None,
            appliance: None,
        })
    }

    /// Returns the metadata discovered by the last successful connect.
    pub fn metadata(&self) -> Option<&BatteryMetadata> {
        self.metadata.as_ref()
    }

    /// Returns the name of the inverter whose link is used.
    pub fn inverter_name(&self) -> &str {
        self.link.name()
    }

    async fn establish(&mut self) -> DeviceResult<Appliance> {
        if !self.link.is_ready() {
            return Err(DeviceError::DependencyNotConnected {
                device: self.identity.name.clone(),
                dependency: self.link.name().to_string(),
            });
        }
        let reader = self
            .link
            .reader()
            .ok_or_else(|| DeviceError::not_connected(&self.identity.name))?;

        let readings = RegisterMapper::read_multiple_registers(&reader, &self.metadata_map).await;
        let metadata = BatteryMetadata {
            max_capacity_wh: readings.number("max_capacity"),
            max_charge_power_w: readings.number("max_charge_power"),
            max_discharge_power_w: readings.number("max_discharge_power"),
        };
        tracing::debug!(device = %self.identity.name, metadata = ?metadata, "Battery metadata discovered");

        let appliance = synchronise(
            self.store.as_ref(),
            &self.identity,
            serial_number(&readings),
            ApplianceDetails::Battery(metadata.clone()),
        )
        .await?;

        self.metadata = Some(metadata);
        Ok(appliance)
    }
}

#[async_trait]
impl DeviceDriver for BatteryDriver {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn kind(&self) -> ApplianceKind {
        ApplianceKind::Battery
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
                    inverter = %self.link.name(),
                    appliance_id = %appliance.id,
                    "Battery connected"
                );
                self.appliance = Some(appliance);
                self.state = DeviceState::Connected;
                Ok(())
            }
            Err(e) => {
                // The link belongs to the inverter and stays open
                self.metadata = None;
                self.state = DeviceState::Disconnected;
                tracing::warn!(
                    device = %self.identity.name,
                    category = e.category(),
                    error = %e,
                    "Battery connect failed"
                );
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.link.close().await;
        self.metadata = None;
        self.state = DeviceState::Disconnected;
        tracing::info!(device = %self.identity.name, inverter = %self.link.name(), "Battery disconnected");
    }

    fn is_connected(&self) -> bool {
        self.link.is_ready()
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
        Ok(TelemetryMessage::Battery(build_battery_telemetry(
            &self.identity.name,
            appliance.id.clone(),
            &self.registers,
            self.metadata.as_ref(),
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

/// Builds a battery record from one poll's readings.
pub fn build_battery_telemetry(
    device: &str,
    appliance_id: ApplianceId,
    registers: &BatteryRegisters,
    metadata: Option<&BatteryMetadata>,
    readings: &RegisterReadings,
    resolution: &str,
    timestamp: DateTime<Utc>,
) -> BatteryTelemetry {
    let max_capacity_wh = metadata.and_then(|m| m.max_capacity_wh);

    BatteryTelemetry {
        appliance_id,
        timestamp,
        resolution: resolution.to_string(),
        soc_percent: readings.number("soc").unwrap_or(0.0),
        power_w: battery_power(readings, max_capacity_wh),
        state: map_state(device, "state", registers.state.as_ref(), readings),
    }
}

/// Resolves battery power through the fallback chain.
pub fn battery_power(readings: &RegisterReadings, max_capacity_wh: Option<f64>) -> Option<f64> {
    if let Some(power) = readings.number("power") {
        return Some(power);
    }

    if let Some(capacity) = max_capacity_wh {
        if let Some(drain) = readings.number("drain_percentage").filter(|d| *d > 0.0) {
            return Some(drain / 100.0 * capacity);
        }
        if let Some(load) = readings.number("load_percentage").filter(|l| *l > 0.0) {
            return Some(-(load / 100.0 * capacity));
        }
    }

    match (readings.number("current"), readings.number("voltage")) {
        (Some(current), Some(voltage)) => Some(current * voltage),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_modbus::{DataType, RegisterValue};

    fn readings(values: &[(&str, f64)]) -> RegisterReadings {
        let mut readings = RegisterReadings::new();
        for (name, value) in values {
            readings.insert(*name, RegisterValue::Number(*value));
        }
        readings
    }

    #[test]
    fn test_direct_power_wins() {
        let r = readings(&[("power", -800.0), ("drain_percentage", 10.0), ("current", 2.0), ("voltage", 50.0)]);
        assert_eq!(battery_power(&r, Some(10_000.0)), Some(-800.0));
    }

    #[test]
    fn test_drain_beats_load() {
        let r = readings(&[("drain_percentage", 25.0), ("load_percentage", 40.0)]);
        assert_eq!(battery_power(&r, Some(10_000.0)), Some(2500.0));
    }

    #[test]
    fn test_idle_drain_falls_through_to_load() {
        let r = readings(&[("drain_percentage", 0.0), ("load_percentage", 40.0)]);
        assert_eq!(battery_power(&r, Some(10_000.0)), Some(-4000.0));
    }

    #[test]
    fn test_idle_percentages_fall_through_to_current() {
        let r = readings(&[("drain_percentage", 0.0), ("load_percentage", 0.0), ("current", 2.0), ("voltage", 50.0)]);
        assert_eq!(battery_power(&r, Some(10_000.0)), Some(100.0));
    }

    #[test]
    fn test_load_is_negative() {
        let r = readings(&[("load_percentage", 40.0)]);
        assert_eq!(battery_power(&r, Some(10_000.0)), Some(-4000.0));
    }

    #[test]
    fn test_percentages_need_capacity() {
        let r = readings(&[("drain_percentage", 25.0), ("current", -4.0), ("voltage", 51.2)]);
        let power = battery_power(&r, None).unwrap();
        assert!((power - (-204.8)).abs() < 1e-9);
    }

    #[test]
    fn test_no_source_omits_power() {
        assert_eq!(battery_power(&readings(&[("current", 3.0)]), Some(5000.0)), None);
    }

    #[test]
    fn test_record_defaults() {
        let registers = BatteryRegisters {
            state: Some(RegisterDescriptor::new(30955, DataType::UInt32).with_mapping(2291, "standby")),
            ..Default::default()
        };
        let r = readings(&[("state", 2291.0)]);

        let record = build_battery_telemetry("bat", ApplianceId::new("b"), &registers, None, &r, "10s", Utc::now());
        assert_eq!(record.soc_percent, 0.0);
        assert_eq!(record.power_w, None);
        assert_eq!(record.state, BatteryState::Standby);
    }

    #[test]
    fn test_validate_rejects_string_without_quantity() {
        let registers = BatteryRegisters {
            serial_number: Some(RegisterDescriptor::new(40001, DataType::String)),
            ..Default::default()
        };
        assert!(matches!(
            registers.validate("bat"),
            Err(DeviceError::Configuration { .. })
        ));
    }
}

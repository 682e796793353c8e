// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Grid meter driver.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridlink_modbus::client::HealthSnapshot;
use gridlink_modbus::{ModbusTcpConfig, RegisterDescriptor, RegisterMap, RegisterMapper, RegisterReadings};

use crate::appliance::{Appliance, ApplianceDetails, ApplianceId, ApplianceKind, ApplianceStore};
use crate::driver::{
    serial_number, synchronise, validate_registers, DeviceDriver, DeviceIdentity, DeviceState, DriverContext,
};
use crate::error::{DeviceError, DeviceResult};
use crate::link::DeviceLink;
use crate::telemetry::{MeterTelemetry, TelemetryMessage};

/// Register layout of a grid meter. Absent fields are never read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MeterRegisters {
    /// Net grid power in watts, positive when importing.
    pub grid_power: Option<RegisterDescriptor>,
    /// Power drawn from the grid in watts.
    pub consumption_power: Option<RegisterDescriptor>,
    /// Power fed into the grid in watts.
    pub feed_in_power: Option<RegisterDescriptor>,
    /// Imported energy in watt-hours.
    pub energy_import: Option<RegisterDescriptor>,
    /// Exported energy in watt-hours.
    pub energy_export: Option<RegisterDescriptor>,
    /// Serial number, read once per connection.
    pub serial_number: Option<RegisterDescriptor>,
}

impl MeterRegisters {
    /// Fields read on every poll.
    pub fn telemetry_map(&self) -> RegisterMap {
        RegisterMap::new()
            .with_optional("grid_power", self.grid_power.as_ref())
            .with_optional("consumption_power", self.consumption_power.as_ref())
            .with_optional("feed_in_power", self.feed_in_power.as_ref())
            .with_optional("energy_import", self.energy_import.as_ref())
            .with_optional("energy_export", self.energy_export.as_ref())
    }

    /// Fields read once in `connect()`.
    pub fn metadata_map(&self) -> RegisterMap {
        RegisterMap::new().with_optional("serial_number", self.serial_number.as_ref())
    }

    /// Every present field.
    pub fn register_map(&self) -> RegisterMap {
        self.telemetry_map()
            .with_optional("serial_number", self.serial_number.as_ref())
    }

    /// Checks every descriptor.
    pub fn validate(&self, device: &str) -> DeviceResult<()> {
        validate_registers(device, &self.register_map(), Vec::new())
    }
}

/// Driver for a grid meter reachable over Modbus TCP.
pub struct MeterDriver {
    identity: DeviceIdentity,
    telemetry_map: RegisterMap,
    metadata_map: RegisterMap,
    link: Arc<DeviceLink>,
    store: Arc<dyn ApplianceStore>,
    resolution: String,
    state: DeviceState,
    appliance: Option<Appliance>,
}

impl MeterDriver {
    /// Creates a disconnected driver, rejecting an invalid register map.
    pub fn new(
        identity: DeviceIdentity,
        connection: ModbusTcpConfig,
        registers: MeterRegisters,
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
            link,
            store: Arc::clone(&context.store),
            resolution: context.resolution.clone(),
            state: DeviceState::Disconnected,
            appliance: None,
        })
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
        synchronise(
            self.store.as_ref(),
            &self.identity,
            serial_number(&readings),
            ApplianceDetails::Meter,
        )
        .await
    }
}

#[async_trait]
impl DeviceDriver for MeterDriver {
    fn name(&self) -> &str {
        &self.identity.name
    }

    fn kind(&self) -> ApplianceKind {
        ApplianceKind::Meter
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    async fn connect(&mut self) -> DeviceResult<()> {
        self.state = DeviceState::Connecting;

        match self.establish().await {
            Ok(appliance) => {
                tracing::info!(device = %self.identity.name, appliance_id = %appliance.id, "Meter connected");
                self.appliance = Some(appliance);
                self.state = DeviceState::Connected;
                Ok(())
            }
            Err(e) => {
                self.link.close().await;
                self.state = DeviceState::Disconnected;
                tracing::warn!(
                    device = %self.identity.name,
                    category = e.category(),
                    error = %e,
                    "Meter connect failed"
                );
                Err(e)
            }
        }
    }

    async fn disconnect(&mut self) {
        self.link.close().await;
        self.state = DeviceState::Disconnected;
        tracing::info!(device = %self.identity.name, "Meter disconnected");
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
        Ok(TelemetryMessage::Meter(build_meter_telemetry(
            appliance.id.clone(),
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

/// Builds a meter record from one poll's readings.
pub fn build_meter_telemetry(
    appliance_id: ApplianceId,
    readings: &RegisterReadings,
    resolution: &str,
    timestamp: DateTime<Utc>,
) -> MeterTelemetry {
    MeterTelemetry {
        appliance_id,
        timestamp,
        resolution: resolution.to_string(),
        grid_power_w: grid_power(readings),
        energy_import_wh: readings.number("energy_import").unwrap_or(0.0),
        energy_export_wh: readings.number("energy_export").unwrap_or(0.0),
    }
}

/// Direct grid power, else consumption minus feed-in.
pub fn grid_power(readings: &RegisterReadings) -> Option<f64> {
    if let Some(power) = readings.number("grid_power") {
        return Some(power);
    }
    match (readings.number("consumption_power"), readings.number("feed_in_power")) {
        (Some(consumption), Some(feed_in)) => Some(consumption - feed_in),
        _ => None,
    }
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Register layouts modelled on a hybrid inverter with an attached battery
//! and a separate grid meter. The mock transports are seeded at the same
//! addresses the register maps point to.

use std::sync::Arc;

use gridlink_devices::{
    BatteryRegisters, DeviceIdentity, DriverContext, InMemoryApplianceStore, InverterRegisters,
    MeterRegisters,
};
use gridlink_modbus::{DataType, ModbusTcpConfig, RegisterDescriptor};

use super::mocks::{MockConnector, MockTransport};

// =============================================================================
// Addresses
// =============================================================================

/// Inverter register addresses.
pub mod inverter_addr {
    /// AC power, int32.
    pub const POWER: u16 = 30775;
    /// Operating state, uint32.
    pub const STATE: u16 = 30201;
    /// Lifetime energy, uint32.
    pub const TOTAL_ENERGY: u16 = 30529;
    /// String 1 power, int32.
    pub const STRING1_POWER: u16 = 30773;
    /// String 1 voltage, int32 scaled by 2.
    pub const STRING1_VOLTAGE: u16 = 30771;
    /// Serial number, 8 registers of text.
    pub const SERIAL: u16 = 30057;
    /// Nominal power, uint32.
    pub const MAX_PV: u16 = 30231;
}

/// Battery register addresses (served by the inverter).
pub mod battery_addr {
    /// State of charge, uint32.
    pub const SOC: u16 = 30845;
    /// Drain percentage, uint16.
    pub const DRAIN: u16 = 31393;
    /// Load percentage, uint16.
    pub const LOAD: u16 = 31395;
    /// Capacity, uint32.
    pub const MAX_CAPACITY: u16 = 40187;
}

/// Meter register addresses.
pub mod meter_addr {
    /// Net grid power, int32.
    pub const GRID_POWER: u16 = 30865;
    /// Imported energy, uint32.
    pub const ENERGY_IMPORT: u16 = 30581;
    /// Exported energy, uint32.
    pub const ENERGY_EXPORT: u16 = 30583;
}

/// Network identifier shared by the inverter and its battery.
pub const INVERTER_NETWORK_ID: &str = "aa:bb:cc:dd:ee:01";

/// Network identifier of the meter.
pub const METER_NETWORK_ID: &str = "aa:bb:cc:dd:ee:02";

// =============================================================================
// Register maps
// =============================================================================

/// Inverter map with string 1, state mapping and serial number.
pub fn inverter_registers() -> InverterRegisters {
    use inverter_addr::*;

    InverterRegisters {
        power: Some(RegisterDescriptor::new(POWER, DataType::Int32)),
        state: Some(
            RegisterDescriptor::new(STATE, DataType::UInt32)
                .with_mapping(307, "mppt")
                .with_mapping(303, "off"),
        ),
        total_energy: Some(RegisterDescriptor::new(TOTAL_ENERGY, DataType::UInt32)),
        string1_power: Some(RegisterDescriptor::new(STRING1_POWER, DataType::Int32)),
        string1_voltage: Some(RegisterDescriptor::new(STRING1_VOLTAGE, DataType::Int32).with_scale(2)),
        max_pv_production: Some(RegisterDescriptor::new(MAX_PV, DataType::UInt32)),
        serial_number: Some(RegisterDescriptor::new(SERIAL, DataType::String).with_quantity(8)),
        ..Default::default()
    }
}

/// Battery map using drain/load percentages against the capacity.
pub fn battery_registers() -> BatteryRegisters {
    use battery_addr::*;

    BatteryRegisters {
        soc: Some(RegisterDescriptor::new(SOC, DataType::UInt32).required()),
        drain_percentage: Some(RegisterDescriptor::new(DRAIN, DataType::UInt16)),
        load_percentage: Some(RegisterDescriptor::new(LOAD, DataType::UInt16)),
        max_capacity: Some(RegisterDescriptor::new(MAX_CAPACITY, DataType::UInt32)),
        ..Default::default()
    }
}

/// Meter map with net power and both energy counters.
pub fn meter_registers() -> MeterRegisters {
    use meter_addr::*;

    MeterRegisters {
        grid_power: Some(RegisterDescriptor::new(GRID_POWER, DataType::Int32)),
        energy_import: Some(RegisterDescriptor::new(ENERGY_IMPORT, DataType::UInt32)),
        energy_export: Some(RegisterDescriptor::new(ENERGY_EXPORT, DataType::UInt32)),
        ..Default::default()
    }
}

// =============================================================================
// Seeded transports
// =============================================================================

/// Inverter producing 4200 W in MPPT, with a 3000 W / 412.5 V string 1.
pub fn seeded_inverter() -> Arc<MockTransport> {
    use inverter_addr::*;

    let transport = MockTransport::shared();
    transport.set_number(POWER, 4200.0, DataType::Int32);
    transport.set_number(STATE, 307.0, DataType::UInt32);
    transport.set_number(TOTAL_ENERGY, 12_345_678.0, DataType::UInt32);
    transport.set_number(STRING1_POWER, 3000.0, DataType::Int32);
    transport.set_number(STRING1_VOLTAGE, 41250.0, DataType::Int32);
    transport.set_number(MAX_PV, 10_000.0, DataType::UInt32);
    transport.set_text(SERIAL, "INV-3001", 8);
    transport
}

/// Adds a battery at 80 % with 25 % drain and 40 % load of 10 kWh.
pub fn seed_battery(transport: &MockTransport) {
    use battery_addr::*;

    transport.set_number(SOC, 80.0, DataType::UInt32);
    transport.set_number(DRAIN, 25.0, DataType::UInt16);
    transport.set_number(LOAD, 40.0, DataType::UInt16);
    transport.set_number(MAX_CAPACITY, 10_000.0, DataType::UInt32);
}

/// Meter importing 850 W.
pub fn seeded_meter() -> Arc<MockTransport> {
    use meter_addr::*;

    let transport = MockTransport::shared();
    transport.set_number(GRID_POWER, 850.0, DataType::Int32);
    transport.set_number(ENERGY_IMPORT, 5_000_000.0, DataType::UInt32);
    transport.set_number(ENERGY_EXPORT, 7_500_000.0, DataType::UInt32);
    transport
}

// =============================================================================
// Contexts and identities
// =============================================================================

/// Connection parameters for a mock host.
pub fn connection(host: &str) -> ModbusTcpConfig {
    ModbusTcpConfig::new(host)
}

/// Identity of the fixture inverter.
pub fn inverter_identity() -> DeviceIdentity {
    DeviceIdentity::new("inv-1", INVERTER_NETWORK_ID)
}

/// Identity of the fixture battery.
pub fn battery_identity() -> DeviceIdentity {
    DeviceIdentity::new("bat-1", INVERTER_NETWORK_ID)
}

/// Identity of the fixture meter.
pub fn meter_identity() -> DeviceIdentity {
    DeviceIdentity::new("meter-1", METER_NETWORK_ID)
}

/// Driver context over a fresh in-memory store.
pub fn context_with(
    connector: Arc<MockConnector>,
    store: Arc<InMemoryApplianceStore>,
) -> DriverContext {
    DriverContext::new(store, connector)
}

// =============================================================================
// Configuration documents
// =============================================================================

/// A site with one inverter, its battery and a meter on two mock hosts.
pub const SITE_YAML: &str = r#"
site:
  id: test-site
  name: Test Site
polling:
  interval: 50ms
  resolution: 10s
reconnect:
  initial_delay: 10ms
  max_delay: 50ms
devices:
  - kind: inverter
    id: inv-1
    network_device_id: "aa:bb:cc:dd:ee:01"
    connection: { host: "inverter.local", timeout: 1s }
    registers:
      power: { address: 30775, data_type: int32 }
      state:
        address: 30201
        data_type: uint32
        value_mapping:
          - { raw_value: 307, mapped_state: mppt }
      serial_number: { address: 30057, data_type: string, quantity: 8 }
  - kind: battery
    id: bat-1
    inverter: inv-1
    network_device_id: "aa:bb:cc:dd:ee:01"
    registers:
      soc: { address: 30845, data_type: uint32, required: true }
      drain_percentage: { address: 31393, data_type: uint16 }
      load_percentage: { address: 31395, data_type: uint16 }
      max_capacity: { address: 40187, data_type: uint32 }
  - kind: meter
    id: meter-1
    network_device_id: "aa:bb:cc:dd:ee:02"
    connection: { host: "meter.local", timeout: 1s }
    registers:
      grid_power: { address: 30865, data_type: int32 }
"#;

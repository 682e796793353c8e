// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Device Integration Tests
//!
//! Inverter, battery and meter drivers end to end against mock transports.
//!
//! ## Test Categories
//!
//! - `test_inverter_*`: Inverter driver
//! - `test_battery_*`: Battery driver on a shared inverter link
//! - `test_meter_*`: Meter driver
//! - `test_discovery_*`: Appliance store synchronisation

use std::sync::Arc;

use gridlink_devices::{
    ApplianceDetails, ApplianceKind, BatteryDriver, DeviceDriver, DeviceError, DeviceState,
    DriverContext, InMemoryApplianceStore, InverterDriver, InverterState, MeterDriver,
    TelemetryMessage,
};
use gridlink_tests::prelude::*;

struct Site {
    inverter_transport: Arc<MockTransport>,
    connector: Arc<MockConnector>,
    store: Arc<InMemoryApplianceStore>,
    context: DriverContext,
}

fn site() -> Site {
    init_test_logging();

    let inverter_transport = seeded_inverter();
    seed_battery(&inverter_transport);
    let connector = Arc::new(MockConnector::new(Arc::clone(&inverter_transport)));
    let store = Arc::new(InMemoryApplianceStore::new());
    let context = context_with(Arc::clone(&connector), Arc::clone(&store));

    Site {
        inverter_transport,
        connector,
        store,
        context,
    }
}

fn inverter(site: &Site) -> InverterDriver {
    InverterDriver::new(
        inverter_identity(),
        connection("inverter.local"),
        inverter_registers(),
        &site.context,
    )
    .unwrap()
}

// =============================================================================
// Inverter Tests
// =============================================================================

#[tokio::test]
async fn test_inverter_connect_and_poll() {
    let site = site();
    let mut driver = inverter(&site);

    driver.connect().await.unwrap();
    assert_eq!(driver.state(), DeviceState::Connected);
    assert!(driver.is_connected());

    let appliance = driver.appliance().unwrap();
    assert_eq!(appliance.kind, ApplianceKind::Inverter);
    assert_eq!(appliance.serial_number.as_deref(), Some("INV-3001"));
    assert!(matches!(
        &appliance.details,
        ApplianceDetails::Inverter(meta) if meta.max_pv_production_w == Some(10_000.0)
    ));

    let TelemetryMessage::Inverter(record) = driver.update_data().await.unwrap() else {
        panic!("expected an inverter record");
    };
    assert_eq!(record.pv_power_w, 4200.0);
    assert_eq!(record.state, InverterState::Mppt);
    assert_eq!(record.total_energy_wh, Some(12_345_678.0));
    assert_eq!(record.strings.len(), 1);
    assert_eq!(record.strings[0].index, 1);
    assert_eq!(record.strings[0].power_w, Some(3000.0));
    assert_eq!(record.strings[0].voltage, Some(412.5));
    assert_eq!(record.appliance_id, appliance.id);
}

#[tokio::test]
async fn test_inverter_unreadable_power_reports_zero_with_strings() {
    let site = site();
    site.inverter_transport.fail_address(inverter_addr::POWER);
    let mut driver = inverter(&site);
    driver.connect().await.unwrap();

    let TelemetryMessage::Inverter(record) = driver.update_data().await.unwrap() else {
        panic!("expected an inverter record");
    };
    assert_eq!(record.pv_power_w, 0.0);
    let indices: Vec<u8> = record.strings.iter().map(|s| s.index).collect();
    assert_eq!(indices, [1]);
}

#[tokio::test]
async fn test_inverter_update_before_connect_fails() {
    let site = site();
    let driver = inverter(&site);

    let result = driver.update_data().await;
    assert!(matches!(result, Err(DeviceError::NotConnected { .. })));
    assert_eq!(site.inverter_transport.read_count(), 0);
}

#[tokio::test]
async fn test_inverter_refused_connection() {
    let site = site();
    site.connector.refuse(true);
    let mut driver = inverter(&site);

    let error = driver.connect().await.unwrap_err();
    assert!(matches!(error, DeviceError::Connection { .. }));
    assert!(error.is_retryable());
    assert_eq!(driver.state(), DeviceState::Disconnected);
    assert!(site.store.is_empty().await);
}

#[tokio::test]
async fn test_inverter_unhealthy_link_reports_disconnected() {
    let site = site();
    let mut driver = inverter(&site);
    driver.connect().await.unwrap();

    site.inverter_transport.fail_all(true);
    // Five telemetry fields per poll, so one poll trips the threshold.
    let _ = driver.update_data().await;
    assert!(!driver.is_connected());

    site.inverter_transport.fail_all(false);
    driver.connect().await.unwrap();
    assert!(driver.is_connected());
    assert_eq!(driver.health().consecutive_failures, 0);
}

// =============================================================================
// Battery Tests
// =============================================================================

#[tokio::test]
async fn test_battery_fails_fast_without_inverter() {
    let site = site();
    let inverter = inverter(&site);
    let mut battery =
        BatteryDriver::new(battery_identity(), inverter.link(), battery_registers(), &site.context)
            .unwrap();

    let error = battery.connect().await.unwrap_err();
    assert!(matches!(error, DeviceError::DependencyNotConnected { .. }));
    assert_eq!(battery.state(), DeviceState::Disconnected);
    assert_eq!(site.connector.connect_count(), 0);
    assert_eq!(site.inverter_transport.read_count(), 0);
}

#[tokio::test]
async fn test_battery_rejects_open_link_before_inverter_connects() {
    let site = site();
    let inverter = inverter(&site);
    inverter.link().open().await.unwrap();
    let mut battery =
        BatteryDriver::new(battery_identity(), inverter.link(), battery_registers(), &site.context)
            .unwrap();

    let error = battery.connect().await.unwrap_err();
    assert!(matches!(error, DeviceError::DependencyNotConnected { .. }));
    assert_eq!(battery.state(), DeviceState::Disconnected);
    assert!(!battery.is_connected());
}

#[tokio::test]
async fn test_battery_waits_for_inverter_to_finish_connecting() {
    init_test_logging();

    let transport = seeded_inverter();
    seed_battery(&transport);
    let connector = Arc::new(MockConnector::new(Arc::clone(&transport)));
    let store = Arc::new(GatedApplianceStore::new());
    let context = DriverContext::new(store.clone(), connector);

    let mut inverter = InverterDriver::new(
        inverter_identity(),
        connection("inverter.local"),
        inverter_registers(),
        &context,
    )
    .unwrap();
    let link = inverter.link();
    let mut battery =
        BatteryDriver::new(battery_identity(), Arc::clone(&link), battery_registers(), &context)
            .unwrap();

    let connecting = tokio::spawn(async move {
        let result = inverter.connect().await;
        (inverter, result)
    });

    // The inverter has opened its link and is stuck in appliance sync.
    store.wait_entered().await;
    assert!(link.is_connected());
    assert!(!link.is_ready());

    let error = battery.connect().await.unwrap_err();
    assert!(matches!(error, DeviceError::DependencyNotConnected { .. }));
    assert_eq!(battery.state(), DeviceState::Disconnected);

    store.release();
    let (inverter, result) = connecting.await.unwrap();
    result.unwrap();
    assert_eq!(inverter.state(), DeviceState::Connected);

    battery.connect().await.unwrap();
    assert_eq!(battery.state(), DeviceState::Connected);
    assert!(battery.is_connected());
}

#[tokio::test]
async fn test_battery_drain_beats_load() {
    let site = site();
    let mut inverter = inverter(&site);
    inverter.connect().await.unwrap();

    let mut battery =
        BatteryDriver::new(battery_identity(), inverter.link(), battery_registers(), &site.context)
            .unwrap();
    battery.connect().await.unwrap();
    assert_eq!(battery.metadata().and_then(|m| m.max_capacity_wh), Some(10_000.0));

    let TelemetryMessage::Battery(record) = battery.update_data().await.unwrap() else {
        panic!("expected a battery record");
    };
    assert_eq!(record.soc_percent, 80.0);
    assert_eq!(record.power_w, Some(2500.0));
}

#[tokio::test]
async fn test_battery_load_only_charges() {
    let site = site();
    site.inverter_transport.fail_address(battery_addr::DRAIN);
    let mut inverter = inverter(&site);
    inverter.connect().await.unwrap();

    let mut battery =
        BatteryDriver::new(battery_identity(), inverter.link(), battery_registers(), &site.context)
            .unwrap();
    battery.connect().await.unwrap();

    let TelemetryMessage::Battery(record) = battery.update_data().await.unwrap() else {
        panic!("expected a battery record");
    };
    assert_eq!(record.power_w, Some(-4000.0));
}

#[tokio::test]
async fn test_battery_shares_the_inverter_link() {
    let site = site();
    let mut inverter = inverter(&site);
    inverter.connect().await.unwrap();

    let mut battery =
        BatteryDriver::new(battery_identity(), inverter.link(), battery_registers(), &site.context)
            .unwrap();
    battery.connect().await.unwrap();
    assert_eq!(site.connector.connect_count(), 1);

    battery.disconnect().await;
    assert!(!site.inverter_transport.is_open());
    assert!(!inverter.is_connected());
}

// =============================================================================
// Meter Tests
// =============================================================================

#[tokio::test]
async fn test_meter_poll() {
    init_test_logging();

    let connector = Arc::new(MockConnector::new(seeded_meter()));
    let store = Arc::new(InMemoryApplianceStore::new());
    let context = context_with(connector, Arc::clone(&store));
    let mut meter =
        MeterDriver::new(meter_identity(), connection("meter.local"), meter_registers(), &context)
            .unwrap();

    meter.connect().await.unwrap();
    let TelemetryMessage::Meter(record) = meter.update_data().await.unwrap() else {
        panic!("expected a meter record");
    };
    assert_eq!(record.grid_power_w, Some(850.0));
    assert_eq!(record.energy_import_wh, 5_000_000.0);
    assert_eq!(record.energy_export_wh, 7_500_000.0);
    assert_eq!(store.len().await, 1);
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[tokio::test]
async fn test_discovery_rediscovery_keeps_one_record() {
    let site = site();
    let mut driver = inverter(&site);

    driver.connect().await.unwrap();
    let first = driver.appliance().unwrap().id.clone();
    driver.disconnect().await;

    driver.connect().await.unwrap();
    let second = driver.appliance().unwrap().id.clone();

    assert_eq!(first, second);
    assert_eq!(site.store.len().await, 1);
}

#[tokio::test]
async fn test_discovery_inverter_and_battery_are_separate_appliances() {
    let site = site();
    let mut inverter = inverter(&site);
    inverter.connect().await.unwrap();
    let mut battery =
        BatteryDriver::new(battery_identity(), inverter.link(), battery_registers(), &site.context)
            .unwrap();
    battery.connect().await.unwrap();

    assert_eq!(site.store.len().await, 2);
    assert_ne!(
        inverter.appliance().unwrap().id,
        battery.appliance().unwrap().id
    );
}

#[tokio::test]
async fn test_discovery_store_failure_fails_connect() {
    init_test_logging();

    let connector = Arc::new(MockConnector::new(seeded_inverter()));
    let context = DriverContext::new(Arc::new(FailingApplianceStore), connector);
    let mut driver = InverterDriver::new(
        inverter_identity(),
        connection("inverter.local"),
        inverter_registers(),
        &context,
    )
    .unwrap();

    let error = driver.connect().await.unwrap_err();
    assert!(matches!(error, DeviceError::Store { .. }));
    assert!(error.is_retryable());
    assert_eq!(driver.state(), DeviceState::Disconnected);
    assert!(!driver.is_connected());
}

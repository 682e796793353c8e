// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Runtime Integration Tests
//!
//! The `gridlink run` machinery over mock transports: single-pass polling,
//! the poll loop with reconnects, and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use gridlink_bin::{BinError, RuntimeBuilder};
use gridlink_config::{ConfigFormat, ConfigLoader, GridlinkConfig};
use gridlink_devices::{ApplianceKind, InMemoryApplianceStore, TelemetryMessage};
use gridlink_tests::prelude::*;

struct Harness {
    inverter: Arc<MockTransport>,
    connector: Arc<MockConnector>,
    store: Arc<InMemoryApplianceStore>,
    sink: Arc<RecordingSink>,
}

fn harness() -> Harness {
    init_test_logging();

    let inverter = seeded_inverter();
    seed_battery(&inverter);
    let connector = Arc::new(
        MockConnector::new(MockTransport::shared())
            .with_host("inverter.local", Arc::clone(&inverter))
            .with_host("meter.local", seeded_meter()),
    );

    Harness {
        inverter,
        connector,
        store: Arc::new(InMemoryApplianceStore::new()),
        sink: Arc::new(RecordingSink::new()),
    }
}

fn site_config() -> GridlinkConfig {
    ConfigLoader::new()
        .with_env_vars(false)
        .load_from_str(SITE_YAML, ConfigFormat::Yaml)
        .unwrap()
}

fn builder(harness: &Harness) -> RuntimeBuilder {
    RuntimeBuilder::new()
        .config(site_config())
        .connector(harness.connector.clone())
        .store(harness.store.clone())
        .sink(harness.sink.clone())
}

fn kinds(records: &[TelemetryMessage]) -> Vec<ApplianceKind> {
    records.iter().map(TelemetryMessage::kind).collect()
}

#[tokio::test]
async fn test_run_once_collects_every_device() {
    let harness = harness();
    let runtime = builder(&harness).build().unwrap();

    let records = runtime.run_once().await.unwrap();

    assert_eq!(
        kinds(&records),
        [ApplianceKind::Inverter, ApplianceKind::Meter, ApplianceKind::Battery]
    );
    assert_eq!(harness.sink.records(), records);
    assert_eq!(harness.store.len().await, 3);

    match &records[2] {
        TelemetryMessage::Battery(battery) => assert_eq!(battery.power_w, Some(2500.0)),
        other => panic!("expected battery record, got {other:?}"),
    }

    let json = serde_json::to_value(&records[0]).unwrap();
    assert_eq!(json["type"], "inverter");
    assert_eq!(json["resolution"], "10s");

    assert!(!harness.inverter.is_open());
}

#[tokio::test]
async fn test_run_once_reports_missing_meter_values() {
    let harness = harness();
    let connector = Arc::new(
        MockConnector::new(MockTransport::shared())
            .with_host("inverter.local", Arc::clone(&harness.inverter)),
    );
    // The meter lands on an empty register table: it connects but reads nothing.
    let runtime = builder(&harness).connector(connector).build().unwrap();

    let records = runtime.run_once().await.unwrap();
    assert_eq!(records.len(), 3);

    match &records[1] {
        TelemetryMessage::Meter(meter) => {
            assert_eq!(meter.grid_power_w, None);
            assert_eq!(meter.energy_import_wh, 0.0);
        }
        other => panic!("expected meter record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_run_once_without_reachable_devices_fails() {
    let harness = harness();
    harness.connector.refuse(true);
    let runtime = builder(&harness).build().unwrap();

    assert!(matches!(runtime.run_once().await, Err(BinError::Runtime(_))));
    assert!(harness.sink.records().is_empty());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_run_polls_until_shutdown() {
    let harness = harness();
    let runtime = builder(&harness).build().unwrap();
    let shutdown = runtime.shutdown_handle();

    let task = tokio::spawn(runtime.run());
    tokio::time::sleep(Duration::from_millis(400)).await;
    shutdown.initiate_shutdown();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("runtime should stop after shutdown")
        .unwrap()
        .unwrap();

    let kinds = kinds(&harness.sink.records());
    for kind in [ApplianceKind::Inverter, ApplianceKind::Meter, ApplianceKind::Battery] {
        assert!(kinds.contains(&kind), "no {kind} record in {kinds:?}");
    }
    // Repeated polls reuse the discovered appliances.
    assert_eq!(harness.store.len().await, 3);
    assert!(!harness.inverter.is_open());
}

#[tokio::test]
async fn test_run_reconnects_after_refusals() {
    let harness = harness();
    harness.connector.refuse(true);
    let runtime = builder(&harness).build().unwrap();
    let shutdown = runtime.shutdown_handle();

    let task = tokio::spawn(runtime.run());
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(harness.sink.records().is_empty());
    let refused = harness.connector.connect_count();
    assert!(refused >= 2, "expected retries, saw {refused} attempts");

    harness.connector.refuse(false);
    tokio::time::sleep(Duration::from_millis(400)).await;
    shutdown.initiate_shutdown();

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("runtime should stop after shutdown")
        .unwrap()
        .unwrap();

    assert!(kinds(&harness.sink.records()).contains(&ApplianceKind::Inverter));
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Configuration Integration Tests
//!
//! Loading site files from disk in every format and the cross-device rules.
//!
//! ## Test Categories
//!
//! - `test_load_*`: File loading
//! - `test_validation_*`: Validation rules

use std::io::Write;
use std::time::Duration;

use gridlink_config::{
    load_config, ConfigError, ConfigFormat, ConfigLoader, DeviceConfig, DeviceKind,
};
use gridlink_tests::common::SITE_YAML;

fn write_temp(content: &str, suffix: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("gridlink-it-")
        .suffix(suffix)
        .tempfile()
        .unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn loader() -> ConfigLoader {
    ConfigLoader::new().with_env_prefix("GRIDLINK_IT_CONFIG")
}

// =============================================================================
// Loading Tests
// =============================================================================

#[test]
fn test_load_site_yaml_from_disk() {
    let file = write_temp(SITE_YAML, ".yaml");
    let config = loader().load(file.path()).unwrap();

    assert_eq!(config.site.id, "test-site");
    assert_eq!(config.site.name.as_deref(), Some("Test Site"));
    assert_eq!(config.polling.interval, Duration::from_millis(50));
    assert_eq!(config.count(DeviceKind::Inverter), 1);
    assert_eq!(config.count(DeviceKind::Battery), 1);
    assert_eq!(config.count(DeviceKind::Meter), 1);

    match config.get_device("bat-1") {
        Some(DeviceConfig::Battery(battery)) => {
            assert_eq!(battery.inverter, "inv-1");
            assert!(battery.registers.soc.as_ref().is_some_and(|soc| soc.required));
        }
        other => panic!("expected battery, got {other:?}"),
    }

    match config.get_device("inv-1") {
        Some(DeviceConfig::Inverter(inverter)) => {
            assert_eq!(inverter.connection.host, "inverter.local");
            assert_eq!(inverter.connection.operation_timeout, Duration::from_secs(1));
            let state = inverter.registers.state.as_ref().unwrap();
            assert_eq!(state.map_value(307), Some("mppt"));
        }
        other => panic!("expected inverter, got {other:?}"),
    }
}

#[test]
fn test_load_toml_from_disk() {
    let toml = r#"
[site]
id = "toml-site"

[polling]
interval = "5s"

[[devices]]
kind = "inverter"
id = "inv-1"
network_device_id = "aa:bb:cc"

[devices.connection]
host = "10.0.0.7"
port = 1502

[devices.registers.power]
address = 30775
data_type = "int32"
"#;
    let file = write_temp(toml, ".toml");
    let config = load_config(file.path()).unwrap();

    assert_eq!(config.site.id, "toml-site");
    assert_eq!(config.polling.interval, Duration::from_secs(5));
    let connection = config.devices[0].connection().unwrap();
    assert_eq!(connection.port, 1502);
    assert_eq!(connection.unit_id, 1);
}

#[test]
fn test_load_json_from_str() {
    let json = r#"{
        "site": { "id": "json-site" },
        "devices": [
            {
                "kind": "meter",
                "id": "meter-1",
                "network_device_id": "dd:ee:ff",
                "connection": { "host": "10.0.0.8" },
                "registers": { "grid_power": { "address": 30865, "data_type": "int32" } }
            }
        ]
    }"#;
    let config = loader().load_from_str(json, ConfigFormat::Json).unwrap();
    assert_eq!(config.count(DeviceKind::Meter), 1);
    assert_eq!(config.devices[0].display_name(), "meter-1");
}

#[test]
fn test_load_placeholder_default() {
    let yaml = r#"
devices:
  - kind: inverter
    id: inv-1
    network_device_id: "aa:bb:cc"
    connection: { host: "${GRIDLINK_IT_UNSET_HOST:192.168.1.50}" }
    registers:
      power: { address: 30775, data_type: int32 }
"#;
    let config = loader().load_from_str(yaml, ConfigFormat::Yaml).unwrap();
    assert_eq!(config.devices[0].connection().unwrap().host, "192.168.1.50");
}

#[test]
fn test_load_missing_placeholder_fails() {
    let yaml = "site: { id: \"${GRIDLINK_IT_NEVER_SET}\" }\n";
    let result = loader().load_from_str(yaml, ConfigFormat::Yaml);
    assert!(matches!(result, Err(ConfigError::EnvVarNotFound { .. })));
}

#[test]
fn test_load_unsupported_extension() {
    let file = write_temp("site: {}", ".ini");
    assert!(matches!(
        load_config(file.path()),
        Err(ConfigError::UnsupportedFormat { .. })
    ));
}

#[test]
fn test_load_missing_file() {
    assert!(matches!(
        load_config("/nonexistent/gridlink.yaml"),
        Err(ConfigError::FileNotFound { .. })
    ));
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_validation_battery_without_inverter_rejected() {
    let yaml = r#"
devices:
  - kind: battery
    id: bat-1
    inverter: inv-9
    network_device_id: "aa:bb:cc"
    registers:
      soc: { address: 30845, data_type: uint32 }
"#;
    match loader().load_from_str(yaml, ConfigFormat::Yaml) {
        Err(ConfigError::UnknownReference { device_id, reference, expected }) => {
            assert_eq!(device_id, "bat-1");
            assert_eq!(reference, "inv-9");
            assert_eq!(expected, "inverter");
        }
        other => panic!("expected UnknownReference, got {other:?}"),
    }
}

#[test]
fn test_validation_battery_on_meter_rejected() {
    let yaml = r#"
devices:
  - kind: meter
    id: meter-1
    network_device_id: "dd:ee:ff"
    connection: { host: "10.0.0.8" }
    registers: {}
  - kind: battery
    id: bat-1
    inverter: meter-1
    network_device_id: "dd:ee:ff"
    registers: {}
"#;
    assert!(matches!(
        loader().load_from_str(yaml, ConfigFormat::Yaml),
        Err(ConfigError::UnknownReference { .. })
    ));
}

#[test]
fn test_validation_duplicate_ids_rejected() {
    let yaml = r#"
devices:
  - kind: meter
    id: dup
    network_device_id: "dd:ee:ff"
    connection: { host: "10.0.0.8" }
  - kind: meter
    id: dup
    network_device_id: "dd:ee:fe"
    connection: { host: "10.0.0.9" }
"#;
    assert!(matches!(
        loader().load_from_str(yaml, ConfigFormat::Yaml),
        Err(ConfigError::DuplicateDeviceId { .. })
    ));
}

#[test]
fn test_validation_bad_register_map_rejected() {
    let yaml = r#"
devices:
  - kind: inverter
    id: inv-1
    network_device_id: "aa:bb:cc"
    connection: { host: "10.0.0.7" }
    registers:
      serial_number: { address: 30057, data_type: string }
"#;
    match loader().load_from_str(yaml, ConfigFormat::Yaml) {
        Err(ConfigError::Validation { field, message }) => {
            assert_eq!(field, "devices.inv-1.registers");
            assert!(message.contains("quantity"), "{message}");
        }
        other => panic!("expected a register validation error, got {other:?}"),
    }
}

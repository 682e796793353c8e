// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use anyhow::Context;

use gridlink_config::{DeviceConfig, DeviceKind, GridlinkConfig};

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command on an already loaded configuration.
///
/// Loading runs every structural check, so this only reports a summary and
/// the warnings from [`validation_warnings`].
pub fn validate(cli: &Cli, args: ValidateArgs, config: &GridlinkConfig) -> BinResult<()> {
    let config_path = &cli.config;
    let warnings = validation_warnings(config);

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Site ID: {}", config.site.id);
            if let Some(name) = &config.site.name {
                println!("  Site Name: {}", name);
            }
            println!("  Inverters: {}", config.count(DeviceKind::Inverter));
            println!("  Meters: {}", config.count(DeviceKind::Meter));
            println!("  Batteries: {}", config.count(DeviceKind::Battery));
            println!("  Poll interval: {:?}", config.polling.interval);
            println!("  Resolution: {}", config.polling.resolution);
            println!("  Sink: {:?}", config.telemetry.sink);

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                let rendered = serde_json::to_string_pretty(config)
                    .context("failed to render configuration")?;
                println!();
                println!("Parsed configuration:");
                println!("{}", rendered);
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "site_id": config.site.id,
                    "site_name": config.site.name,
                    "inverters": config.count(DeviceKind::Inverter),
                    "meters": config.count(DeviceKind::Meter),
                    "batteries": config.count(DeviceKind::Battery),
                    "poll_interval_ms": config.polling.interval.as_millis() as u64,
                    "resolution": config.polling.resolution,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output)
                .context("failed to render validation report")?;
            println!("{}", rendered);
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::config(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

/// Non-fatal findings: the configuration loads, but probably not as intended.
pub fn validation_warnings(config: &GridlinkConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.devices.is_empty() {
        warnings.push("No devices configured".to_string());
    }

    for device in &config.devices {
        if let Some(connection) = device.connection() {
            if connection.operation_timeout >= config.polling.interval {
                warnings.push(format!(
                    "Device '{}': operation timeout {:?} is not shorter than the poll interval {:?}",
                    device.id(),
                    connection.operation_timeout,
                    config.polling.interval
                ));
            }
        }

        match device {
            DeviceConfig::Inverter(inverter) if inverter.registers.power.is_none() => {
                warnings.push(format!(
                    "Inverter '{}' maps no power register, production will read as 0",
                    inverter.id
                ));
            }
            DeviceConfig::Meter(meter)
                if meter.registers.grid_power.is_none()
                    && (meter.registers.consumption_power.is_none()
                        || meter.registers.feed_in_power.is_none()) =>
            {
                warnings.push(format!(
                    "Meter '{}' maps neither grid_power nor consumption_power with feed_in_power",
                    meter.id
                ));
            }
            _ => {}
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridlink_config::{ConfigFormat, ConfigLoader};

    fn load(yaml: &str) -> GridlinkConfig {
        ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(yaml, ConfigFormat::Yaml)
            .unwrap()
    }

    #[test]
    fn test_warns_without_devices() {
        let warnings = validation_warnings(&GridlinkConfig::default());
        assert_eq!(warnings, vec!["No devices configured".to_string()]);
    }

    #[test]
    fn test_warns_on_slow_timeout_and_missing_power() {
        let config = load(
            r#"
polling: { interval: 2s }
devices:
  - kind: inverter
    id: inv-1
    network_device_id: "aa:bb:cc"
    connection: { host: "10.0.0.7", timeout: 5s }
    registers:
      total_energy: { address: 30529, data_type: uint32 }
"#,
        );
        let warnings = validation_warnings(&config);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("operation timeout"));
        assert!(warnings[1].contains("no power register"));
    }

    #[test]
    fn test_meter_with_split_power_is_fine() {
        let config = load(
            r#"
devices:
  - kind: meter
    id: meter-1
    network_device_id: "dd:ee:ff"
    connection: { host: "10.0.0.8", timeout: 1s }
    registers:
      consumption_power: { address: 30865, data_type: uint32 }
      feed_in_power: { address: 30867, data_type: uint32 }
"#,
        );
        assert!(validation_warnings(&config).is_empty());
    }
}

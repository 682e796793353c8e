// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gridlink-config
//!
//! Configuration management for gridlink.
//!
//! ## Features
//!
//! - **Schema Definition**: site, polling, health thresholds, reconnect
//!   backoff, telemetry sink, logging and per-device register maps
//! - **Multi-Format Support**: YAML, TOML, and JSON configuration files
//! - **Environment Resolution**: `${VAR:default}` placeholders and
//!   `GRIDLINK_*` overrides
//! - **Validation**: unique device ids, battery to inverter references and
//!   register map rules, checked before any device is built
//!
//! ## Quick Start
//!
//! ```no_run
//! use gridlink_config::loader::load_config;
//!
//! let config = load_config("gridlink.yaml").unwrap();
//! println!("Site: {}", config.site.id);
//! println!("Devices: {}", config.devices.len());
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, load_config_str, ConfigFormat, ConfigLoader};
pub use schema::{
    BatteryDeviceConfig, DeviceConfig, DeviceKind, GridlinkConfig, InverterDeviceConfig, LogFormat,
    LogLevel, LoggingConfig, MeterDeviceConfig, PollingConfig, SinkKind, SiteConfig, TelemetryConfig,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

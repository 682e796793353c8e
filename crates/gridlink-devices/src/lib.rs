// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gridlink-devices
//!
//! Inverter, meter and battery drivers built on register maps.
//!
//! Each driver owns a register layout, opens (or borrows) a [`DeviceLink`],
//! discovers metadata once per connection, keeps an appliance record in sync
//! with an [`ApplianceStore`], and turns every poll into one
//! [`TelemetryMessage`].
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │InverterDriver│   │ MeterDriver  │   │BatteryDriver │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │ owns             │ owns             │ borrows (Arc)
//!        ▼                  ▼                  │
//! ┌──────────────┐   ┌──────────────┐          │
//! │  DeviceLink  │◀──┼──────────────┼──────────┘
//! └──────────────┘   │  DeviceLink  │
//!                    └──────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod appliance;
pub mod battery;
pub mod driver;
pub mod error;
pub mod inverter;
pub mod link;
pub mod meter;
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use appliance::{
    find_matching, sync_appliance, Appliance, ApplianceDetails, ApplianceDraft, ApplianceId,
    ApplianceKind, ApplianceStore, BatteryMetadata, InMemoryApplianceStore, InverterMetadata,
};
pub use battery::{BatteryDriver, BatteryRegisters};
pub use driver::{DeviceDriver, DeviceIdentity, DeviceState, DriverContext};
pub use error::{DeviceError, DeviceResult, SinkError, StoreError};
pub use inverter::{InverterDriver, InverterRegisters};
pub use link::DeviceLink;
pub use meter::{MeterDriver, MeterRegisters};
pub use telemetry::{
    BatteryState, BatteryTelemetry, BroadcastSink, InverterState, InverterTelemetry, LoggingSink,
    MeterTelemetry, StringReading, TelemetryMessage, TelemetrySink, DEFAULT_RESOLUTION,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gridlink-modbus
//!
//! Register-mapped telemetry engine for Modbus TCP devices.
//!
//! This crate turns raw holding registers into typed, validated values:
//!
//! - **Register descriptors**: address, data type, scale, quantity, value mapping
//! - **Data conversion**: big-endian decoding, decimal scaling, sentinel detection
//! - **Link health**: consecutive failures and recency of the last success
//! - **Fault-tolerant reads**: transport errors become values, never panics
//! - **Register mapper**: whole-map reads with required/optional policy
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 Device drivers (gridlink-devices)               │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ RegisterMap
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       RegisterMapper                            │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ RegisterDescriptor
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            FaultTolerantReader  ──▶  ConnectionHealth           │
//! └─────────────────────────────────────────────────────────────────┘
//!                              │ address, quantity
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │          dyn RegisterTransport (ModbusTcpTransport)             │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gridlink_modbus::client::{ConnectionHealth, FaultTolerantReader, TcpConnector, TransportConnector};
//! use gridlink_modbus::{DataType, ModbusTcpConfig, RegisterDescriptor, RegisterMap, RegisterMapper};
//!
//! let config = ModbusTcpConfig::builder().host("192.168.1.50").unit_id(3).build()?;
//! let transport = TcpConnector.connect(&config).await?;
//! let reader = FaultTolerantReader::new(transport, ConnectionHealth::shared(Default::default()), "inverter");
//!
//! let mut map = RegisterMap::new();
//! map.insert("power", RegisterDescriptor::new(30775, DataType::Int32));
//! let readings = RegisterMapper::read_multiple_registers(&reader, &map).await;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod client;
pub mod error;
pub mod mapper;
pub mod types;

// =============================================================================
// Re-exports - Error Module
// =============================================================================

pub use error::{
    // Main error type
    ModbusError,
    ModbusResult,
    // Error categories
    ConfigurationError,
    ConnectionError,
    ConversionError,
    ProtocolError,
    TimeoutError,
    // Read outcomes
    ReadError,
    ReadResult,
};

// =============================================================================
// Re-exports - Types Module
// =============================================================================

pub use types::{
    DataType,
    ModbusTcpConfig,
    ModbusTcpConfigBuilder,
    RegisterDescriptor,
    RegisterMap,
    ValueMapping,
};

// =============================================================================
// Re-exports - Client & Mapper
// =============================================================================

pub use client::{
    ConnectionHealth,
    DataConverter,
    FaultTolerantReader,
    HealthThresholds,
    RegisterTransport,
    RegisterValue,
    SharedHealth,
    TransportConnector,
};

pub use mapper::{validate_register_map, RegisterMapper, RegisterReadings, ValidationReport};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gridlink Integration Tests
//!
//! Shared mocks and fixtures plus the cross-crate test suites.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gridlink-tests
//! cargo test -p gridlink-tests --test integration_devices
//! ```
//!
//! ## Test Categories
//!
//! ### Modbus Tests (`integration_modbus.rs`)
//! - Fault-tolerant reads and health tracking
//! - Register mapping with required and optional fields
//!
//! ### Device Tests (`integration_devices.rs`)
//! - Inverter, meter and battery drivers against a scripted transport
//! - Appliance discovery and rediscovery
//!
//! ### Config Tests (`integration_config.rs`)
//! - Loading files in every format
//! - Reference and duplicate validation
//!
//! ### Runtime Tests (`integration_runtime.rs`)
//! - Single-pass polling and the poll loop with a mock connector

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod common;

/// Re-export commonly used items for convenience.
pub mod prelude {
    pub use crate::common::fixtures::*;
    pub use crate::common::init_test_logging;
    pub use crate::common::mocks::*;
}

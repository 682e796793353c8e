// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # gridlink-bin
//!
//! CLI binary for gridlink.
//!
//! - CLI argument parsing with clap
//! - Polling runtime with one task per device
//! - Graceful shutdown handling
//! - Logging initialization
//! - Command implementations (run, validate, version)
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────┐
//!                    │   main.rs   │
//!                    └──────┬──────┘
//!                    ┌──────▼──────┐
//!                    │   cli.rs    │
//!                    └──────┬──────┘
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └──────────┘ └────┬─────┘ └──────────┘
//!                    ┌─────▼───────┐
//!                    │  shutdown   │
//!                    └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Poll every device (default command)
//! gridlink -c /etc/gridlink/site.yaml
//!
//! # Poll once and print the records as JSON lines
//! gridlink run --once
//!
//! # Validate configuration
//! gridlink validate --strict
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::init_logging;
pub use runtime::{build_drivers, poll_device, GridlinkRuntime, RuntimeBuilder};
pub use shutdown::{ShutdownCoordinator, ShutdownToken};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! `gridlink version`.

use crate::cli::Cli;
use crate::error::BinResult;

/// Prints the version of each gridlink crate and the build target.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("{} {}", crate::NAME, crate::VERSION);
    println!();
    for (component, version) in [
        ("gridlink-modbus", gridlink_modbus::VERSION),
        ("gridlink-devices", gridlink_devices::VERSION),
        ("gridlink-config", gridlink_config::VERSION),
    ] {
        println!("  {component:<18}{version}");
    }
    println!();
    println!(
        "  target            {}-{}",
        std::env::consts::ARCH,
        std::env::consts::OS
    );

    Ok(())
}

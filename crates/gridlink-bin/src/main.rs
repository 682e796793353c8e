// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! gridlink - register-mapped Modbus telemetry.

use gridlink_bin::cli::Cli;
use gridlink_bin::commands::execute;
use gridlink_bin::error::report_error_and_exit;

#[tokio::main]
async fn main() {
    if let Err(error) = execute(Cli::parse_args()).await {
        report_error_and_exit(error);
    }
}

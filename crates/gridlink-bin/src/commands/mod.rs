// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Poll the configured devices
//! - `validate`: Validate configuration file
//! - `version`: Show version information

mod run;
mod validate;
mod version;

pub use run::run;
pub use validate::{validate, validation_warnings};
pub use version::version;

use gridlink_config::{load_config, GridlinkConfig};

use crate::cli::{Cli, Commands};
use crate::error::{BinError, BinResult};
use crate::logging::init_logging;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => {
            let config = load(&cli)?;
            run::run(&cli, args, config).await
        }
        Commands::Validate(args) => {
            let config = load(&cli)?;
            validate::validate(&cli, args, &config)
        }
        Commands::Version => version::version(&cli),
    }
}

/// Loads the configuration, then installs logging from it and the CLI overrides.
fn load(cli: &Cli) -> BinResult<GridlinkConfig> {
    let config = load_config(&cli.config).map_err(|e| {
        BinError::from(e).with_context(format!("failed to load {}", cli.config.display()))
    })?;

    init_logging(
        &cli.effective_log_level(config.logging.level),
        cli.effective_log_format(config.logging.format),
    )?;

    Ok(config)
}

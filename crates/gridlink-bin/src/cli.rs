// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Command line surface of `gridlink`.
//!
//! `run` is the default subcommand. Global flags override the `logging`
//! section of the site file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use gridlink_config::{LogFormat, LogLevel, SinkKind};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// gridlink - register-mapped telemetry for Modbus inverters, meters and batteries
#[derive(Parser, Debug)]
#[command(
    name = "gridlink",
    author = "Sylvex <contact@sylvex.io>",
    version = crate::VERSION,
    about = "Register-mapped telemetry for Modbus inverters, meters and batteries",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Site file (YAML, TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "gridlink.yaml",
        env = "GRIDLINK_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormatArg>,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand; `run` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// `gridlink` subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll every configured device until SIGINT or SIGTERM
    Run(RunArgs),

    /// Check the site file and every register map without connecting
    Validate(ValidateArgs),

    /// Print component versions
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// `gridlink run` flags.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Connect, poll every device once, print the records and exit
    #[arg(long)]
    pub once: bool,

    /// Telemetry sink; overrides the config file
    #[arg(long)]
    pub sink: Option<SinkArg>,
}

/// `gridlink validate` flags.
#[derive(Args, Debug, Clone, Default)]
pub struct ValidateArgs {
    /// Print the resolved configuration after the summary
    #[arg(short, long)]
    pub show_config: bool,

    /// Summary format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,

    /// Fail on warnings too
    #[arg(long)]
    pub strict: bool,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable text format
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
            LogFormatArg::Compact => LogFormat::Compact,
        }
    }
}

/// Telemetry sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SinkArg {
    /// Structured log events
    Log,
    /// In-process broadcast channel
    Broadcast,
}

impl From<SinkArg> for SinkKind {
    fn from(arg: SinkArg) -> Self {
        match arg {
            SinkArg::Log => SinkKind::Log,
            SinkArg::Broadcast => SinkKind::Broadcast,
        }
    }
}

/// Format of `validate` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Plain text
    #[default]
    Text,
    /// One JSON document
    Json,
}

impl Cli {
    /// Parses `std::env::args`.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The subcommand to execute, `run` when none was given.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Resolves the log level: flags, then `--log-level`, then the config file.
    pub fn effective_log_level(&self, configured: LogLevel) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.as_str().to_string())
        }
    }

    /// Resolves the log format: `--log-format`, then the config file.
    pub fn effective_log_format(&self, configured: LogFormat) -> LogFormat {
        self.log_format.map(LogFormat::from).unwrap_or(configured)
    }
}

// =============================================================================
// Tests
// =============================================================================

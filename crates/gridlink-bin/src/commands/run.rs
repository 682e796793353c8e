// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use gridlink_config::{GridlinkConfig, SinkKind};
use gridlink_devices::{BroadcastSink, TelemetryMessage};

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Executes the `run` command.
///
/// With `--once` every device is polled a single time and the records are
/// printed as JSON lines. Otherwise a broadcast sink gets a subscriber that
/// prints every record it carries as a JSON line.
pub async fn run(_cli: &Cli, args: RunArgs, config: GridlinkConfig) -> BinResult<()> {
    let sink_kind = args.sink.map(SinkKind::from).unwrap_or(config.telemetry.sink);
    let mut builder = RuntimeBuilder::new().sink_kind(sink_kind);

    if sink_kind == SinkKind::Broadcast && !args.once {
        let sink = Arc::new(BroadcastSink::new(config.telemetry.channel_capacity));
        let mut receiver = sink.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(record) => print_record(&record),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Telemetry printer lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        builder = builder.sink(sink);
    }

    let runtime = builder.config(config).build()?;

    if args.once {
        info!("Polling every device once");
        let records = runtime.run_once().await?;
        records.iter().for_each(print_record);
        return Ok(());
    }

    runtime.run().await
}

fn print_record(record: &TelemetryMessage) {
    match serde_json::to_string(record) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "Failed to serialize telemetry record"),
    }
}

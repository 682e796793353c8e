// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Fault-tolerant register reads.
//!
//! [`FaultTolerantReader`] is the boundary between a raw transport that can
//! fail in any number of ways and the register mapper, which only ever sees a
//! [`ReadResult`]. Every transport call updates the shared
//! [`ConnectionHealth`](super::ConnectionHealth) of the link.

use std::sync::Arc;

use crate::error::{ReadError, ReadResult};

use super::conversion::registers_to_bytes;
use super::health::SharedHealth;
use super::transport::RegisterTransport;

/// Reads registers through a transport and records every outcome.
#[derive(Clone)]
pub struct FaultTolerantReader {
    transport: Arc<dyn RegisterTransport>,
    health: SharedHealth,
    label: String,
}

impl FaultTolerantReader {
    /// Creates a reader for one link. `label` names the device in logs.
    pub fn new(
        transport: Arc<dyn RegisterTransport>,
        health: SharedHealth,
        label: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            health,
            label: label.into(),
        }
    }

    /// Returns the device label used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Reads `quantity` holding registers and returns them as big-endian bytes.
    ///
    /// Never fails with anything but a [`ReadError`]; a failed call is logged
    /// at warn level with the link's consecutive failure count.
    pub async fn read_holding_registers(&self, address: u16, quantity: u16) -> ReadResult<Vec<u8>> {
        match self.transport.read_holding_registers(address, quantity).await {
            Ok(registers) => {
                self.health.lock().record_success();
                Ok(registers_to_bytes(&registers))
            }
            Err(error) => {
                let consecutive_failures = {
                    let mut health = self.health.lock();
                    health.record_failure(&error);
                    health.consecutive_failures()
                };

                tracing::warn!(
                    device = %self.label,
                    address = address,
                    quantity = quantity,
                    consecutive_failures = consecutive_failures,
                    category = error.category(),
                    error = %error,
                    "Register read failed"
                );

                Err(ReadError::Transport {
                    address,
                    quantity,
                    consecutive_failures,
                    source: error,
                })
            }
        }
    }

    /// Input registers are not offered by the transport contract.
    ///
    /// Always returns [`ReadError::NotSupported`] without touching the link.
    pub async fn read_input_registers(&self, address: u16, _quantity: u16) -> ReadResult<Vec<u8>> {
        tracing::debug!(device = %self.label, address = address, "Input register read requested");
        Err(ReadError::not_supported("read_input_registers", address))
    }

    /// Delegates to the shared health tracker.
    pub fn is_healthy(&self) -> bool {
        self.health.lock().is_healthy()
    }

    /// Returns the shared health tracker.
    pub fn health(&self) -> &SharedHealth {
        &self.health
    }
}

impl std::fmt::Debug for FaultTolerantReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultTolerantReader")
            .field("label", &self.label)
            .field("transport", &self.transport.display_name())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

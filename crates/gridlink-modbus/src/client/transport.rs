// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Raw transport contract.
//!
//! A [`TransportConnector`] opens a link and hands back a shared
//! [`RegisterTransport`] handle. The handle only knows how to move registers;
//! health tracking and error conversion live in
//! [`FaultTolerantReader`](super::FaultTolerantReader).
//!
//! Input registers are deliberately absent from the contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ModbusResult;
use crate::types::ModbusTcpConfig;

// =============================================================================
// RegisterTransport Trait
// =============================================================================

/// An open link that can read holding registers.
///
/// Implementations must be `Send + Sync`: one handle is shared between an
/// inverter and the battery attached to it.
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    /// Reads `count` holding registers starting at `address`.
    async fn read_holding_registers(&self, address: u16, count: u16) -> ModbusResult<Vec<u16>>;

    /// Closes the link. Later reads fail with a not-connected error.
    async fn disconnect(&self) -> ModbusResult<()>;

    /// Returns a human-readable endpoint description for logs.
    fn display_name(&self) -> String;
}

// =============================================================================
// TransportConnector Trait
// =============================================================================

/// Opens transport handles.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Opens a link using the given connection parameters.
    ///
    /// # Errors
    ///
    /// Returns a connection, timeout or configuration error. The connector
    /// never retries; the caller owns the retry policy.
    async fn connect(&self, config: &ModbusTcpConfig) -> ModbusResult<Arc<dyn RegisterTransport>>;
}

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! A device's transport handle and its health tracker.
//!
//! A link is owned by one driver and may be shared with dependents through an
//! `Arc` (a battery reads through its inverter's link). Opening a link always
//! closes the previous handle first, so at most one transport is live.
//!
//! The owner marks the link ready once its own connect has finished.
//! Dependents check [`DeviceLink::is_ready`], not [`DeviceLink::is_connected`],
//! so they never start on a link whose owner is still connecting.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use gridlink_modbus::client::HealthSnapshot;
use gridlink_modbus::{
    ConnectionHealth, FaultTolerantReader, HealthThresholds, ModbusResult,
    ModbusTcpConfig, RegisterTransport, SharedHealth, TransportConnector,
};

/// Transport slot plus health for one Modbus TCP endpoint.
pub struct DeviceLink {
    name: String,
    config: ModbusTcpConfig,
    connector: Arc<dyn TransportConnector>,
    transport: RwLock<Option<Arc<dyn RegisterTransport>>>,
    health: SharedHealth,
    ready: AtomicBool,
}

impl DeviceLink {
    /// Creates a closed link.
    pub fn new(
        name: impl Into<String>,
        config: ModbusTcpConfig,
        connector: Arc<dyn TransportConnector>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            connector,
            transport: RwLock::new(None),
            health: ConnectionHealth::shared(thresholds),
            ready: AtomicBool::new(false),
        }
    }

    /// Returns the name of the owning device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the endpoint settings.
    pub fn config(&self) -> &ModbusTcpConfig {
        &self.config
    }

    /// Opens a fresh transport, replacing any previous one.
    ///
    /// Health is reset on success so the new handle starts healthy.
    pub async fn open(&self) -> ModbusResult<()> {
        self.close().await;

        tracing::debug!(device = %self.name, endpoint = %self.config.socket_addr(), "Opening link");
        let transport = self.connector.connect(&self.config).await?;

        self.health.lock().reset();
        *self.transport.write() = Some(transport);

        tracing::info!(device = %self.name, endpoint = %self.config.socket_addr(), "Link open");
        Ok(())
    }

    /// Closes the current transport, if any. Close errors are logged and dropped.
    pub async fn close(&self) {
        self.ready.store(false, Ordering::SeqCst);
        let previous = self.transport.write().take();
        let Some(transport) = previous else {
            return;
        };

        match transport.disconnect().await {
            Ok(()) => tracing::debug!(device = %self.name, "Link closed"),
            Err(e) => tracing::warn!(device = %self.name, error = %e, "Error while closing link"),
        }
    }

    /// Returns `true` if a transport handle is held.
    pub fn is_open(&self) -> bool {
        self.transport.read().is_some()
    }

    /// Returns `true` if a handle is held and the link is healthy.
    pub fn is_connected(&self) -> bool {
        self.is_open() && self.health.lock().is_healthy()
    }

    /// Marks the owner as connected. Cleared again by [`close`](Self::close).
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once the owner has connected and the link is still usable.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && self.is_connected()
    }

    /// Returns a reader over the current handle, or `None` when closed.
    pub fn reader(&self) -> Option<FaultTolerantReader> {
        let transport = self.transport.read().clone()?;
        Some(FaultTolerantReader::new(
            transport,
            Arc::clone(&self.health),
            self.name.clone(),
        ))
    }

    /// Returns the shared health tracker.
    pub fn health(&self) -> &SharedHealth {
        &self.health
    }

    /// Returns a point-in-time health view.
    pub fn health_snapshot(&self) -> HealthSnapshot {
        self.health.lock().snapshot()
    }
}

impl fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceLink")
            .field("name", &self.name)
            .field("endpoint", &self.config.socket_addr())
            .field("open", &self.is_open())
            .field("ready", &self.ready.load(Ordering::SeqCst))
            .finish()
    }
}

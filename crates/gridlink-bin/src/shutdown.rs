// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! The coordinator listens for OS signals and fans a single shutdown
//! notification out to every device poller. Each poller holds a
//! [`ShutdownToken`] and selects on [`ShutdownToken::cancelled`] next to its
//! tick and reconnect timers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use crate::error::{BinError, BinResult};

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Owner of the stop signal shared by the device pollers.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Coordinator that has not fired yet.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raw receiver that yields once when shutdown starts.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Token for one poller task.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            shutdown_initiated: self.shutdown_initiated.clone(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Fires the stop signal. Later calls do nothing.
    pub fn initiate_shutdown(&self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Stopping device pollers");
            let _ = self.sender.send(());
        }
    }

    /// Returns true once the stop signal has fired.
    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Waits for SIGTERM or SIGINT (Ctrl+C elsewhere), then initiates shutdown.
    ///
    /// Returns immediately if shutdown was already initiated.
    ///
    /// # Errors
    ///
    /// Fails if the signal handlers cannot be registered.
    pub async fn wait_for_signal(&self) -> BinResult<()> {
        let mut manual = self.subscribe();
        if self.is_shutdown_initiated() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| BinError::init(format!("failed to register SIGTERM handler: {e}")))?;
            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| BinError::init(format!("failed to register SIGINT handler: {e}")))?;

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
                _ = manual.recv() => return Ok(()),
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.map_err(|e| BinError::init(format!("failed to register Ctrl+C handler: {e}")))?;
                    info!("Received Ctrl+C");
                }
                _ = manual.recv() => return Ok(()),
            }
        }

        self.initiate_shutdown();
        Ok(())
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ShutdownToken
// =============================================================================

/// Per-task handle on the shutdown notification.
pub struct ShutdownToken {
    shutdown_initiated: Arc<AtomicBool>,
    receiver: broadcast::Receiver<()>,
}

impl ShutdownToken {
    /// Returns true once the stop signal has fired.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_initiated.load(Ordering::SeqCst)
    }

    /// Resolves once shutdown has been requested.
    ///
    /// Cancel safe, so it can sit in a `select!` loop.
    pub async fn cancelled(&mut self) {
        if self.is_shutdown_requested() {
            return;
        }
        // A closed or lagged channel also means the coordinator is gone or fired.
        let _ = self.receiver.recv().await;
    }
}

impl Clone for ShutdownToken {
    fn clone(&self) -> Self {
        Self {
            shutdown_initiated: self.shutdown_initiated.clone(),
            receiver: self.receiver.resubscribe(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Connection health tracking for one physical Modbus link.
//!
//! Health is derived, never stored:
//!
//! ```text
//!                 record_failure() × N
//!   ┌─────────┐ ─────────────────────────▶ ┌───────────┐
//!   │ Healthy │                            │ Unhealthy │
//!   └─────────┘ ◀───────────────────────── └───────────┘
//!                    record_success()
//!
//! healthy = consecutive_failures < max_consecutive_failures
//!           AND now - last_success < stale_after
//! ```
//!
//! Both transitions are always accepted. A link that keeps answering with
//! errors turns unhealthy by failure count; a link that silently stops being
//! polled turns unhealthy by staleness.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Failures in a row after which a link is unhealthy.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Time since the last success after which a link is stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);

/// Health tracker shared between the drivers of one physical link.
pub type SharedHealth = Arc<Mutex<ConnectionHealth>>;

// =============================================================================
// HealthThresholds
// =============================================================================

/// Limits that decide when a link is unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Consecutive failures tolerated before the link is unhealthy.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Maximum age of the last successful read.
    #[serde(default = "default_stale_after")]
    #[serde(with = "humantime_serde")]
    pub stale_after: Duration,
}

fn default_max_consecutive_failures() -> u32 {
    DEFAULT_MAX_CONSECUTIVE_FAILURES
}

fn default_stale_after() -> Duration {
    DEFAULT_STALE_AFTER
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

// =============================================================================
// ConnectionHealth
// =============================================================================

/// Consecutive failures and recency of the last success of one link.
#[derive(Debug, Clone)]
pub struct ConnectionHealth {
    consecutive_failures: u32,
    last_error: Option<String>,
    last_success: Instant,
    last_success_at: DateTime<Utc>,
    thresholds: HealthThresholds,
}

impl ConnectionHealth {
    /// Creates a tracker for a freshly established link.
    pub fn new(thresholds: HealthThresholds) -> Self {
        Self {
            consecutive_failures: 0,
            last_error: None,
            last_success: Instant::now(),
            last_success_at: Utc::now(),
            thresholds,
        }
    }

    /// Wraps a new tracker for sharing.
    pub fn shared(thresholds: HealthThresholds) -> SharedHealth {
        Arc::new(Mutex::new(Self::new(thresholds)))
    }

    /// Records a successful transport call.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_success = Instant::now();
        self.last_success_at = Utc::now();
    }

    /// Records a failed transport call. The success timestamp is untouched.
    pub fn record_failure(&mut self, error: &dyn fmt::Display) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_error = Some(error.to_string());
    }

    /// Returns `true` if the link is usable right now.
    pub fn is_healthy(&self) -> bool {
        self.is_healthy_at(Instant::now())
    }

    /// Returns `true` if the link is usable at `now`.
    pub fn is_healthy_at(&self, now: Instant) -> bool {
        self.consecutive_failures < self.thresholds.max_consecutive_failures
            && !self.is_stale_at(now)
    }

    /// Returns `true` if the last success is older than the stale threshold.
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    /// Returns `true` if the last success is older than the stale threshold at `now`.
    pub fn is_stale_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_success) >= self.thresholds.stale_after
    }

    /// Returns the current number of failures in a row.
    #[inline]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Returns the message of the most recent failure since the last success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Returns the monotonic time of the last success.
    pub fn last_success(&self) -> Instant {
        self.last_success
    }

    /// Returns the thresholds in effect.
    pub fn thresholds(&self) -> HealthThresholds {
        self.thresholds
    }

    /// Starts over as if the link had just been established.
    pub fn reset(&mut self) {
        *self = Self::new(self.thresholds);
    }

    /// Returns a serializable view for status reporting.
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            healthy: self.is_healthy(),
            stale: self.is_stale(),
            consecutive_failures: self.consecutive_failures,
            last_error: self.last_error.clone(),
            last_success_at: self.last_success_at,
        }
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new(HealthThresholds::default())
    }
}

/// Point-in-time view of a link's health.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    /// Derived health.
    pub healthy: bool,
    /// Whether the last success is too old.
    pub stale: bool,
    /// Failures in a row.
    pub consecutive_failures: u32,
    /// Latest failure message.
    pub last_error: Option<String>,
    /// Wall-clock time of the last success.
    pub last_success_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================

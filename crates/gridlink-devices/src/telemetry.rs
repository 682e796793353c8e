// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Telemetry records and the sinks they are published to.
//!
//! Every `update_data()` call yields exactly one [`TelemetryMessage`]. The
//! poll loop collects them and hands them to a [`TelemetrySink`].
//!
//! ```text
//! driver.update_data() ──▶ TelemetryMessage ──▶ TelemetrySink
//!                                                  ├── BroadcastSink (tokio broadcast, 1:N)
//!                                                  └── LoggingSink   (structured tracing events)
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use gridlink_modbus::{RegisterDescriptor, RegisterReadings};

use crate::appliance::{ApplianceId, ApplianceKind};
use crate::error::SinkError;

/// Nominal resolution attached to records when none is configured.
pub const DEFAULT_RESOLUTION: &str = "10s";

// =============================================================================
// Device States
// =============================================================================

/// Operating state of an inverter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InverterState {
    /// Switched off.
    Off,
    /// Idle, waiting for irradiance.
    Standby,
    /// Starting up.
    Starting,
    /// Producing, tracking the maximum power point.
    Mppt,
    /// Producing with reduced output.
    Throttled,
    /// Shutting down.
    ShuttingDown,
    /// Fault condition.
    Fault,
    /// State could not be read or mapped.
    #[default]
    Unknown,
}

impl InverterState {
    const NAMES: [(&'static str, InverterState); 8] = [
        ("off", Self::Off),
        ("standby", Self::Standby),
        ("starting", Self::Starting),
        ("mppt", Self::Mppt),
        ("throttled", Self::Throttled),
        ("shutting_down", Self::ShuttingDown),
        ("fault", Self::Fault),
        ("unknown", Self::Unknown),
    ];
}

/// Operating state of a battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryState {
    /// Switched off.
    Off,
    /// Idle.
    Standby,
    /// Charging.
    Charging,
    /// Discharging.
    Discharging,
    /// Fault condition.
    Fault,
    /// State could not be read or mapped.
    #[default]
    Unknown,
}

impl BatteryState {
    const NAMES: [(&'static str, BatteryState); 6] = [
        ("off", Self::Off),
        ("standby", Self::Standby),
        ("charging", Self::Charging),
        ("discharging", Self::Discharging),
        ("fault", Self::Fault),
        ("unknown", Self::Unknown),
    ];
}

/// Error returned when a mapped state name is not a known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStateName(pub String);

impl fmt::Display for UnknownStateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown state name '{}'", self.0)
    }
}

impl std::error::Error for UnknownStateName {}

macro_rules! impl_state_names {
    ($ty:ty) => {
        impl FromStr for $ty {
            type Err = UnknownStateName;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let lowered = s.trim().to_ascii_lowercase();
                Self::NAMES
                    .iter()
                    .find(|(name, _)| *name == lowered)
                    .map(|(_, state)| *state)
                    .ok_or_else(|| UnknownStateName(s.to_string()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = Self::NAMES
                    .iter()
                    .find(|(_, state)| state == self)
                    .map_or("unknown", |(name, _)| *name);
                f.write_str(name)
            }
        }
    };
}

impl_state_names!(InverterState);
impl_state_names!(BatteryState);

/// Resolves a state field through its descriptor's value mapping.
///
/// A missing descriptor or an unreadable register gives the default
/// (`Unknown`) silently. A readable value without a mapping entry gives the
/// default with a warning.
pub fn map_state<S>(
    device: &str,
    field: &str,
    descriptor: Option<&RegisterDescriptor>,
    readings: &RegisterReadings,
) -> S
where
    S: FromStr + Default,
{
    let Some(descriptor) = descriptor else {
        return S::default();
    };
    let Some(raw) = readings.get(field).and_then(|v| v.as_i64()) else {
        return S::default();
    };

    match descriptor.map_value(raw) {
        Some(name) => name.parse().unwrap_or_else(|_| {
            tracing::warn!(
                device = device,
                field = field,
                state = name,
                "Mapped state is not a known state"
            );
            S::default()
        }),
        None => {
            tracing::warn!(
                device = device,
                field = field,
                address = descriptor.address,
                raw_value = raw,
                "No state mapping for raw value"
            );
            S::default()
        }
    }
}

/// Returns an error per mapping entry whose state name does not parse as `S`.
pub fn invalid_state_names<S: FromStr>(field: &str, descriptor: Option<&RegisterDescriptor>) -> Vec<String> {
    descriptor
        .map(|d| {
            d.value_mapping
                .iter()
                .filter(|m| m.mapped_state.parse::<S>().is_err())
                .map(|m| format!("{field}: unknown state name '{}' for raw value {}", m.mapped_state, m.raw_value))
                .collect()
        })
        .unwrap_or_default()
}

// =============================================================================
// Telemetry Records
// =============================================================================

/// Power and voltage of one PV string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringReading {
    /// String number, 1-based.
    pub index: u8,
    /// Power in watts.
    pub power_w: Option<f64>,
    /// Voltage in volts.
    pub voltage: Option<f64>,
}

/// One inverter poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InverterTelemetry {
    /// Appliance the reading belongs to.
    pub appliance_id: ApplianceId,
    /// Time of the poll.
    pub timestamp: DateTime<Utc>,
    /// Nominal resolution of the reading.
    pub resolution: String,
    /// PV production in watts; 0 when unreadable.
    pub pv_power_w: f64,
    /// Operating state.
    pub state: InverterState,
    /// Lifetime production in watt-hours.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_energy_wh: Option<f64>,
    /// Strings with at least one readable value.
    pub strings: Vec<StringReading>,
}

/// One meter poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterTelemetry {
    /// Appliance the reading belongs to.
    pub appliance_id: ApplianceId,
    /// Time of the poll.
    pub timestamp: DateTime<Utc>,
    /// Nominal resolution of the reading.
    pub resolution: String,
    /// Grid power in watts, positive when importing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_power_w: Option<f64>,
    /// Imported energy in watt-hours; 0 when unreadable.
    pub energy_import_wh: f64,
    /// Exported energy in watt-hours; 0 when unreadable.
    pub energy_export_wh: f64,
}

/// One battery poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatteryTelemetry {
    /// Appliance the reading belongs to.
    pub appliance_id: ApplianceId,
    /// Time of the poll.
    pub timestamp: DateTime<Utc>,
    /// Nominal resolution of the reading.
    pub resolution: String,
    /// State of charge in percent; 0 when unreadable.
    pub soc_percent: f64,
    /// Battery power in watts, positive when discharging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_w: Option<f64>,
    /// Operating state.
    pub state: BatteryState,
}

/// A telemetry record, tagged by appliance kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryMessage {
    /// Inverter reading.
    Inverter(InverterTelemetry),
    /// Meter reading.
    Meter(MeterTelemetry),
    /// Battery reading.
    Battery(BatteryTelemetry),
}

impl TelemetryMessage {
    /// Returns the appliance kind of this record.
    pub fn kind(&self) -> ApplianceKind {
        match self {
            Self::Inverter(_) => ApplianceKind::Inverter,
            Self::Meter(_) => ApplianceKind::Meter,
            Self::Battery(_) => ApplianceKind::Battery,
        }
    }

    /// Returns the appliance the record belongs to.
    pub fn appliance_id(&self) -> &ApplianceId {
        match self {
            Self::Inverter(t) => &t.appliance_id,
            Self::Meter(t) => &t.appliance_id,
            Self::Battery(t) => &t.appliance_id,
        }
    }

    /// Returns the time of the poll.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::Inverter(t) => t.timestamp,
            Self::Meter(t) => t.timestamp,
            Self::Battery(t) => t.timestamp,
        }
    }
}

// =============================================================================
// TelemetrySink
// =============================================================================

/// Destination of telemetry records.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Publishes the records of one poll round.
    ///
    /// Returns the number of consumers that received them.
    async fn publish(&self, records: Vec<TelemetryMessage>) -> Result<usize, SinkError>;
}

/// Fans records out to every subscriber of a tokio broadcast channel.
pub struct BroadcastSink {
    sender: broadcast::Sender<TelemetryMessage>,
    capacity: usize,
}

impl BroadcastSink {
    /// Creates a sink buffering up to `capacity` records per slow subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    /// Creates a new subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryMessage> {
        self.sender.subscribe()
    }

    /// Returns the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl TelemetrySink for BroadcastSink {
    async fn publish(&self, records: Vec<TelemetryMessage>) -> Result<usize, SinkError> {
        let mut receivers = 0;
        for record in records {
            // No receivers is not an error for a pub/sub channel
            receivers = self.sender.send(record).unwrap_or(0);
        }
        Ok(receivers)
    }
}

impl fmt::Debug for BroadcastSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastSink")
            .field("capacity", &self.capacity)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Emits every record as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

#[async_trait]
impl TelemetrySink for LoggingSink {
    async fn publish(&self, records: Vec<TelemetryMessage>) -> Result<usize, SinkError> {
        for record in &records {
            let payload = serde_json::to_string(record)
                .map_err(|e| SinkError::Rejected(e.to_string()))?;
            tracing::info!(
                kind = %record.kind(),
                appliance_id = %record.appliance_id(),
                telemetry = %payload,
                "Telemetry"
            );
        }
        Ok(1)
    }
}

// =============================================================================
// Tests
// =============================================================================

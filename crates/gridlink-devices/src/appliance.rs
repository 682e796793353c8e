// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Appliance records and the store they live in.
//!
//! The authoritative copy of an appliance belongs to an external store.
//! Drivers only keep the last instance they wrote. On connect a driver
//! builds an [`ApplianceDraft`] and calls [`sync_appliance`], which either
//! updates the matching record in place or creates a new one.
//!
//! # Matching
//!
//! Matchers are tried in table order; the first matcher that finds a record
//! of the same kind wins.
//!
//! ```text
//! ┌─────────────────┬──────────────────────────────────────────────┐
//! │ network_device  │ shares a network device id with the draft    │
//! │ serial_number   │ same serial number as the draft              │
//! └─────────────────┴──────────────────────────────────────────────┘
//! ```

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;

// =============================================================================
// Identifiers
// =============================================================================

/// Stable identifier of an appliance record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplianceId(String);

impl ApplianceId {
    /// Creates an identifier from an existing value.
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplianceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of appliance a driver manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplianceKind {
    /// PV inverter.
    Inverter,
    /// Grid meter.
    Meter,
    /// Battery storage attached to an inverter.
    Battery,
}

impl ApplianceKind {
    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inverter => "inverter",
            Self::Meter => "meter",
            Self::Battery => "battery",
        }
    }
}

impl fmt::Display for ApplianceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Details & Metadata
// =============================================================================

/// Static limits of an inverter, read once per connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InverterMetadata {
    /// Maximum PV production in watts.
    pub max_pv_production_w: Option<f64>,
}

/// Static limits of a battery, read once per connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatteryMetadata {
    /// Usable capacity in watt-hours.
    pub max_capacity_wh: Option<f64>,
    /// Maximum charge power in watts.
    pub max_charge_power_w: Option<f64>,
    /// Maximum discharge power in watts.
    pub max_discharge_power_w: Option<f64>,
}

/// Kind-specific part of an appliance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplianceDetails {
    /// Inverter limits.
    Inverter(InverterMetadata),
    /// Meters carry no static limits.
    Meter,
    /// Battery limits.
    Battery(BatteryMetadata),
}

impl ApplianceDetails {
    /// Returns the appliance kind these details describe.
    pub fn kind(&self) -> ApplianceKind {
        match self {
            Self::Inverter(_) => ApplianceKind::Inverter,
            Self::Meter => ApplianceKind::Meter,
            Self::Battery(_) => ApplianceKind::Battery,
        }
    }
}

// =============================================================================
// Appliance
// =============================================================================

/// A stored appliance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appliance {
    /// Stable identifier, kept across updates.
    pub id: ApplianceId,
    /// Appliance kind.
    pub kind: ApplianceKind,
    /// Display name.
    pub name: String,
    /// Network devices this appliance has been seen behind.
    pub network_device_ids: Vec<String>,
    /// Serial number, when the device reports one.
    pub serial_number: Option<String>,
    /// Kind-specific details.
    pub details: ApplianceDetails,
    /// Last time the record was written.
    pub updated_at: DateTime<Utc>,
}

/// An appliance record without an identifier, as built by a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplianceDraft {
    /// Display name.
    pub name: String,
    /// Network devices the driver talks through.
    pub network_device_ids: Vec<String>,
    /// Serial number read from the device.
    pub serial_number: Option<String>,
    /// Kind-specific details.
    pub details: ApplianceDetails,
}

impl ApplianceDraft {
    /// Returns the kind implied by the details.
    pub fn kind(&self) -> ApplianceKind {
        self.details.kind()
    }

    fn into_appliance(self, id: ApplianceId) -> Appliance {
        Appliance {
            id,
            kind: self.details.kind(),
            name: self.name,
            network_device_ids: self.network_device_ids,
            serial_number: self.serial_number,
            details: self.details,
            updated_at: Utc::now(),
        }
    }
}

// =============================================================================
// ApplianceStore
// =============================================================================

/// External persistence for appliance records.
#[async_trait]
pub trait ApplianceStore: Send + Sync {
    /// Returns every stored appliance.
    async fn list(&self) -> Result<Vec<Appliance>, StoreError>;

    /// Creates a record (`id = None`) or replaces the record with `id`.
    ///
    /// Returns the stored record. An update keeps the identifier.
    async fn save(
        &self,
        draft: ApplianceDraft,
        id: Option<&ApplianceId>,
    ) -> Result<Appliance, StoreError>;
}

/// Process-local store, used when no external store is configured.
#[derive(Debug, Default)]
pub struct InMemoryApplianceStore {
    appliances: RwLock<Vec<Appliance>>,
}

impl InMemoryApplianceStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.appliances.read().await.len()
    }

    /// Returns `true` if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.appliances.read().await.is_empty()
    }
}

#[async_trait]
impl ApplianceStore for InMemoryApplianceStore {
    async fn list(&self) -> Result<Vec<Appliance>, StoreError> {
        Ok(self.appliances.read().await.clone())
    }

    async fn save(
        &self,
        draft: ApplianceDraft,
        id: Option<&ApplianceId>,
    ) -> Result<Appliance, StoreError> {
        let mut appliances = self.appliances.write().await;

        match id {
            Some(id) => {
                let slot = appliances
                    .iter_mut()
                    .find(|a| &a.id == id)
                    .ok_or_else(|| StoreError::NotFound(id.clone()))?;
                *slot = draft.into_appliance(id.clone());
                Ok(slot.clone())
            }
            None => {
                let appliance = draft.into_appliance(ApplianceId::generate());
                appliances.push(appliance.clone());
                Ok(appliance)
            }
        }
    }
}

// =============================================================================
// Matching
// =============================================================================

/// One rule for recognising an existing record on rediscovery.
#[derive(Debug, Clone, Copy)]
pub struct ApplianceMatcher {
    /// Name used in logs.
    pub name: &'static str,
    /// Returns `true` if the existing record is the draft's appliance.
    pub matches: fn(&Appliance, &ApplianceDraft) -> bool,
}

/// Matchers in priority order.
pub const APPLIANCE_MATCHERS: &[ApplianceMatcher] = &[
    ApplianceMatcher {
        name: "network_device",
        matches: shares_network_device,
    },
    ApplianceMatcher {
        name: "serial_number",
        matches: same_serial_number,
    },
];

fn shares_network_device(existing: &Appliance, draft: &ApplianceDraft) -> bool {
    draft
        .network_device_ids
        .iter()
        .any(|id| existing.network_device_ids.contains(id))
}

fn same_serial_number(existing: &Appliance, draft: &ApplianceDraft) -> bool {
    match (&existing.serial_number, &draft.serial_number) {
        (Some(a), Some(b)) => !a.is_empty() && a == b,
        _ => false,
    }
}

/// Finds the record the draft describes, with the name of the matcher that found it.
pub fn find_matching<'a>(
    appliances: &'a [Appliance],
    draft: &ApplianceDraft,
) -> Option<(&'a Appliance, &'static str)> {
    let kind = draft.kind();
    APPLIANCE_MATCHERS.iter().find_map(|matcher| {
        appliances
            .iter()
            .find(|a| a.kind == kind && (matcher.matches)(a, draft))
            .map(|a| (a, matcher.name))
    })
}

/// Creates the draft's record, or updates the matching one in place.
///
/// Network device ids of an existing record are kept alongside the draft's.
pub async fn sync_appliance(
    store: &dyn ApplianceStore,
    mut draft: ApplianceDraft,
) -> Result<Appliance, StoreError> {
    let existing = store.list().await?;

    match find_matching(&existing, &draft) {
        Some((appliance, matcher)) => {
            for id in &appliance.network_device_ids {
                if !draft.network_device_ids.contains(id) {
                    draft.network_device_ids.push(id.clone());
                }
            }
            if draft.serial_number.is_none() {
                draft.serial_number = appliance.serial_number.clone();
            }

            tracing::debug!(
                appliance_id = %appliance.id,
                kind = %appliance.kind,
                matcher = matcher,
                "Updating existing appliance"
            );
            let id = appliance.id.clone();
            store.save(draft, Some(&id)).await
        }
        None => {
            let saved = store.save(draft, None).await?;
            tracing::info!(
                appliance_id = %saved.id,
                kind = %saved.kind,
                name = %saved.name,
                "Created appliance"
            );
            Ok(saved)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn inverter_draft(network_device: &str) -> ApplianceDraft {
        ApplianceDraft {
            name: "Roof inverter".into(),
            network_device_ids: vec![network_device.into()],
            serial_number: None,
            details: ApplianceDetails::Inverter(InverterMetadata {
                max_pv_production_w: Some(10_000.0),
            }),
        }
    }

    #[tokio::test]
    async fn test_sync_creates_then_updates() {
        let store = InMemoryApplianceStore::new();

        let first = sync_appliance(&store, inverter_draft("aa:bb")).await.unwrap();
        let mut changed = inverter_draft("aa:bb");
        changed.name = "Renamed".into();
        let second = sync_appliance(&store, changed).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "Renamed");
    }

    #[tokio::test]
    async fn test_same_network_device_different_kind_is_new_record() {
        let store = InMemoryApplianceStore::new();
        sync_appliance(&store, inverter_draft("aa:bb")).await.unwrap();

        let battery = ApplianceDraft {
            name: "Battery".into(),
            network_device_ids: vec!["aa:bb".into()],
            serial_number: None,
            details: ApplianceDetails::Battery(BatteryMetadata::default()),
        };
        sync_appliance(&store, battery).await.unwrap();

        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_serial_number_matcher_merges_network_devices() {
        let store = InMemoryApplianceStore::new();
        let mut original = inverter_draft("old-gateway");
        original.serial_number = Some("SN-1".into());
        let created = sync_appliance(&store, original).await.unwrap();

        let mut moved = inverter_draft("new-gateway");
        moved.serial_number = Some("SN-1".into());
        let updated = sync_appliance(&store, moved).await.unwrap();

        assert_eq!(created.id, updated.id);
        assert_eq!(updated.network_device_ids, vec!["new-gateway", "old-gateway"]);
    }

    #[test]
    fn test_find_matching_prefers_network_device() {
        let by_network = inverter_draft("aa:bb").into_appliance(ApplianceId::new("by-network"));
        let mut by_serial = inverter_draft("cc:dd").into_appliance(ApplianceId::new("by-serial"));
        by_serial.serial_number = Some("SN-9".into());

        let mut draft = inverter_draft("aa:bb");
        draft.serial_number = Some("SN-9".into());

        let records = [by_serial, by_network];
        let (found, matcher) = find_matching(&records, &draft).unwrap();
        assert_eq!(found.id.as_str(), "by-network");
        assert_eq!(matcher, "network_device");
    }

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let store = InMemoryApplianceStore::new();
        let result = store
            .save(inverter_draft("aa"), Some(&ApplianceId::new("missing")))
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_details_serialize_with_kind_tag() {
        let json = serde_json::to_value(ApplianceDetails::Battery(BatteryMetadata {
            max_capacity_wh: Some(10_000.0),
            ..Default::default()
        }))
        .unwrap();
        assert_eq!(json["kind"], "battery");
        assert_eq!(json["max_capacity_wh"], 10_000.0);
    }
}

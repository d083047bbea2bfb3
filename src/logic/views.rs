//! Views - read-side queries
//!
//! Thin wrappers that run one read transaction each. Rows holding enum
//! strings this build cannot map are skipped (and logged) by the store.

use serde::Serialize;

use crate::logic::device::{DetectedDevice, DeviceSighting};
use crate::logic::store::{Store, StoreError};
use crate::logic::threat::ThreatAlert;
use crate::logic::EpochMillis;

/// Headline numbers for a dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_devices: u64,
    /// Score at or above the suspicious cutoff (whitelisted included)
    pub suspicious_devices: u64,
    pub sightings_since: u64,
    pub unacknowledged_alerts: u64,
    /// Devices last seen at or after `since`
    pub unique_devices_since: u64,
}

pub fn recent_devices<S: Store>(store: &S, limit: usize) -> Result<Vec<DetectedDevice>, StoreError> {
    store.transaction(|tx| tx.recent_devices(limit))
}

/// Highest score first
pub fn suspicious_devices<S: Store>(store: &S, cutoff: f32) -> Result<Vec<DetectedDevice>, StoreError> {
    store.transaction(|tx| tx.suspicious_devices(cutoff))
}

pub fn device<S: Store>(store: &S, device_id: &str) -> Result<Option<DetectedDevice>, StoreError> {
    store.transaction(|tx| tx.get_device(device_id))
}

pub fn unacknowledged_alerts<S: Store>(store: &S) -> Result<Vec<ThreatAlert>, StoreError> {
    store.transaction(|tx| tx.unacknowledged_alerts())
}

pub fn alerts_for_device<S: Store>(store: &S, device_id: &str) -> Result<Vec<ThreatAlert>, StoreError> {
    store.transaction(|tx| tx.alerts_for_device(device_id))
}

/// Oldest first
pub fn sightings_for_device<S: Store>(
    store: &S,
    device_id: &str,
    since: EpochMillis,
) -> Result<Vec<DeviceSighting>, StoreError> {
    store.transaction(|tx| tx.sightings_for_device(device_id, since))
}

pub fn dashboard_stats<S: Store>(store: &S, since: EpochMillis, cutoff: f32) -> Result<DashboardStats, StoreError> {
    store.transaction(|tx| {
        Ok(DashboardStats {
            total_devices: tx.count_devices()?,
            suspicious_devices: tx.count_suspicious_devices(cutoff)?,
            sightings_since: tx.count_sightings_since(since)?,
            unacknowledged_alerts: tx.count_unacknowledged_alerts()?,
            unique_devices_since: tx.count_unique_devices_since(since)?,
        })
    })
}

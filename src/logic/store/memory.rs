//! In-memory store
//!
//! Each transaction works on a private copy of the state and swaps it in
//! on commit, which gives the same all-or-nothing behaviour as SQLite.
//! Intended for tests and short-lived runs; the copy makes large
//! datasets slow.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use super::{Store, StoreError, StoreTx};
use crate::logic::cluster::{nearest_candidate, ClusterId, LocationCluster};
use crate::logic::device::{DetectedDevice, DeviceSighting, SightingId};
use crate::logic::threat::{AlertId, ThreatAlert};
use crate::logic::EpochMillis;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    devices: BTreeMap<String, DetectedDevice>,
    sightings: BTreeMap<SightingId, DeviceSighting>,
    clusters: BTreeMap<ClusterId, LocationCluster>,
    alerts: BTreeMap<AlertId, ThreatAlert>,
    next_sighting_id: SightingId,
    next_cluster_id: ClusterId,
    next_alert_id: AlertId,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    /// Pending injected `append_alert` failures
    alert_failures: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` alert appends fail as if the store went away
    #[cfg(test)]
    pub(crate) fn fail_next_alert_appends(&self, count: u32) {
        self.alert_failures.store(count, Ordering::SeqCst);
    }
}

impl Store for MemoryStore {
    fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, StoreError>,
    {
        let mut guard = self.state.lock();
        let mut working = guard.clone();
        let value = {
            let mut tx = MemoryTx {
                state: &mut working,
                alert_failures: &self.alert_failures,
            };
            f(&mut tx)?
        };
        *guard = working;
        Ok(value)
    }
}

struct MemoryTx<'a> {
    state: &'a mut MemoryState,
    alert_failures: &'a AtomicU32,
}

fn count_u64(n: usize) -> u64 {
    u64::try_from(n).unwrap_or(u64::MAX)
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

impl StoreTx for MemoryTx<'_> {
    fn get_device(&mut self, id: &str) -> Result<Option<DetectedDevice>, StoreError> {
        Ok(self.state.devices.get(id).cloned())
    }

    fn put_device(&mut self, device: &DetectedDevice) -> Result<i64, StoreError> {
        let current = self.state.devices.get(&device.id).map(|d| d.revision);
        let expected = if device.revision == 0 { None } else { Some(device.revision) };
        if current != expected {
            return Err(StoreError::Conflict(device.id.clone()));
        }

        let mut row = device.clone();
        row.revision = device.revision + 1;
        let revision = row.revision;
        self.state.devices.insert(row.id.clone(), row);
        Ok(revision)
    }

    fn delete_device(&mut self, id: &str) -> Result<bool, StoreError> {
        let existed = self.state.devices.remove(id).is_some();
        if existed {
            self.state.sightings.retain(|_, s| s.device_id != id);
        }
        Ok(existed)
    }

    fn append_sighting(&mut self, sighting: &DeviceSighting) -> Result<SightingId, StoreError> {
        self.state.next_sighting_id += 1;
        let id = self.state.next_sighting_id;
        let mut row = sighting.clone();
        row.id = id;
        self.state.sightings.insert(id, row);
        Ok(id)
    }

    fn count_distinct_locations(&mut self, device_id: &str) -> Result<u32, StoreError> {
        let cells: BTreeSet<(i64, i64)> = self
            .state
            .sightings
            .values()
            .filter(|s| s.device_id == device_id)
            .map(|s| (s.lat_q, s.lon_q))
            .collect();
        Ok(count_u32(cells.len()))
    }

    fn count_distinct_clusters(&mut self, device_id: &str) -> Result<u32, StoreError> {
        let clusters: BTreeSet<ClusterId> = self
            .state
            .sightings
            .values()
            .filter(|s| s.device_id == device_id)
            .map(|s| s.cluster_id)
            .collect();
        Ok(count_u32(clusters.len()))
    }

    fn delete_sightings_older_than(&mut self, cutoff: EpochMillis) -> Result<usize, StoreError> {
        let before = self.state.sightings.len();
        self.state.sightings.retain(|_, s| s.timestamp >= cutoff);
        Ok(before - self.state.sightings.len())
    }

    fn find_cluster_near(
        &mut self,
        latitude: f64,
        longitude: f64,
        epsilon_deg: f64,
    ) -> Result<Option<LocationCluster>, StoreError> {
        Ok(nearest_candidate(self.state.clusters.values(), latitude, longitude, epsilon_deg).cloned())
    }

    fn get_cluster(&mut self, id: ClusterId) -> Result<Option<LocationCluster>, StoreError> {
        Ok(self.state.clusters.get(&id).cloned())
    }

    fn put_cluster(&mut self, cluster: &LocationCluster) -> Result<ClusterId, StoreError> {
        let mut row = cluster.clone();
        if row.id == 0 {
            self.state.next_cluster_id += 1;
            row.id = self.state.next_cluster_id;
        } else if !self.state.clusters.contains_key(&row.id) {
            return Err(StoreError::not_found("cluster", row.id));
        }
        let id = row.id;
        self.state.clusters.insert(id, row);
        Ok(id)
    }

    fn list_clusters(&mut self) -> Result<Vec<LocationCluster>, StoreError> {
        Ok(self.state.clusters.values().cloned().collect())
    }

    fn append_alert(&mut self, alert: &ThreatAlert) -> Result<AlertId, StoreError> {
        let pending = self.alert_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.alert_failures.store(pending - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("injected alert failure".to_string()));
        }

        self.state.next_alert_id += 1;
        let id = self.state.next_alert_id;
        let mut row = alert.clone();
        row.id = id;
        self.state.alerts.insert(id, row);
        Ok(id)
    }

    fn update_alert(&mut self, alert: &ThreatAlert) -> Result<(), StoreError> {
        let row = self
            .state
            .alerts
            .get_mut(&alert.id)
            .ok_or_else(|| StoreError::not_found("alert", alert.id))?;
        row.acknowledged = alert.acknowledged;
        row.user_action = alert.user_action;
        Ok(())
    }

    fn get_alert(&mut self, id: AlertId) -> Result<Option<ThreatAlert>, StoreError> {
        Ok(self.state.alerts.get(&id).cloned())
    }

    fn get_latest_alert(&mut self, device_id: &str) -> Result<Option<ThreatAlert>, StoreError> {
        Ok(self
            .state
            .alerts
            .values()
            .filter(|a| a.device_id == device_id)
            .max_by_key(|a| (a.timestamp, a.id))
            .cloned())
    }

    fn stale_device_ids(&mut self, cutoff: EpochMillis, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut stale: Vec<&DetectedDevice> = self
            .state
            .devices
            .values()
            .filter(|d| d.is_stale(cutoff))
            .collect();
        stale.sort_by_key(|d| d.last_seen);
        Ok(stale.into_iter().take(limit).map(|d| d.id.clone()).collect())
    }

    fn delete_device_if_stale(&mut self, id: &str, cutoff: EpochMillis) -> Result<bool, StoreError> {
        let stale = self
            .state
            .devices
            .get(id)
            .map(|d| d.is_stale(cutoff))
            .unwrap_or(false);
        if !stale {
            return Ok(false);
        }
        self.delete_device(id)
    }

    fn recent_devices(&mut self, limit: usize) -> Result<Vec<DetectedDevice>, StoreError> {
        let mut devices: Vec<DetectedDevice> = self.state.devices.values().cloned().collect();
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.id.cmp(&b.id)));
        devices.truncate(limit);
        Ok(devices)
    }

    fn suspicious_devices(&mut self, cutoff: f32) -> Result<Vec<DetectedDevice>, StoreError> {
        let mut devices: Vec<DetectedDevice> = self
            .state
            .devices
            .values()
            .filter(|d| d.threat_score >= cutoff)
            .cloned()
            .collect();
        devices.sort_by(|a, b| {
            b.threat_score
                .total_cmp(&a.threat_score)
                .then_with(|| b.last_seen.cmp(&a.last_seen))
        });
        Ok(devices)
    }

    fn unacknowledged_alerts(&mut self) -> Result<Vec<ThreatAlert>, StoreError> {
        let mut alerts: Vec<ThreatAlert> = self
            .state
            .alerts
            .values()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(alerts)
    }

    fn alerts_for_device(&mut self, device_id: &str) -> Result<Vec<ThreatAlert>, StoreError> {
        let mut alerts: Vec<ThreatAlert> = self
            .state
            .alerts
            .values()
            .filter(|a| a.device_id == device_id)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| (b.timestamp, b.id).cmp(&(a.timestamp, a.id)));
        Ok(alerts)
    }

    fn sightings_for_device(&mut self, device_id: &str, since: EpochMillis) -> Result<Vec<DeviceSighting>, StoreError> {
        let mut sightings: Vec<DeviceSighting> = self
            .state
            .sightings
            .values()
            .filter(|s| s.device_id == device_id && s.timestamp >= since)
            .cloned()
            .collect();
        sightings.sort_by_key(|s| (s.timestamp, s.id));
        Ok(sightings)
    }

    fn count_devices(&mut self) -> Result<u64, StoreError> {
        Ok(count_u64(self.state.devices.len()))
    }

    fn count_suspicious_devices(&mut self, cutoff: f32) -> Result<u64, StoreError> {
        Ok(count_u64(
            self.state.devices.values().filter(|d| d.threat_score >= cutoff).count(),
        ))
    }

    fn count_sightings_since(&mut self, since: EpochMillis) -> Result<u64, StoreError> {
        Ok(count_u64(
            self.state.sightings.values().filter(|s| s.timestamp >= since).count(),
        ))
    }

    fn count_unacknowledged_alerts(&mut self) -> Result<u64, StoreError> {
        Ok(count_u64(self.state.alerts.values().filter(|a| !a.acknowledged).count()))
    }

    fn count_unique_devices_since(&mut self, since: EpochMillis) -> Result<u64, StoreError> {
        Ok(count_u64(
            self.state.devices.values().filter(|d| d.last_seen >= since).count(),
        ))
    }
}

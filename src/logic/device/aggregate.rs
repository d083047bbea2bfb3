//! Device Aggregate Store
//!
//! Keeps the per-device running statistics in step with the sightings
//! table. Counts that depend on history (distinct locations, distinct
//! places) are recomputed from the store inside the same transaction, so
//! they can never drift from the rows they summarise.

use serde::Serialize;

use super::types::{DetectedDevice, DeviceSighting};
use crate::logic::cluster::geo::quantize;
use crate::logic::store::{StoreError, StoreTx};

/// Cap on remembered probed network names per device
pub const MAX_PROBED_SSIDS: usize = 32;

/// Before/after view of one aggregate update
#[derive(Debug, Clone, Serialize)]
pub struct DeviceAggregateDelta {
    /// Row as persisted (revision already bumped)
    pub device: DetectedDevice,
    pub created: bool,
    pub old_detection_count: u32,
    pub old_location_count: u32,
    pub old_place_count: u32,
}

impl DeviceAggregateDelta {
    pub fn new_location(&self) -> bool {
        self.device.location_count > self.old_location_count
    }

    pub fn new_place(&self) -> bool {
        self.device.place_count > self.old_place_count
    }
}

/// Extra attributes an observation may carry
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservedTraits<'a> {
    pub name: Option<&'a str>,
    pub subclass: Option<i32>,
}

pub struct DeviceAggregates {
    location_precision: u32,
}

impl DeviceAggregates {
    pub fn new(location_precision: u32) -> Self {
        Self { location_precision }
    }

    /// Grid cell for the distinct-location count
    pub fn quantize(&self, latitude: f64, longitude: f64) -> (i64, i64) {
        (
            quantize(latitude, self.location_precision),
            quantize(longitude, self.location_precision),
        )
    }

    /// Fold an already-appended sighting into its device row and persist it.
    pub fn upsert_on_sighting(
        &self,
        tx: &mut dyn StoreTx,
        sighting: &DeviceSighting,
        traits: ObservedTraits<'_>,
    ) -> Result<DeviceAggregateDelta, StoreError> {
        let existing = tx.get_device(&sighting.device_id)?;
        let created = existing.is_none();

        let mut device = match existing {
            Some(device) => device,
            None => {
                let mut fresh = DetectedDevice::first_seen_at(
                    &sighting.device_id,
                    sighting.device_class,
                    sighting.timestamp,
                    sighting.rssi,
                );
                // first_seen_at starts every counter at 1
                fresh.detection_count = 0;
                fresh.location_count = 0;
                fresh.place_count = 0;
                fresh
            }
        };

        let old_detection_count = device.detection_count;
        let old_location_count = device.location_count;
        let old_place_count = device.place_count;

        device.detection_count = device.detection_count.saturating_add(1);
        device.first_seen = device.first_seen.min(sighting.timestamp);
        device.last_seen = device.last_seen.max(sighting.timestamp);
        device.last_rssi = sighting.rssi;
        device.device_class = sighting.device_class;

        if let Some(name) = traits.name.filter(|n| !n.trim().is_empty()) {
            device.name = Some(name.to_string());
        }
        if traits.subclass.is_some() {
            device.subclass = traits.subclass;
        }
        if let Some(ssid) = sighting.probed_ssid.as_deref().filter(|s| !s.is_empty()) {
            if !device.probed_ssids.iter().any(|known| known == ssid)
                && device.probed_ssids.len() < MAX_PROBED_SSIDS
            {
                device.probed_ssids.push(ssid.to_string());
            }
        }

        device.location_count = tx.count_distinct_locations(&device.id)?.max(1);
        device.place_count = tx.count_distinct_clusters(&device.id)?.max(1);

        device.revision = tx.put_device(&device)?;

        Ok(DeviceAggregateDelta {
            device,
            created,
            old_detection_count,
            old_location_count,
            old_place_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::device::DeviceClass;
    use crate::logic::store::{MemoryStore, Store};

    fn sighting(lat: f64, lon: f64, ts: i64, cluster_id: i64, aggregates: &DeviceAggregates) -> DeviceSighting {
        let (lat_q, lon_q) = aggregates.quantize(lat, lon);
        DeviceSighting {
            id: 0,
            device_id: "AA:BB:CC:DD:EE:FF".to_string(),
            timestamp: ts,
            latitude: lat,
            longitude: lon,
            accuracy: 10.0,
            rssi: -70,
            device_class: DeviceClass::WifiProbeRequest,
            probed_ssid: Some("HomeNet".to_string()),
            ap_ssid: None,
            channel: None,
            frequency: None,
            cluster_id,
            lat_q,
            lon_q,
        }
    }

    fn ingest(store: &MemoryStore, aggregates: &DeviceAggregates, s: DeviceSighting) -> DeviceAggregateDelta {
        store
            .transaction(|tx| {
                tx.append_sighting(&s)?;
                aggregates.upsert_on_sighting(tx, &s, ObservedTraits::default())
            })
            .unwrap()
    }

    #[test]
    fn test_first_sighting_creates_device() {
        let store = MemoryStore::new();
        let aggregates = DeviceAggregates::new(4);

        let delta = ingest(&store, &aggregates, sighting(37.0, -122.0, 1_000, 1, &aggregates));
        assert!(delta.created);
        assert_eq!(delta.device.detection_count, 1);
        assert_eq!(delta.device.location_count, 1);
        assert_eq!(delta.device.place_count, 1);
        assert_eq!(delta.device.first_seen, 1_000);
        assert_eq!(delta.device.revision, 1);
        assert_eq!(delta.device.probed_ssids, vec!["HomeNet".to_string()]);
    }

    #[test]
    fn test_counts_follow_history() {
        let store = MemoryStore::new();
        let aggregates = DeviceAggregates::new(4);

        ingest(&store, &aggregates, sighting(37.0, -122.0, 5_000, 1, &aggregates));
        // Same grid cell, same cluster
        let delta = ingest(&store, &aggregates, sighting(37.00001, -122.00001, 6_000, 1, &aggregates));
        assert_eq!(delta.device.location_count, 1);
        assert!(!delta.new_location());

        // Out-of-order timestamp at a new place
        let delta = ingest(&store, &aggregates, sighting(37.05, -122.05, 2_000, 2, &aggregates));
        assert_eq!(delta.device.detection_count, 3);
        assert_eq!(delta.device.location_count, 2);
        assert_eq!(delta.device.place_count, 2);
        assert!(delta.new_place());
        assert_eq!(delta.device.first_seen, 2_000);
        assert_eq!(delta.device.last_seen, 6_000);
        assert_eq!(delta.device.probed_ssids.len(), 1);
    }
}

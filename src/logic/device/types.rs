//! Device Types
//!
//! Persisted shapes for detected devices and their sightings.

use serde::{Deserialize, Serialize};

use crate::logic::cluster::ClusterId;
use crate::logic::threat::ThreatLevel;
use crate::logic::EpochMillis;

// ============================================================================
// DEVICE CLASS
// ============================================================================

/// Radio family a device was observed on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceClass {
    BluetoothClassic,
    #[default]
    BluetoothLe,
    WifiAccessPoint,
    WifiProbeRequest,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::BluetoothClassic => "BLUETOOTH_CLASSIC",
            DeviceClass::BluetoothLe => "BLUETOOTH_LE",
            DeviceClass::WifiAccessPoint => "WIFI_ACCESS_POINT",
            DeviceClass::WifiProbeRequest => "WIFI_PROBE_REQUEST",
        }
    }

    pub fn is_bluetooth(&self) -> bool {
        matches!(self, DeviceClass::BluetoothClassic | DeviceClass::BluetoothLe)
    }
}

impl std::fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// DETECTED DEVICE
// ============================================================================

/// One row per device identity, with running aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedDevice {
    /// Normalised hardware address, immutable
    pub id: String,
    pub device_class: DeviceClass,
    pub name: Option<String>,
    pub first_seen: EpochMillis,
    pub last_seen: EpochMillis,
    pub detection_count: u32,
    /// Distinct quantized coordinates
    pub location_count: u32,
    /// Distinct clusters
    pub place_count: u32,
    pub threat_score: f32,
    pub threat_level: ThreatLevel,
    pub last_rssi: i32,
    pub probed_ssids: Vec<String>,
    /// Bluetooth major class or similar radio subclass code
    pub subclass: Option<i32>,
    pub is_whitelisted: bool,
    pub is_flagged: bool,
    /// Opaque JSON text
    pub metadata: Option<String>,
    /// Known-tracker signature description, once matched
    pub tracker: Option<String>,
    /// Level of the most recent alert, `Low` when armed
    pub alerted_level: ThreatLevel,
    /// Bumped on every write; 0 means "not yet persisted"
    pub revision: i64,
}

impl DetectedDevice {
    /// Fresh device from its first sighting
    pub fn first_seen_at(id: &str, device_class: DeviceClass, timestamp: EpochMillis, rssi: i32) -> Self {
        Self {
            id: id.to_string(),
            device_class,
            name: None,
            first_seen: timestamp,
            last_seen: timestamp,
            detection_count: 1,
            location_count: 1,
            place_count: 1,
            threat_score: 0.0,
            threat_level: ThreatLevel::Low,
            last_rssi: rssi,
            probed_ssids: Vec::new(),
            subclass: None,
            is_whitelisted: false,
            is_flagged: false,
            metadata: None,
            tracker: None,
            alerted_level: ThreatLevel::Low,
            revision: 0,
        }
    }

    /// last seen - first seen
    pub fn follow_duration_ms(&self) -> i64 {
        (self.last_seen - self.first_seen).max(0)
    }

    /// Whitelisted or flagged rows survive retention
    pub fn is_protected(&self) -> bool {
        self.is_whitelisted || self.is_flagged
    }

    pub fn is_stale(&self, cutoff: EpochMillis) -> bool {
        self.last_seen < cutoff && !self.is_protected()
    }
}

// ============================================================================
// SIGHTING
// ============================================================================

pub type SightingId = i64;

/// One append-only observation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSighting {
    /// Assigned by the store; 0 until appended
    pub id: SightingId,
    pub device_id: String,
    pub timestamp: EpochMillis,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres
    pub accuracy: f32,
    pub rssi: i32,
    pub device_class: DeviceClass,
    pub probed_ssid: Option<String>,
    pub ap_ssid: Option<String>,
    pub channel: Option<i32>,
    pub frequency: Option<i32>,
    pub cluster_id: ClusterId,
    pub lat_q: i64,
    pub lon_q: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_duration_never_negative() {
        let mut device = DetectedDevice::first_seen_at("AA:BB", DeviceClass::BluetoothLe, 5_000, -60);
        assert_eq!(device.follow_duration_ms(), 0);
        device.first_seen = 9_000;
        assert_eq!(device.follow_duration_ms(), 0);
        device.first_seen = 1_000;
        assert_eq!(device.follow_duration_ms(), 4_000);
    }

    #[test]
    fn test_protected_devices_never_stale() {
        let mut device = DetectedDevice::first_seen_at("AA:BB", DeviceClass::WifiAccessPoint, 1_000, -60);
        assert!(device.is_stale(2_000));
        device.is_flagged = true;
        assert!(!device.is_stale(2_000));
        device.is_flagged = false;
        device.is_whitelisted = true;
        assert!(!device.is_stale(2_000));
    }
}

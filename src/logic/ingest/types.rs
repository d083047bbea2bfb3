//! Ingest Types
//!
//! Raw observation in, outcome out, and the error taxonomy callers act on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logic::cluster::ClusterId;
use crate::logic::device::{normalize_identity, DeviceClass, SightingId};
use crate::logic::store::StoreError;
use crate::logic::threat::{ThreatAlert, ThreatLevel};
use crate::logic::EpochMillis;

// ============================================================================
// OBSERVATION
// ============================================================================

/// One raw scan result, as produced by the radio layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Observation {
    #[serde(alias = "mac_address")]
    pub device_id: String,
    pub device_class: DeviceClass,
    pub name: Option<String>,
    pub timestamp: EpochMillis,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres
    pub accuracy: f32,
    pub rssi: i32,
    pub probed_ssid: Option<String>,
    pub ap_ssid: Option<String>,
    pub channel: Option<i32>,
    pub frequency: Option<i32>,
    pub subclass: Option<i32>,
    /// Raw BLE manufacturer data, company id little-endian first
    #[serde(with = "hex_bytes")]
    pub manufacturer_data: Option<Vec<u8>>,
    pub service_uuids: Vec<String>,
}

impl Observation {
    /// Check every field persistence relies on; returns the normalised identity.
    pub fn validate(&self) -> Result<String, IngestError> {
        let device_id = normalize_identity(&self.device_id)
            .ok_or_else(|| IngestError::InvalidSighting("empty device identity".to_string()))?;

        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(IngestError::InvalidSighting(format!(
                "non-finite coordinates ({}, {})",
                self.latitude, self.longitude
            )));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(IngestError::InvalidSighting(format!("latitude {} out of range", self.latitude)));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(IngestError::InvalidSighting(format!("longitude {} out of range", self.longitude)));
        }
        if !self.accuracy.is_finite() || self.accuracy < 0.0 {
            return Err(IngestError::InvalidSighting(format!("accuracy {} invalid", self.accuracy)));
        }
        if self.timestamp <= 0 {
            return Err(IngestError::InvalidSighting(format!("timestamp {} not positive", self.timestamp)));
        }

        Ok(device_id)
    }
}

/// `Option<Vec<u8>>` as a hex string in JSON
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) if !s.is_empty() => hex::decode(&s).map(Some).map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// What one ingest did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    pub device_id: String,
    pub sighting_id: SightingId,
    pub cluster_id: ClusterId,
    pub cluster_created: bool,
    pub device_created: bool,
    pub detection_count: u32,
    pub location_count: u32,
    pub place_count: u32,
    pub score: f32,
    pub level: ThreatLevel,
    /// Alert recorded by this ingest
    pub alert: Option<ThreatAlert>,
    /// An alert was due but could not be recorded; the next ingest retries
    pub alert_pending: bool,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum IngestError {
    /// Nothing was written; retry with backoff
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    /// Rejected before any persistence; do not retry
    #[error("invalid sighting: {0}")]
    InvalidSighting(String),

    /// A device row changed under an unserialized writer; fatal, never retried
    #[error("concurrent write detected for device {0}")]
    ConcurrencyConflict(String),
}

impl From<StoreError> for IngestError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(id) => IngestError::ConcurrencyConflict(id),
            other => IngestError::StoreUnavailable(other),
        }
    }
}

impl IngestError {
    /// Worth retrying the same observation later.
    ///
    /// Unreadable rows fail the same way on every attempt, and a conflict
    /// means an invariant broke, so neither is transient.
    pub fn is_transient(&self) -> bool {
        match self {
            IngestError::StoreUnavailable(e) => {
                !matches!(e, StoreError::Quarantined { .. } | StoreError::Serialization(_))
            }
            IngestError::InvalidSighting(_) | IngestError::ConcurrencyConflict(_) => false,
        }
    }
}

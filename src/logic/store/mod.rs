//! Store Module - Persistence boundary
//!
//! The engines only ever see `Store` / `StoreTx`. Two implementations:
//! - `sqlite` - production store (rusqlite, WAL)
//! - `memory` - copy-on-write in-memory store for tests and ephemeral runs
//!
//! Every mutation runs inside `Store::transaction`: the closure's writes are
//! committed together when it returns `Ok`, and discarded when it returns `Err`.

use thiserror::Error;

use crate::logic::cluster::{ClusterId, LocationCluster};
use crate::logic::device::{DetectedDevice, DeviceSighting, SightingId};
use crate::logic::threat::{AlertId, ThreatAlert};
use crate::logic::EpochMillis;

pub mod codec;
mod memory;
mod sqlite;

pub use codec::ENUM_MAPPING_VERSION;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;


// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A device row changed under an unserialized writer
    #[error("revision conflict on device {0}")]
    Conflict(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// Row holds an enum string this build does not understand
    #[error("quarantined {table} row {key}: {reason}")]
    Quarantined {
        table: &'static str,
        key: String,
        reason: String,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

// ============================================================================
// TRANSACTION SURFACE
// ============================================================================

/// Operations available inside one store transaction.
pub trait StoreTx {
    // --- devices ---

    fn get_device(&mut self, id: &str) -> Result<Option<DetectedDevice>, StoreError>;

    /// Insert (revision 0) or update (matching revision). Returns the new revision;
    /// a mismatch is `StoreError::Conflict`.
    fn put_device(&mut self, device: &DetectedDevice) -> Result<i64, StoreError>;

    /// Delete a device and, by cascade, its sightings
    fn delete_device(&mut self, id: &str) -> Result<bool, StoreError>;

    // --- sightings ---

    fn append_sighting(&mut self, sighting: &DeviceSighting) -> Result<SightingId, StoreError>;

    /// Distinct quantized coordinate pairs across the device's sightings
    fn count_distinct_locations(&mut self, device_id: &str) -> Result<u32, StoreError>;

    /// Distinct cluster ids across the device's sightings
    fn count_distinct_clusters(&mut self, device_id: &str) -> Result<u32, StoreError>;

    fn delete_sightings_older_than(&mut self, cutoff: EpochMillis) -> Result<usize, StoreError>;

    // --- clusters ---

    /// Nearest cluster with both |Δlat| and |Δlon| below epsilon
    fn find_cluster_near(
        &mut self,
        latitude: f64,
        longitude: f64,
        epsilon_deg: f64,
    ) -> Result<Option<LocationCluster>, StoreError>;

    fn get_cluster(&mut self, id: ClusterId) -> Result<Option<LocationCluster>, StoreError>;

    /// Insert (id 0) or update. Returns the row id.
    fn put_cluster(&mut self, cluster: &LocationCluster) -> Result<ClusterId, StoreError>;

    fn list_clusters(&mut self) -> Result<Vec<LocationCluster>, StoreError>;

    // --- alerts ---

    fn append_alert(&mut self, alert: &ThreatAlert) -> Result<AlertId, StoreError>;

    /// Persist acknowledgement / user action of an existing alert
    fn update_alert(&mut self, alert: &ThreatAlert) -> Result<(), StoreError>;

    fn get_alert(&mut self, id: AlertId) -> Result<Option<ThreatAlert>, StoreError>;

    fn get_latest_alert(&mut self, device_id: &str) -> Result<Option<ThreatAlert>, StoreError>;

    // --- retention ---

    /// Up to `limit` unprotected devices last seen before `cutoff`
    fn stale_device_ids(&mut self, cutoff: EpochMillis, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Delete only if still stale and unprotected at this moment
    fn delete_device_if_stale(&mut self, id: &str, cutoff: EpochMillis) -> Result<bool, StoreError>;

    /// Bulk form of `delete_device_if_stale`
    fn delete_devices_older_than(&mut self, cutoff: EpochMillis) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for id in self.stale_device_ids(cutoff, usize::MAX)? {
            if self.delete_device_if_stale(&id, cutoff)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // --- views ---

    /// Most recently seen first
    fn recent_devices(&mut self, limit: usize) -> Result<Vec<DetectedDevice>, StoreError>;

    /// Score at or above `cutoff`, highest first
    fn suspicious_devices(&mut self, cutoff: f32) -> Result<Vec<DetectedDevice>, StoreError>;

    /// Newest first
    fn unacknowledged_alerts(&mut self) -> Result<Vec<ThreatAlert>, StoreError>;

    /// Newest first
    fn alerts_for_device(&mut self, device_id: &str) -> Result<Vec<ThreatAlert>, StoreError>;

    /// Oldest first
    fn sightings_for_device(&mut self, device_id: &str, since: EpochMillis) -> Result<Vec<DeviceSighting>, StoreError>;

    fn count_devices(&mut self) -> Result<u64, StoreError>;

    fn count_suspicious_devices(&mut self, cutoff: f32) -> Result<u64, StoreError>;

    fn count_sightings_since(&mut self, since: EpochMillis) -> Result<u64, StoreError>;

    fn count_unacknowledged_alerts(&mut self) -> Result<u64, StoreError>;

    fn count_unique_devices_since(&mut self, since: EpochMillis) -> Result<u64, StoreError>;
}

// ============================================================================
// STORE HANDLE
// ============================================================================

/// A shareable store handle.
pub trait Store: Send + Sync {
    /// Run `f` in one transaction: commit on `Ok`, roll back on `Err`.
    fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, StoreError>;
}

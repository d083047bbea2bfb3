//! Cluster Types

use serde::{Deserialize, Serialize};

use crate::logic::EpochMillis;

pub type ClusterId = i64;

/// A merged geographic region ("place"), identity-agnostic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCluster {
    /// Assigned by the store; 0 until inserted
    pub id: ClusterId,
    pub center_latitude: f64,
    pub center_longitude: f64,
    /// Metres
    pub radius: f32,
    pub first_visit: EpochMillis,
    pub last_visit: EpochMillis,
    pub visit_count: u32,
    pub place_name: Option<String>,
}

impl LocationCluster {
    /// New single-visit cluster centred on a point
    pub fn seeded(latitude: f64, longitude: f64, radius: f32, timestamp: EpochMillis) -> Self {
        Self {
            id: 0,
            center_latitude: latitude,
            center_longitude: longitude,
            radius,
            first_visit: timestamp,
            last_visit: timestamp,
            visit_count: 1,
            place_name: None,
        }
    }
}

/// Which cluster a sighting landed in
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterResolution {
    pub cluster: LocationCluster,
    pub created: bool,
}

//! Clustering Engine
//!
//! Streaming, non-rebalancing assignment of sightings to places.
//! Each call persists exactly one create-or-update of a cluster row; the
//! caller applies the returned row to the `SpatialIndex` after commit.

use std::sync::Arc;

use super::geo::haversine_m;
use super::index::SpatialIndex;
use super::types::{ClusterResolution, LocationCluster};
use crate::logic::store::{StoreError, StoreTx};
use crate::logic::EpochMillis;

pub struct ClusteringEngine {
    epsilon_deg: f64,
    min_radius_m: f32,
    index: Arc<SpatialIndex>,
}

impl ClusteringEngine {
    pub fn new(epsilon_deg: f64, min_radius_m: f32, index: Arc<SpatialIndex>) -> Self {
        Self {
            epsilon_deg,
            min_radius_m,
            index,
        }
    }

    pub fn epsilon_deg(&self) -> f64 {
        self.epsilon_deg
    }

    /// Assign a point to the nearest cluster within epsilon, or seed a new one.
    pub fn resolve_cluster(
        &self,
        tx: &mut dyn StoreTx,
        latitude: f64,
        longitude: f64,
        accuracy: f32,
        timestamp: EpochMillis,
    ) -> Result<ClusterResolution, StoreError> {
        // Index first; the store catches rows committed by a concurrent
        // ingest that have not reached the index yet.
        let candidate = match self.index.nearest_within(latitude, longitude, self.epsilon_deg) {
            Some(hit) => Some(hit.id),
            None => tx
                .find_cluster_near(latitude, longitude, self.epsilon_deg)?
                .map(|c| c.id),
        };

        // Re-read so counters are never built on a stale cached copy
        let existing = match candidate {
            Some(id) => tx.get_cluster(id)?,
            None => None,
        };

        match existing {
            Some(mut cluster) => {
                merge_point(&mut cluster, latitude, longitude, timestamp);
                tx.put_cluster(&cluster)?;
                Ok(ClusterResolution {
                    cluster,
                    created: false,
                })
            }
            None => {
                let radius = accuracy.max(self.min_radius_m);
                let mut cluster = LocationCluster::seeded(latitude, longitude, radius, timestamp);
                cluster.id = tx.put_cluster(&cluster)?;
                log::debug!(
                    "New place #{} at ({:.5}, {:.5}) r={:.0}m",
                    cluster.id,
                    latitude,
                    longitude,
                    radius
                );
                Ok(ClusterResolution {
                    cluster,
                    created: true,
                })
            }
        }
    }
}

/// Fold one point into a cluster: unweighted running-mean centroid,
/// radius only ever grows.
pub fn merge_point(cluster: &mut LocationCluster, latitude: f64, longitude: f64, timestamp: EpochMillis) {
    let n = f64::from(cluster.visit_count.max(1));
    cluster.center_latitude = (cluster.center_latitude * n + latitude) / (n + 1.0);
    cluster.center_longitude = (cluster.center_longitude * n + longitude) / (n + 1.0);
    cluster.visit_count = cluster.visit_count.saturating_add(1);
    cluster.first_visit = cluster.first_visit.min(timestamp);
    cluster.last_visit = cluster.last_visit.max(timestamp);

    let reach = haversine_m(latitude, longitude, cluster.center_latitude, cluster.center_longitude) as f32;
    cluster.radius = cluster.radius.max(reach);
}

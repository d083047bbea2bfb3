//! Spatial Index
//!
//! In-memory view of the persisted clusters, shared by all ingest workers.
//! Readers never block each other; writes land only after the owning
//! transaction has committed, so the index never holds a rolled-back row.

use std::collections::HashMap;

use parking_lot::RwLock;

use super::geo::{degree_distance, within_box};
use super::types::{ClusterId, LocationCluster};

/// Nearest centroid inside the epsilon box, ties broken by lower id.
pub fn nearest_candidate<'a, I>(clusters: I, latitude: f64, longitude: f64, epsilon_deg: f64) -> Option<&'a LocationCluster>
where
    I: IntoIterator<Item = &'a LocationCluster>,
{
    clusters
        .into_iter()
        .filter(|c| within_box(c.center_latitude, c.center_longitude, latitude, longitude, epsilon_deg))
        .map(|c| {
            let d = degree_distance(c.center_latitude, c.center_longitude, latitude, longitude);
            (c, d)
        })
        .min_by(|(a, da), (b, db)| da.total_cmp(db).then(a.id.cmp(&b.id)))
        .map(|(c, _)| c)
}

#[derive(Debug, Default)]
pub struct SpatialIndex {
    clusters: RwLock<HashMap<ClusterId, LocationCluster>>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with a snapshot from the store
    pub fn load(&self, clusters: Vec<LocationCluster>) {
        let mut guard = self.clusters.write();
        guard.clear();
        guard.extend(clusters.into_iter().map(|c| (c.id, c)));
    }

    pub fn nearest_within(&self, latitude: f64, longitude: f64, epsilon_deg: f64) -> Option<LocationCluster> {
        let guard = self.clusters.read();
        nearest_candidate(guard.values(), latitude, longitude, epsilon_deg).cloned()
    }

    /// Insert or refresh a committed cluster row
    pub fn apply(&self, cluster: LocationCluster) {
        self.clusters.write().insert(cluster.id, cluster);
    }

    pub fn get(&self, id: ClusterId) -> Option<LocationCluster> {
        self.clusters.read().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.clusters.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(id: ClusterId, lat: f64, lon: f64) -> LocationCluster {
        LocationCluster {
            id,
            ..LocationCluster::seeded(lat, lon, 25.0, 1_000)
        }
    }

    #[test]
    fn test_nearest_of_several_matches() {
        let index = SpatialIndex::new();
        index.load(vec![cluster(1, 37.0008, -122.0), cluster(2, 37.0002, -122.0)]);

        let hit = index.nearest_within(37.0, -122.0, 0.001).unwrap();
        assert_eq!(hit.id, 2);
    }

    #[test]
    fn test_outside_epsilon_misses() {
        let index = SpatialIndex::new();
        index.load(vec![cluster(1, 37.01, -122.0)]);
        assert!(index.nearest_within(37.0, -122.0, 0.001).is_none());
    }

    #[test]
    fn test_apply_refreshes_row() {
        let index = SpatialIndex::new();
        index.apply(cluster(7, 10.0, 10.0));
        let mut moved = cluster(7, 10.0005, 10.0);
        moved.visit_count = 2;
        index.apply(moved);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(7).unwrap().visit_count, 2);
    }
}

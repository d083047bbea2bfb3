//! Cluster Module - Places
//!
//! ## Structure
//! - `types`: LocationCluster, ClusterResolution
//! - `geo`: distance and quantization helpers
//! - `index`: shared in-memory SpatialIndex
//! - `engine`: ClusteringEngine (assign sighting -> cluster)

pub mod types;
pub mod geo;
pub mod index;
pub mod engine;

pub use types::{ClusterId, ClusterResolution, LocationCluster};
pub use index::{nearest_candidate, SpatialIndex};
pub use engine::ClusteringEngine;

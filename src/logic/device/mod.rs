//! Device Module
//!
//! ## Structure
//! - `types`: DetectedDevice, DeviceSighting, DeviceClass
//! - `identity`: hardware address normalisation
//! - `aggregate`: DeviceAggregates (running per-device statistics)

pub mod types;
pub mod identity;
pub mod aggregate;

pub use types::{DetectedDevice, DeviceClass, DeviceSighting, SightingId};
pub use identity::normalize_identity;
pub use aggregate::{DeviceAggregateDelta, DeviceAggregates, ObservedTraits};

//! Per-identity serialization
//!
//! One mutex per device identity; ingests, moderation and retention for the
//! same device queue on it while different devices proceed in parallel.
//! Idle entries are pruned once the table grows past `PRUNE_THRESHOLD`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

const PRUNE_THRESHOLD: usize = 1024;

/// Held for the duration of one device-scoped operation
pub type DeviceGuard = ArcMutexGuard<RawMutex, ()>;

#[derive(Default)]
pub struct DeviceLocks {
    table: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeviceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `device_id` is free
    pub fn acquire(&self, device_id: &str) -> DeviceGuard {
        let entry = {
            let mut table = self.table.lock();
            if table.len() >= PRUNE_THRESHOLD {
                // nobody but the table holds it
                table.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            table
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_arc()
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.lock().is_empty()
    }
}

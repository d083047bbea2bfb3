//! Retention Sweeper
//!
//! Deletes devices not seen within the device TTL (never whitelisted or
//! flagged ones) and sightings older than the sighting TTL. Alerts are
//! kept. Each device is deleted in its own transaction under its identity
//! lock, and staleness is re-checked at delete time so a device that was
//! just sighted again survives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;

use crate::logic::events::{ChangeSet, Collection};
use crate::logic::ingest::IngestPipeline;
use crate::logic::store::Store;
use crate::logic::{now_millis, EpochMillis};

/// Stop flag is polled at least this often while idle
const STOP_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub devices_deleted: usize,
    pub sightings_deleted: usize,
    /// Stopped early on request
    pub cancelled: bool,
    /// Store failures that were logged and skipped
    pub errors: usize,
}

pub struct RetentionSweeper<S: Store> {
    pipeline: Arc<IngestPipeline<S>>,
    batch_size: usize,
}

impl<S: Store + 'static> RetentionSweeper<S> {
    pub fn new(pipeline: Arc<IngestPipeline<S>>, batch_size: usize) -> Self {
        Self {
            pipeline,
            batch_size: batch_size.max(1),
        }
    }

    /// One pass. Never fails: store errors are logged and counted.
    pub fn sweep(
        &self,
        now: EpochMillis,
        device_ttl_ms: i64,
        sighting_ttl_ms: i64,
        cancel: &AtomicBool,
    ) -> SweepReport {
        let store = self.pipeline.store();
        let device_cutoff = now - device_ttl_ms;
        let sighting_cutoff = now - sighting_ttl_ms;
        let mut report = SweepReport::default();

        'batches: loop {
            if cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }

            let batch = match store.transaction(|tx| tx.stale_device_ids(device_cutoff, self.batch_size)) {
                Ok(ids) => ids,
                Err(e) => {
                    log::warn!("Retention: listing stale devices failed: {}", e);
                    report.errors += 1;
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }

            let mut progressed = false;
            for device_id in batch {
                if cancel.load(Ordering::SeqCst) {
                    report.cancelled = true;
                    break 'batches;
                }

                let _guard = self.pipeline.lock_device(&device_id);
                match store.transaction(|tx| tx.delete_device_if_stale(&device_id, device_cutoff)) {
                    Ok(true) => {
                        report.devices_deleted += 1;
                        progressed = true;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        log::warn!("Retention: deleting {} failed: {}", device_id, e);
                        report.errors += 1;
                    }
                }
            }

            // Only failing rows left; retry next tick
            if !progressed {
                break;
            }
        }

        if !report.cancelled {
            match store.transaction(|tx| tx.delete_sightings_older_than(sighting_cutoff)) {
                Ok(n) => report.sightings_deleted = n,
                Err(e) => {
                    log::warn!("Retention: deleting old sightings failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        if report.devices_deleted > 0 || report.sightings_deleted > 0 {
            self.pipeline.publish(
                ChangeSet::new()
                    .with(Collection::Devices)
                    .with(Collection::SuspiciousDevices),
            );
            log::info!(
                "Retention sweep removed {} devices and {} sightings",
                report.devices_deleted,
                report.sightings_deleted
            );
        }

        report
    }

    /// Run `sweep` every `interval` on a background thread until stopped
    pub fn spawn(self, interval: Duration, device_ttl_ms: i64, sighting_ttl_ms: i64) -> SweeperHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();

        let thread = thread::spawn(move || {
            log::info!("Retention sweeper started (every {}s)", interval.as_secs());
            while !flag.load(Ordering::SeqCst) {
                let report = self.sweep(now_millis(), device_ttl_ms, sighting_ttl_ms, &flag);
                if report.errors > 0 {
                    log::warn!("Retention sweep finished with {} errors", report.errors);
                }

                let mut waited = Duration::ZERO;
                while waited < interval && !flag.load(Ordering::SeqCst) {
                    let step = STOP_POLL.min(interval - waited);
                    thread::sleep(step);
                    waited += step;
                }
            }
            log::info!("Retention sweeper stopped");
        });

        SweeperHandle {
            stop,
            thread: Some(thread),
        }
    }
}

/// Stops the background sweeper when asked (or dropped)
pub struct SweeperHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Signal the sweeper and wait for the current pass to end
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Retention sweeper thread panicked");
            }
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

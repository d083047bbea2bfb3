//! Ingestion Pipeline
//!
//! validate -> lock identity -> tx A (cluster, sighting, aggregates, score,
//! device) -> commit -> spatial index -> tx B (alert + edge state) -> publish.
//!
//! A failure in A leaves no trace. A failure in B keeps A: the device keeps
//! its score but `alerted_level` does not move, so the next ingest for the
//! same device raises the alert again.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::locks::{DeviceGuard, DeviceLocks};
use super::types::{IngestError, IngestOutcome, Observation};
use crate::logic::cluster::{ClusterResolution, ClusteringEngine, SpatialIndex};
use crate::logic::config::EngineConfig;
use crate::logic::device::{DetectedDevice, DeviceAggregates, DeviceSighting, ObservedTraits};
use crate::logic::events::{ChangeFeed, ChangeSet, Collection};
use crate::logic::store::{Store, StoreError, StoreTx};
use crate::logic::threat::{detect_tracker, ScoreOutcome, ThreatAlert, ThreatLevel, ThreatScorer, TrackerMatch};
use crate::logic::EpochMillis;

/// Everything transaction A produced
struct Committed {
    sighting: DeviceSighting,
    cluster: ClusterResolution,
    device: DetectedDevice,
    device_created: bool,
    previous_level: ThreatLevel,
    outcome: ScoreOutcome,
}

pub struct IngestPipeline<S: Store> {
    store: Arc<S>,
    config: EngineConfig,
    index: Arc<SpatialIndex>,
    clustering: ClusteringEngine,
    aggregates: DeviceAggregates,
    scorer: ThreatScorer,
    locks: DeviceLocks,
    feed: ChangeFeed,
}

impl<S: Store> IngestPipeline<S> {
    /// Build the pipeline and warm the spatial index from the store
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self, StoreError> {
        let index = Arc::new(SpatialIndex::new());
        let clusters = store.transaction(|tx| tx.list_clusters())?;
        log::info!("Spatial index loaded with {} places", clusters.len());
        index.load(clusters);

        Ok(Self {
            clustering: ClusteringEngine::new(
                config.cluster_epsilon_deg,
                config.min_cluster_radius_m,
                index.clone(),
            ),
            aggregates: DeviceAggregates::new(config.location_precision),
            scorer: ThreatScorer::new(config.scoring.clone()),
            locks: DeviceLocks::new(),
            feed: ChangeFeed::new(config.change_feed_capacity),
            store,
            config,
            index,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Change sets published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeSet> {
        self.feed.subscribe()
    }

    pub(crate) fn lock_device(&self, device_id: &str) -> DeviceGuard {
        self.locks.acquire(device_id)
    }

    pub(crate) fn publish(&self, changes: ChangeSet) {
        self.feed.publish(changes);
    }

    // ========================================================================
    // INGEST
    // ========================================================================

    /// Record one observation.
    pub fn ingest(&self, observation: &Observation) -> Result<IngestOutcome, IngestError> {
        let device_id = observation.validate()?;
        let tracker = detect_tracker(observation.manufacturer_data.as_deref(), &observation.service_uuids)
            .filter(TrackerMatch::is_conclusive);

        let _guard = self.lock_device(&device_id);

        let committed = self
            .store
            .transaction(|tx| self.apply_sighting(tx, &device_id, observation, tracker.as_ref()))
            .map_err(|e| {
                log::warn!("Ingest for {} rolled back: {}", device_id, e);
                IngestError::from(e)
            })?;

        self.index.apply(committed.cluster.cluster.clone());

        let mut changes = ChangeSet::new()
            .with(Collection::Devices)
            .with(Collection::Clusters);
        if committed.outcome.level.is_suspicious() || committed.previous_level.is_suspicious() {
            changes.insert(Collection::SuspiciousDevices);
        }

        let mut alert = None;
        let mut alert_pending = false;
        if committed.outcome.crossed_threshold {
            match self.store.transaction(|tx| record_alert(tx, &committed)) {
                Ok(recorded) => {
                    log::warn!(
                        "ALERT #{}: {} is {} (score {:.1}, {} places, {} sightings)",
                        recorded.id,
                        recorded.device_id,
                        recorded.threat_level,
                        recorded.threat_score,
                        committed.device.place_count,
                        recorded.sighting_count
                    );
                    changes.insert(Collection::Alerts);
                    changes.insert(Collection::UnacknowledgedAlerts);
                    alert = Some(recorded);
                }
                Err(e) => {
                    log::error!("Alert for {} not recorded, will retry on next sighting: {}", device_id, e);
                    alert_pending = true;
                }
            }
        }

        self.publish(changes);

        log::debug!(
            "{} -> place #{} (places={}, locations={}, score={:.1} {})",
            device_id,
            committed.cluster.cluster.id,
            committed.device.place_count,
            committed.device.location_count,
            committed.outcome.score,
            committed.outcome.level
        );

        Ok(IngestOutcome {
            device_id,
            sighting_id: committed.sighting.id,
            cluster_id: committed.cluster.cluster.id,
            cluster_created: committed.cluster.created,
            device_created: committed.device_created,
            detection_count: committed.device.detection_count,
            location_count: committed.device.location_count,
            place_count: committed.device.place_count,
            score: committed.outcome.score,
            level: committed.outcome.level,
            alert,
            alert_pending,
        })
    }

    /// Transaction A
    fn apply_sighting(
        &self,
        tx: &mut dyn StoreTx,
        device_id: &str,
        obs: &Observation,
        tracker: Option<&TrackerMatch>,
    ) -> Result<Committed, StoreError> {
        let cluster = self
            .clustering
            .resolve_cluster(tx, obs.latitude, obs.longitude, obs.accuracy, obs.timestamp)?;

        let (lat_q, lon_q) = self.aggregates.quantize(obs.latitude, obs.longitude);
        let mut sighting = DeviceSighting {
            id: 0,
            device_id: device_id.to_string(),
            timestamp: obs.timestamp,
            latitude: obs.latitude,
            longitude: obs.longitude,
            accuracy: obs.accuracy,
            rssi: obs.rssi,
            device_class: obs.device_class,
            probed_ssid: obs.probed_ssid.clone(),
            ap_ssid: obs.ap_ssid.clone(),
            channel: obs.channel,
            frequency: obs.frequency,
            cluster_id: cluster.cluster.id,
            lat_q,
            lon_q,
        };
        sighting.id = tx.append_sighting(&sighting)?;

        let traits = ObservedTraits {
            name: obs.name.as_deref(),
            subclass: obs.subclass,
        };
        let delta = self.aggregates.upsert_on_sighting(tx, &sighting, traits)?;
        let previous_level = delta.device.threat_level;
        let mut device = delta.device;

        if let Some(hit) = tracker {
            if device.tracker.is_none() {
                log::warn!(
                    "Known tracker {} ({}, confidence {:.2})",
                    device.id,
                    hit.description,
                    hit.confidence
                );
                device.tracker = Some(hit.description.clone());
            }
        }

        let recent = tx.sightings_for_device(&device.id, self.scorer.rules().pattern_window_start(device.last_seen))?;
        let outcome = self.scorer.recompute_score(&device, &recent, obs.timestamp);
        device.threat_score = outcome.score;
        device.threat_level = outcome.level;
        if let Some(level) = outcome.rearm_to {
            device.alerted_level = level;
        }
        device.revision = tx.put_device(&device)?;

        Ok(Committed {
            sighting,
            cluster,
            device,
            device_created: delta.created,
            previous_level,
            outcome,
        })
    }

    // ========================================================================
    // RE-SCORING
    // ========================================================================

    /// Recompute a stored device's score against `now` (decay only).
    ///
    /// Lowers the stored score and re-arms alerting when the level has
    /// dropped; never records an alert. `None` when the device is unknown.
    pub fn rescore(&self, device_id: &str, now: EpochMillis) -> Result<Option<ScoreOutcome>, IngestError> {
        let _guard = self.lock_device(device_id);

        let result = self.store.transaction(|tx| {
            let Some(mut device) = tx.get_device(device_id)? else {
                return Ok(None);
            };
            let previous_level = device.threat_level;
            let recent = tx.sightings_for_device(&device.id, self.scorer.rules().pattern_window_start(device.last_seen))?;
            let outcome = self.scorer.recompute_score(&device, &recent, now);

            device.threat_score = outcome.score;
            device.threat_level = outcome.level;
            if let Some(level) = outcome.rearm_to {
                device.alerted_level = level;
            }
            tx.put_device(&device)?;
            Ok(Some((previous_level, outcome)))
        })?;

        let Some((previous_level, outcome)) = result else {
            return Ok(None);
        };

        let mut changes = ChangeSet::new().with(Collection::Devices);
        if previous_level.is_suspicious() || outcome.level.is_suspicious() {
            changes.insert(Collection::SuspiciousDevices);
        }
        self.publish(changes);
        Ok(Some(outcome))
    }
}

/// Transaction B: append the alert and advance the edge state
fn record_alert(tx: &mut dyn StoreTx, committed: &Committed) -> Result<ThreatAlert, StoreError> {
    let mut device = tx
        .get_device(&committed.device.id)?
        .ok_or_else(|| StoreError::not_found("device", &committed.device.id))?;

    let mut alert = ThreatAlert {
        id: 0,
        device_id: device.id.clone(),
        device_name: device.name.clone(),
        device_class: device.device_class,
        timestamp: committed.sighting.timestamp,
        threat_score: committed.outcome.score,
        threat_level: committed.outcome.level,
        latitude: committed.sighting.latitude,
        longitude: committed.sighting.longitude,
        sighting_count: device.detection_count,
        location_count: device.location_count,
        follow_duration_ms: device.follow_duration_ms(),
        acknowledged: false,
        user_action: Default::default(),
        reason: committed.outcome.breakdown.tracker.clone(),
    };
    alert.id = tx.append_alert(&alert)?;

    device.alerted_level = committed.outcome.level;
    tx.put_device(&device)?;
    Ok(alert)
}

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::constants::{MS_PER_DAY, MS_PER_HOUR};
use crate::logic::config::EngineConfig;
use crate::logic::device::DeviceClass;
use crate::logic::events::Collection;
use crate::logic::store::{MemoryStore, SqliteStore, Store, StoreError};
use crate::logic::threat::{AlertAction, ThreatLevel};
use crate::logic::views;
use crate::logic::EpochMillis;

const START: EpochMillis = 1_700_000_000_000;
const FOLLOWER: &str = "AA:BB:CC:DD:EE:FF";

/// Three towns roughly 7 km apart
const ROUTE: [(f64, f64); 3] = [(37.0, -122.0), (37.05, -122.05), (37.1, -122.1)];

fn pipeline() -> IngestPipeline<MemoryStore> {
    IngestPipeline::new(Arc::new(MemoryStore::new()), EngineConfig::default()).unwrap()
}

fn observation(id: &str, ts: EpochMillis, (lat, lon): (f64, f64)) -> Observation {
    Observation {
        device_id: id.to_string(),
        device_class: DeviceClass::BluetoothLe,
        timestamp: ts,
        latitude: lat,
        longitude: lon,
        accuracy: 10.0,
        rssi: -65,
        ..Default::default()
    }
}

/// One sighting per day along the route
fn follow_route<S: Store>(pipeline: &IngestPipeline<S>, id: &str) -> Vec<IngestOutcome> {
    ROUTE
        .iter()
        .enumerate()
        .map(|(day, &point)| {
            pipeline
                .ingest(&observation(id, START + day as i64 * MS_PER_DAY, point))
                .unwrap()
        })
        .collect()
}

fn airtag_payload() -> Vec<u8> {
    vec![0x4C, 0x00, 0x12, 0x19, 0x10, 0x00, 0x00, 0x00]
}

// ============================================================================
// FOLLOWING
// ============================================================================

#[test]
fn test_device_following_across_three_places_alerts_once() {
    let pipeline = pipeline();
    let outcomes = follow_route(&pipeline, "aa:bb:cc:dd:ee:ff");

    assert!(outcomes.iter().all(|o| o.device_id == FOLLOWER));
    assert!(outcomes.iter().all(|o| o.cluster_created));
    assert!(outcomes[0].device_created);
    assert!(!outcomes[1].device_created);
    assert!(outcomes[0].alert.is_none());
    assert!(outcomes[1].alert.is_none());

    let last = &outcomes[2];
    assert_eq!(last.place_count, 3);
    assert_eq!(last.location_count, 3);
    assert_eq!(last.detection_count, 3);
    assert!((last.score - 51.5).abs() < 0.01, "score {}", last.score);
    assert_eq!(last.level, ThreatLevel::Medium);

    let alert = last.alert.as_ref().unwrap();
    assert_eq!(alert.device_id, FOLLOWER);
    assert_eq!(alert.sighting_count, 3);
    assert_eq!(alert.location_count, 3);
    assert_eq!(alert.follow_duration_ms, 2 * MS_PER_DAY);
    assert_eq!(alert.threat_level, ThreatLevel::Medium);
    assert!(!alert.acknowledged);

    let store: &MemoryStore = pipeline.store();
    assert_eq!(views::alerts_for_device(store, FOLLOWER).unwrap().len(), 1);
    let device = views::device(store, FOLLOWER).unwrap().unwrap();
    assert_eq!(device.alerted_level, ThreatLevel::Medium);
    assert_eq!(pipeline.index().len(), 3);
}

#[test]
fn test_repeat_sightings_at_known_place_do_not_realert() {
    let pipeline = pipeline();
    follow_route(&pipeline, FOLLOWER);

    let base = START + 2 * MS_PER_DAY;
    let mut last = None;
    for i in 1..=50 {
        let outcome = pipeline
            .ingest(&observation(FOLLOWER, base + i * 60_000, ROUTE[0]))
            .unwrap();
        assert!(outcome.alert.is_none(), "sighting {} alerted", i);
        assert!(!outcome.cluster_created);
        last = Some(outcome);
    }

    let last = last.unwrap();
    assert_eq!(last.location_count, 3);
    assert_eq!(last.place_count, 3);
    assert_eq!(last.detection_count, 53);
    assert!(last.level >= ThreatLevel::Medium);

    let store: &MemoryStore = pipeline.store();
    assert_eq!(views::alerts_for_device(store, FOLLOWER).unwrap().len(), 1);
}

#[test]
fn test_stationary_device_stays_low() {
    let pipeline = pipeline();
    let mut last = None;
    for i in 0..20 {
        last = Some(
            pipeline
                .ingest(&observation("11:22:33:44:55:66", START + i * MS_PER_HOUR, ROUTE[0]))
                .unwrap(),
        );
    }

    let last = last.unwrap();
    assert_eq!(last.location_count, 1);
    assert_eq!(last.place_count, 1);
    assert_eq!(last.level, ThreatLevel::Low);
    assert!(last.alert.is_none());

    let store: &MemoryStore = pipeline.store();
    assert_eq!(views::sightings_for_device(store, "11:22:33:44:55:66", 0).unwrap().len(), 20);
}

#[test]
fn test_whitelisted_device_never_alerts() {
    let pipeline = pipeline();
    pipeline
        .ingest(&observation(FOLLOWER, START, ROUTE[0]))
        .unwrap();
    pipeline.set_whitelisted(FOLLOWER, true).unwrap();

    for (day, &point) in ROUTE.iter().enumerate().skip(1) {
        let outcome = pipeline
            .ingest(&observation(FOLLOWER, START + day as i64 * MS_PER_DAY, point))
            .unwrap();
        assert!(outcome.alert.is_none());
    }

    let store: &MemoryStore = pipeline.store();
    let device = views::device(store, FOLLOWER).unwrap().unwrap();
    assert!(device.is_whitelisted);
    assert!(device.threat_score >= 31.0);
    assert!(views::alerts_for_device(store, FOLLOWER).unwrap().is_empty());
}

#[test]
fn test_steady_signal_on_same_route_scores_higher() {
    let pipeline = pipeline();
    let places = [ROUTE[0], ROUTE[1], ROUTE[2], (37.15, -122.15)];
    let drive = |id: &str, rssi: [i32; 4]| {
        let mut last = None;
        for (i, &point) in places.iter().enumerate() {
            let mut obs = observation(id, START + i as i64 * 20 * 60_000, point);
            obs.rssi = rssi[i];
            last = Some(pipeline.ingest(&obs).unwrap());
        }
        last.unwrap()
    };

    let steady = drive("11:00:00:00:00:01", [-60, -60, -60, -60]);
    let erratic = drive("11:00:00:00:00:02", [-40, -95, -40, -95]);

    assert_eq!(steady.place_count, erratic.place_count);
    assert!(steady.score < 100.0);
    assert!((steady.score / erratic.score - 1.15).abs() < 1e-3, "{} vs {}", steady.score, erratic.score);
}

// ============================================================================
// FAILURES
// ============================================================================

#[test]
fn test_alert_failure_retries_on_next_sighting() {
    let pipeline = pipeline();
    pipeline.ingest(&observation(FOLLOWER, START, ROUTE[0])).unwrap();
    pipeline
        .ingest(&observation(FOLLOWER, START + MS_PER_DAY, ROUTE[1]))
        .unwrap();

    pipeline.store().fail_next_alert_appends(1);
    let outcome = pipeline
        .ingest(&observation(FOLLOWER, START + 2 * MS_PER_DAY, ROUTE[2]))
        .unwrap();
    assert!(outcome.alert_pending);
    assert!(outcome.alert.is_none());

    // the sighting and score survived
    let store: &MemoryStore = pipeline.store();
    let device = views::device(store, FOLLOWER).unwrap().unwrap();
    assert_eq!(device.detection_count, 3);
    assert_eq!(device.threat_level, ThreatLevel::Medium);
    assert_eq!(device.alerted_level, ThreatLevel::Low);

    let retry = pipeline
        .ingest(&observation(FOLLOWER, START + 2 * MS_PER_DAY + 60_000, ROUTE[2]))
        .unwrap();
    assert!(!retry.alert_pending);
    assert!(retry.alert.is_some());
    assert_eq!(views::alerts_for_device(store, FOLLOWER).unwrap().len(), 1);
}

#[test]
fn test_invalid_observation_persists_nothing() {
    let pipeline = pipeline();
    let mut bad = observation(FOLLOWER, START, ROUTE[0]);
    bad.latitude = 123.0;

    match pipeline.ingest(&bad) {
        Err(e @ IngestError::InvalidSighting(_)) => assert!(!e.is_transient()),
        other => panic!("expected rejection, got {:?}", other),
    }

    let store: &MemoryStore = pipeline.store();
    let stats = views::dashboard_stats(store, 0, 31.0).unwrap();
    assert_eq!(stats, views::DashboardStats::default());
    assert!(pipeline.index().is_empty());
}

#[test]
fn test_store_conflict_maps_to_concurrency_error() {
    let err = IngestError::from(StoreError::Conflict(FOLLOWER.to_string()));
    assert!(matches!(err, IngestError::ConcurrencyConflict(_)));
    assert!(!err.is_transient());
}

#[test]
fn test_unreadable_device_row_is_not_retried() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let pipeline = IngestPipeline::new(store.clone(), EngineConfig::default()).unwrap();
    pipeline.ingest(&observation(FOLLOWER, START, ROUTE[0])).unwrap();
    store
        .execute_raw("UPDATE detected_devices SET device_class = 'ZIGBEE' WHERE id = 'AA:BB:CC:DD:EE:FF'")
        .unwrap();

    match pipeline.ingest(&observation(FOLLOWER, START + MS_PER_HOUR, ROUTE[1])) {
        Err(e @ IngestError::StoreUnavailable(StoreError::Quarantined { .. })) => assert!(!e.is_transient()),
        other => panic!("expected quarantined row, got {:?}", other),
    }
    // the failed sighting rolled back
    let store: &SqliteStore = pipeline.store();
    assert_eq!(views::sightings_for_device(store, FOLLOWER, 0).unwrap().len(), 1);
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_concurrent_ingest_same_device_counts_exactly() {
    let pipeline = Arc::new(pipeline());
    let threads = 8;
    let per_thread = 25;

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let pipeline = pipeline.clone();
            thread::spawn(move || {
                for i in 0..per_thread {
                    // spaced wider than the pattern window so the score only grows
                    let ts = START + (t * per_thread + i) as i64 * 7 * MS_PER_HOUR;
                    let point = ROUTE[(i % 3) as usize];
                    pipeline.ingest(&observation(FOLLOWER, ts, point)).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let store: &MemoryStore = pipeline.store();
    let device = views::device(store, FOLLOWER).unwrap().unwrap();
    assert_eq!(device.detection_count, threads * per_thread);
    assert_eq!(device.place_count, 3);
    assert_eq!(device.first_seen, START);
    assert_eq!(
        views::sightings_for_device(store, FOLLOWER, 0).unwrap().len() as u32,
        threads * per_thread
    );
    assert!(views::alerts_for_device(store, FOLLOWER).unwrap().len() <= 1);
}

// ============================================================================
// TRACKERS
// ============================================================================

#[test]
fn test_known_tracker_alerts_once_at_critical() {
    let pipeline = pipeline();
    let mut obs = observation("C0:FF:EE:00:00:01", START, ROUTE[0]);
    obs.manufacturer_data = Some(airtag_payload());

    let first = pipeline.ingest(&obs).unwrap();
    assert_eq!(first.level, ThreatLevel::Critical);
    let alert = first.alert.unwrap();
    assert_eq!(alert.reason.as_deref(), Some("Apple AirTag"));

    // signature sticks even when later advertisements omit it
    obs.timestamp += MS_PER_HOUR;
    obs.manufacturer_data = None;
    let second = pipeline.ingest(&obs).unwrap();
    assert_eq!(second.level, ThreatLevel::Critical);
    assert!(second.alert.is_none());

    let store: &MemoryStore = pipeline.store();
    let device = views::device(store, "C0:FF:EE:00:00:01").unwrap().unwrap();
    assert_eq!(device.tracker.as_deref(), Some("Apple AirTag"));
}

#[test]
fn test_weak_tracker_hint_uses_normal_scoring() {
    let pipeline = pipeline();
    let mut payload = vec![0u8; 29];
    payload[0] = 0x4C;
    payload[2] = 0x01;
    payload[3] = 0x10;
    let mut obs = observation("C0:FF:EE:00:00:02", START, ROUTE[0]);
    obs.manufacturer_data = Some(payload);

    let outcome = pipeline.ingest(&obs).unwrap();
    assert_eq!(outcome.level, ThreatLevel::Low);
    assert!(outcome.alert.is_none());
}

// ============================================================================
// RE-SCORING & MODERATION
// ============================================================================

#[test]
fn test_rescore_decays_and_rearms() {
    let pipeline = pipeline();
    follow_route(&pipeline, FOLLOWER);
    let last_seen = START + 2 * MS_PER_DAY;

    let decayed = pipeline
        .rescore(FOLLOWER, last_seen + 20 * MS_PER_HOUR)
        .unwrap()
        .unwrap();
    assert!(decayed.score < 31.0);
    assert_eq!(decayed.level, ThreatLevel::Low);
    assert!(!decayed.crossed_threshold);

    let store: &MemoryStore = pipeline.store();
    let device = views::device(store, FOLLOWER).unwrap().unwrap();
    assert_eq!(device.alerted_level, ThreatLevel::Low);
    assert_eq!(views::alerts_for_device(store, FOLLOWER).unwrap().len(), 1);

    // following resumes at a fourth place
    let outcome = pipeline
        .ingest(&observation(FOLLOWER, START + 3 * MS_PER_DAY, (37.15, -122.15)))
        .unwrap();
    assert!(outcome.alert.is_some());
    assert_eq!(views::alerts_for_device(store, FOLLOWER).unwrap().len(), 2);

    assert!(pipeline.rescore("00:00:00:00:00:00", START).unwrap().is_none());
}

#[test]
fn test_alert_action_whitelists_device() {
    let pipeline = pipeline();
    let alert = follow_route(&pipeline, FOLLOWER)[2].alert.clone().unwrap();

    let updated = pipeline.set_alert_action(alert.id, AlertAction::Whitelisted).unwrap();
    assert!(updated.acknowledged);
    assert_eq!(updated.user_action, AlertAction::Whitelisted);

    let store: &MemoryStore = pipeline.store();
    assert!(views::device(store, FOLLOWER).unwrap().unwrap().is_whitelisted);
    assert!(views::unacknowledged_alerts(store).unwrap().is_empty());
    assert_eq!(views::alerts_for_device(store, FOLLOWER).unwrap().len(), 1);

    assert!(matches!(
        pipeline.set_alert_action(9_999, AlertAction::Flagged),
        Err(StoreError::NotFound { .. })
    ));
}

#[test]
fn test_acknowledge_alert() {
    let pipeline = pipeline();
    let alert = follow_route(&pipeline, FOLLOWER)[2].alert.clone().unwrap();

    let acked = pipeline.acknowledge_alert(alert.id).unwrap();
    assert!(acked.acknowledged);
    assert_eq!(acked.user_action, AlertAction::None);

    let store: &MemoryStore = pipeline.store();
    assert_eq!(views::dashboard_stats(store, 0, 31.0).unwrap().unacknowledged_alerts, 0);
}

// ============================================================================
// CHANGE FEED
// ============================================================================

#[test]
fn test_change_feed_reports_alerts() {
    let pipeline = pipeline();
    let mut rx = pipeline.subscribe();
    follow_route(&pipeline, FOLLOWER);

    let mut sets = Vec::new();
    while let Ok(set) = rx.try_recv() {
        sets.push(set);
    }
    assert_eq!(sets.len(), 3);
    assert!(sets.iter().all(|s| s.contains(Collection::Devices)));
    assert!(!sets[0].contains(Collection::Alerts));
    assert!(sets[2].contains(Collection::Alerts));
    assert!(sets[2].contains(Collection::SuspiciousDevices));
}

// ============================================================================
// SQLITE
// ============================================================================

#[test]
fn test_pipeline_on_sqlite_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("follower.db");

    {
        let store = Arc::new(SqliteStore::open(&path, Duration::from_secs(1)).unwrap());
        let pipeline = IngestPipeline::new(store, EngineConfig::default()).unwrap();
        let outcomes = follow_route(&pipeline, FOLLOWER);
        assert!(outcomes[2].alert.is_some());
    }

    let store = Arc::new(SqliteStore::open(&path, Duration::from_secs(1)).unwrap());
    let pipeline = IngestPipeline::new(store, EngineConfig::default()).unwrap();
    assert_eq!(pipeline.index().len(), 3);

    // a fourth sighting lands in an existing place and does not re-alert
    let outcome = pipeline
        .ingest(&observation(FOLLOWER, START + 2 * MS_PER_DAY + 1_000, ROUTE[1]))
        .unwrap();
    assert!(!outcome.cluster_created);
    assert!(outcome.alert.is_none());
    assert_eq!(outcome.detection_count, 4);

    let store: &SqliteStore = pipeline.store();
    let stats = views::dashboard_stats(store, START, 31.0).unwrap();
    assert_eq!(stats.total_devices, 1);
    assert_eq!(stats.suspicious_devices, 1);
    assert_eq!(stats.sightings_since, 4);
    assert_eq!(stats.unacknowledged_alerts, 1);
}

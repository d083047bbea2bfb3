//! Threat Scorer
//!
//! Only scoring and edge detection - no persistence, no policy.
//! Input: DetectedDevice + its recent sightings (+ clock)
//! Output: ScoreOutcome

use super::rules::{
    ScoringRules, DETECTION_POINTS_EACH, MAX_DETECTION_POINTS, MAX_DURATION_POINTS, MAX_PLACE_POINTS,
    MAX_SCORE, PLACE_POINTS_PER_EXTRA, STATIC_PENALTY,
};
use super::pattern::{pattern_points, rssi_trajectory_modifier};
use super::types::{ScoreBreakdown, ScoreOutcome, ThreatLevel};
use crate::constants::MS_PER_HOUR;
use crate::logic::device::{DetectedDevice, DeviceSighting};
use crate::logic::EpochMillis;

pub struct ThreatScorer {
    rules: ScoringRules,
}

impl ThreatScorer {
    pub fn new(rules: ScoringRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ScoringRules {
        &self.rules
    }

    /// Score a device as of `now` and decide whether an alert is due.
    ///
    /// `sightings` are the device's sightings since
    /// `rules.pattern_window_start(device.last_seen)`, oldest first.
    /// Deterministic: same device + same sightings + same clock = same outcome.
    pub fn recompute_score(
        &self,
        device: &DetectedDevice,
        sightings: &[DeviceSighting],
        now: EpochMillis,
    ) -> ScoreOutcome {
        let (score, breakdown) = match &device.tracker {
            Some(description) => (
                MAX_SCORE,
                ScoreBreakdown {
                    rssi_modifier: 1.0,
                    static_penalty: 1.0,
                    recency_factor: 1.0,
                    tracker: Some(description.clone()),
                    ..Default::default()
                },
            ),
            None => self.formula(device, sightings, now),
        };

        let level = self.rules.level_for(score);
        let (crossed_threshold, rearm_to) = self.edge(device, level);

        ScoreOutcome {
            score,
            level,
            crossed_threshold,
            rearm_to,
            breakdown,
        }
    }

    fn formula(&self, device: &DetectedDevice, sightings: &[DeviceSighting], now: EpochMillis) -> (f32, ScoreBreakdown) {
        let places = device.place_count.max(1);
        let place_points = ((places - 1) as f32 * PLACE_POINTS_PER_EXTRA).min(MAX_PLACE_POINTS);

        let follow_hours = device.follow_duration_ms() as f32 / MS_PER_HOUR as f32;
        let duration_points = MAX_DURATION_POINTS * (follow_hours / self.rules.full_duration_hours).min(1.0);

        let detection_points = (device.detection_count as f32 * DETECTION_POINTS_EACH).min(MAX_DETECTION_POINTS);

        let pattern = pattern_points(sightings);
        let rssi_modifier = rssi_trajectory_modifier(sightings);

        let static_penalty = if places <= 1 { STATIC_PENALTY } else { 1.0 };

        let idle_hours = (now - device.last_seen).max(0) as f32 / MS_PER_HOUR as f32;
        let recency_factor = (1.0 - idle_hours / self.rules.recency_window_hours).clamp(0.0, 1.0);

        let raw = place_points + duration_points + detection_points + pattern.points;
        let score = (raw * rssi_modifier * static_penalty * recency_factor).clamp(0.0, MAX_SCORE);

        (
            score,
            ScoreBreakdown {
                place_points,
                duration_points,
                detection_points,
                pattern_points: pattern.points,
                reacquisitions: pattern.reacquisitions,
                route_order_ratio: pattern.route_order_ratio,
                rssi_modifier,
                static_penalty,
                recency_factor,
                tracker: None,
            },
        )
    }

    /// Rising-edge detection against the level of the last alert.
    ///
    /// Returns (alert due, new `alerted_level` when it has to drop).
    fn edge(&self, device: &DetectedDevice, level: ThreatLevel) -> (bool, Option<ThreatLevel>) {
        let rearm_to = if level < device.alerted_level { Some(level) } else { None };
        let armed_at = rearm_to.unwrap_or(device.alerted_level);

        if device.is_whitelisted || !level.is_suspicious() {
            return (false, rearm_to);
        }

        let escalates = level > armed_at && (self.rules.alert_on_escalation || device.tracker.is_some());
        let crossed = armed_at == ThreatLevel::Low || escalates;
        (crossed, rearm_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MS_PER_DAY;
    use crate::logic::device::DeviceClass;

    fn device(places: u32, detections: u32, follow_ms: i64) -> DetectedDevice {
        let mut d = DetectedDevice::first_seen_at("AA:BB:CC:DD:EE:FF", DeviceClass::BluetoothLe, 0, -60);
        d.place_count = places;
        d.location_count = places;
        d.detection_count = detections;
        d.last_seen = follow_ms;
        d
    }

    fn scorer() -> ThreatScorer {
        ThreatScorer::new(ScoringRules::default())
    }

    /// One sighting per place, 20 minutes apart, moving north
    fn route(rssi: &[i32]) -> Vec<DeviceSighting> {
        rssi.iter()
            .enumerate()
            .map(|(i, &rssi)| DeviceSighting {
                id: i as i64 + 1,
                device_id: "AA:BB:CC:DD:EE:FF".to_string(),
                timestamp: i as i64 * 20 * 60_000,
                latitude: 37.0 + i as f64 * 0.01,
                longitude: -122.0,
                accuracy: 10.0,
                rssi,
                device_class: DeviceClass::BluetoothLe,
                probed_ssid: None,
                ap_ssid: None,
                channel: None,
                frequency: None,
                cluster_id: i as i64 + 1,
                lat_q: 0,
                lon_q: 0,
            })
            .collect()
    }

    #[test]
    fn test_three_places_two_days() {
        let d = device(3, 3, 2 * MS_PER_DAY);
        let out = scorer().recompute_score(&d, &[], d.last_seen);

        assert!((out.score - 51.5).abs() < 0.01, "score {}", out.score);
        assert_eq!(out.level, ThreatLevel::Medium);
        assert!(out.crossed_threshold);
    }

    #[test]
    fn test_single_place_is_penalised() {
        let d = device(1, 200, 10 * MS_PER_DAY);
        let out = scorer().recompute_score(&d, &[], d.last_seen);

        // (0 + 30 + 20) * 0.3
        assert!((out.score - 15.0).abs() < 0.01);
        assert_eq!(out.level, ThreatLevel::Low);
        assert!(!out.crossed_threshold);
    }

    #[test]
    fn test_monotonic_in_places() {
        let s = scorer();
        let recent = route(&[-60, -61, -60, -59]);
        for sightings in [&[][..], &recent[..]] {
            let mut last = -1.0;
            for places in 1..=8 {
                let d = device(places, 10, MS_PER_DAY);
                let score = s.recompute_score(&d, sightings, d.last_seen).score;
                assert!(score >= last, "places {} dropped to {}", places, score);
                last = score;
            }
        }
    }

    #[test]
    fn test_leapfrog_route_adds_pattern_points() {
        let d = device(4, 4, MS_PER_HOUR);
        let s = scorer();
        let without = s.recompute_score(&d, &[], d.last_seen);
        let with = s.recompute_score(&d, &route(&[-40, -95, -40, -95]), d.last_seen);

        assert_eq!(with.breakdown.reacquisitions, 3);
        assert_eq!(with.breakdown.route_order_ratio, 1.0);
        assert_eq!(with.breakdown.pattern_points, 20.0);
        assert_eq!(with.breakdown.rssi_modifier, 1.0);
        assert!((with.score - without.score - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_steady_signal_scores_higher_on_same_route() {
        let d = device(4, 4, MS_PER_HOUR);
        let s = scorer();
        let steady = s.recompute_score(&d, &route(&[-60, -60, -60, -60]), d.last_seen);
        let erratic = s.recompute_score(&d, &route(&[-40, -95, -40, -95]), d.last_seen);

        assert_eq!(steady.breakdown.rssi_modifier, 1.15);
        assert_eq!(erratic.breakdown.rssi_modifier, 1.0);
        assert!(steady.score < MAX_SCORE);
        assert!((steady.score / erratic.score - 1.15).abs() < 1e-4);
    }

    #[test]
    fn test_tracker_breakdown_is_neutral() {
        let mut d = device(1, 1, 0);
        d.tracker = Some("Tile".to_string());
        let out = scorer().recompute_score(&d, &route(&[-60, -60, -60, -60]), d.last_seen);
        assert_eq!(out.breakdown.rssi_modifier, 1.0);
        assert_eq!(out.breakdown.pattern_points, 0.0);
    }

    #[test]
    fn test_recency_decay() {
        let d = device(4, 20, 3 * MS_PER_DAY);
        let s = scorer();
        let fresh = s.recompute_score(&d, &[], d.last_seen).score;
        let half = s.recompute_score(&d, &[], d.last_seen + 12 * MS_PER_HOUR).score;
        let gone = s.recompute_score(&d, &[], d.last_seen + 2 * MS_PER_DAY).score;

        assert!((half - fresh / 2.0).abs() < 0.01);
        assert_eq!(gone, 0.0);
    }

    #[test]
    fn test_no_realert_without_escalation() {
        let mut d = device(3, 40, 3 * MS_PER_DAY);
        d.alerted_level = ThreatLevel::Medium;
        let out = scorer().recompute_score(&d, &[], d.last_seen);

        assert_eq!(out.level, ThreatLevel::High);
        assert!(!out.crossed_threshold);
        assert_eq!(out.rearm_to, None);
    }

    #[test]
    fn test_escalation_when_enabled() {
        let mut d = device(3, 40, 3 * MS_PER_DAY);
        d.alerted_level = ThreatLevel::Medium;
        let s = ThreatScorer::new(ScoringRules {
            alert_on_escalation: true,
            ..Default::default()
        });
        assert!(s.recompute_score(&d, &[], d.last_seen).crossed_threshold);
    }

    #[test]
    fn test_rearm_after_drop() {
        let mut d = device(3, 3, 2 * MS_PER_DAY);
        d.alerted_level = ThreatLevel::Medium;

        let out = scorer().recompute_score(&d, &[], d.last_seen + 20 * MS_PER_HOUR);
        assert_eq!(out.level, ThreatLevel::Low);
        assert_eq!(out.rearm_to, Some(ThreatLevel::Low));
        assert!(!out.crossed_threshold);
    }

    #[test]
    fn test_whitelisted_never_crosses() {
        let mut d = device(6, 50, 4 * MS_PER_DAY);
        d.is_whitelisted = true;
        let out = scorer().recompute_score(&d, &[], d.last_seen);

        assert!(out.level.is_suspicious());
        assert!(!out.crossed_threshold);
    }

    #[test]
    fn test_tracker_pins_critical() {
        let mut d = device(1, 1, 0);
        d.tracker = Some("Apple AirTag".to_string());
        d.alerted_level = ThreatLevel::Medium;
        let out = scorer().recompute_score(&d, &[], d.last_seen);

        assert_eq!(out.score, 100.0);
        assert_eq!(out.level, ThreatLevel::Critical);
        assert!(out.crossed_threshold);
        assert_eq!(out.breakdown.tracker.as_deref(), Some("Apple AirTag"));
    }
}

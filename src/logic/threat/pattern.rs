//! Movement Pattern Analysis
//!
//! Looks at a device's recent sightings (oldest first) for the habits of a
//! follower: dropping out and reappearing at the next place, visiting
//! places in route order, and holding a steady signal while the user moves.
//! Places are the cluster ids the sightings were assigned at ingest.

use super::rules::{
    MAX_PATTERN_POINTS, MAX_REACQUISITION_POINTS, MAX_ROUTE_ORDER_POINTS, REACQUISITION_POINTS,
    RSSI_FAIR_MODIFIER, RSSI_FAIR_STDDEV, RSSI_MIN_PATH_M, RSSI_MIN_SAMPLES, RSSI_STEADY_MODIFIER,
    RSSI_STEADY_STDDEV, STREAK_GAP_MINUTES,
};
use crate::logic::cluster::{geo::haversine_m, ClusterId};
use crate::logic::device::DeviceSighting;

const STREAK_GAP_MS: i64 = STREAK_GAP_MINUTES * 60_000;

/// Pattern points and how they were earned
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PatternScore {
    pub reacquisitions: u32,
    /// Forward moves / all moves between places, 0.0 - 1.0
    pub route_order_ratio: f32,
    pub points: f32,
}

/// Reacquisition + route order points (0-20).
///
/// Needs at least three sightings over at least two places.
pub fn pattern_points(sightings: &[DeviceSighting]) -> PatternScore {
    let places = place_sequence(sightings);
    if sightings.len() < 3 || distinct(&places) < 2 {
        return PatternScore::default();
    }

    let reacquisitions = sightings
        .windows(2)
        .filter(|pair| pair[1].timestamp - pair[0].timestamp > STREAK_GAP_MS && pair[0].cluster_id != pair[1].cluster_id)
        .count() as u32;
    let reacquisition_points = (reacquisitions as f32 * REACQUISITION_POINTS).min(MAX_REACQUISITION_POINTS);

    let route_order_ratio = route_order_ratio(&places);
    let route_points = route_order_ratio * MAX_ROUTE_ORDER_POINTS;

    PatternScore {
        reacquisitions,
        route_order_ratio,
        points: (reacquisition_points + route_points).min(MAX_PATTERN_POINTS),
    }
}

/// Multiplier for a steady signal while moving (1.0 - 1.15).
///
/// A device travelling with the user keeps roughly the same RSSI; a fixed
/// one fades in and out as the user walks past.
pub fn rssi_trajectory_modifier(sightings: &[DeviceSighting]) -> f32 {
    if sightings.len() < RSSI_MIN_SAMPLES {
        return 1.0;
    }

    let path_m: f64 = sightings
        .windows(2)
        .map(|pair| haversine_m(pair[0].latitude, pair[0].longitude, pair[1].latitude, pair[1].longitude))
        .sum();
    if path_m < RSSI_MIN_PATH_M {
        return 1.0;
    }

    let n = sightings.len() as f32;
    let mean = sightings.iter().map(|s| s.rssi as f32).sum::<f32>() / n;
    let variance = sightings
        .iter()
        .map(|s| (s.rssi as f32 - mean).powi(2))
        .sum::<f32>()
        / n;
    let stddev = variance.sqrt();

    if stddev < RSSI_STEADY_STDDEV {
        RSSI_STEADY_MODIFIER
    } else if stddev < RSSI_FAIR_STDDEV {
        RSSI_FAIR_MODIFIER
    } else {
        1.0
    }
}

/// Places in visit order, consecutive repeats collapsed
fn place_sequence(sightings: &[DeviceSighting]) -> Vec<ClusterId> {
    let mut sequence: Vec<ClusterId> = Vec::new();
    for s in sightings {
        if sequence.last() != Some(&s.cluster_id) {
            sequence.push(s.cluster_id);
        }
    }
    sequence
}

fn distinct(sequence: &[ClusterId]) -> usize {
    let mut seen: Vec<ClusterId> = sequence.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Share of moves that go to a place first visited later than the current one
fn route_order_ratio(sequence: &[ClusterId]) -> f32 {
    let mut first_seen: Vec<ClusterId> = Vec::new();
    let order: Vec<usize> = sequence
        .iter()
        .map(|id| match first_seen.iter().position(|known| known == id) {
            Some(pos) => pos,
            None => {
                first_seen.push(*id);
                first_seen.len() - 1
            }
        })
        .collect();

    let moves = order.len().saturating_sub(1).max(1);
    let forward = order.windows(2).filter(|pair| pair[1] > pair[0]).count();
    forward as f32 / moves as f32
}

//! Threat Scoring Rules & Thresholds
//!
//! Weights and cutoffs for the follow score.
//! No scoring logic here - only constants and config.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CRITICAL_CUTOFF, DEFAULT_HIGH_CUTOFF, DEFAULT_SUSPICIOUS_CUTOFF, MS_PER_HOUR};
use crate::logic::EpochMillis;
use super::types::ThreatLevel;

// ============================================================================
// POINTS (0-100 total)
// ============================================================================

/// Points per distinct place beyond the first
pub const PLACE_POINTS_PER_EXTRA: f32 = 15.0;

/// Cap on place points (primary signal)
pub const MAX_PLACE_POINTS: f32 = 50.0;

/// Cap on follow-duration points
pub const MAX_DURATION_POINTS: f32 = 30.0;

/// Follow duration that earns full duration points
pub const FULL_DURATION_HOURS: f32 = 72.0;

/// Points per detection
pub const DETECTION_POINTS_EACH: f32 = 0.5;

/// Cap on detection points
pub const MAX_DETECTION_POINTS: f32 = 20.0;

pub const MAX_SCORE: f32 = 100.0;

// ============================================================================
// MODIFIERS
// ============================================================================

/// Multiplier for devices only ever seen at one place (neighbour APs, fixed beacons)
pub const STATIC_PENALTY: f32 = 0.3;

/// Score decays linearly to zero over this many hours since last seen
pub const RECENCY_WINDOW_HOURS: f32 = 24.0;

/// Minimum signature confidence for the known-tracker fast path
pub const TRACKER_CONFIDENCE_MIN: f32 = 0.7;

// ============================================================================
// MOVEMENT PATTERN (recent sightings only)
// ============================================================================

/// Sightings this close to the device's last sighting feed the pattern terms
pub const PATTERN_WINDOW_HOURS: f32 = 6.0;

/// A silence longer than this ends a streak
pub const STREAK_GAP_MINUTES: i64 = 10;

/// Points per reacquisition at a different place after a silence
pub const REACQUISITION_POINTS: f32 = 5.0;
pub const MAX_REACQUISITION_POINTS: f32 = 10.0;

/// Points for a place sequence that only ever moves forward
pub const MAX_ROUTE_ORDER_POINTS: f32 = 10.0;

/// Cap on reacquisition + route order points
pub const MAX_PATTERN_POINTS: f32 = 20.0;

/// RSSI steadiness needs at least this many samples...
pub const RSSI_MIN_SAMPLES: usize = 4;

/// ...spread over at least this much movement (metres)
pub const RSSI_MIN_PATH_M: f64 = 100.0;

/// Standard deviation (dB) under which RSSI counts as steady / fairly steady
pub const RSSI_STEADY_STDDEV: f32 = 5.0;
pub const RSSI_FAIR_STDDEV: f32 = 8.0;

pub const RSSI_STEADY_MODIFIER: f32 = 1.15;
pub const RSSI_FAIR_MODIFIER: f32 = 1.08;

// ============================================================================
// CONFIGURABLE RULES
// ============================================================================

/// Level boundaries and alerting policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringRules {
    /// At or above = suspicious (MEDIUM), alerts start here
    pub suspicious_cutoff: f32,
    /// At or above = HIGH
    pub high_cutoff: f32,
    /// At or above = CRITICAL
    pub critical_cutoff: f32,
    /// Also alert when an already-alerted device climbs to a higher level
    pub alert_on_escalation: bool,
    pub recency_window_hours: f32,
    pub full_duration_hours: f32,
    /// Look-back for the movement pattern and RSSI terms
    pub pattern_window_hours: f32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            suspicious_cutoff: DEFAULT_SUSPICIOUS_CUTOFF,
            high_cutoff: DEFAULT_HIGH_CUTOFF,
            critical_cutoff: DEFAULT_CRITICAL_CUTOFF,
            alert_on_escalation: false,
            recency_window_hours: RECENCY_WINDOW_HOURS,
            full_duration_hours: FULL_DURATION_HOURS,
            pattern_window_hours: PATTERN_WINDOW_HOURS,
        }
    }
}

impl ScoringRules {
    /// Map a score onto its level bucket
    pub fn level_for(&self, score: f32) -> ThreatLevel {
        if score >= self.critical_cutoff {
            ThreatLevel::Critical
        } else if score >= self.high_cutoff {
            ThreatLevel::High
        } else if score >= self.suspicious_cutoff {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }

    /// Cutoffs must be strictly increasing and inside the score range
    pub fn is_consistent(&self) -> bool {
        0.0 < self.suspicious_cutoff
            && self.suspicious_cutoff < self.high_cutoff
            && self.high_cutoff < self.critical_cutoff
            && self.critical_cutoff <= MAX_SCORE
            && self.recency_window_hours > 0.0
            && self.full_duration_hours > 0.0
            && self.pattern_window_hours > 0.0
    }

    /// Earliest sighting timestamp the pattern terms look at
    pub fn pattern_window_start(&self, last_seen: EpochMillis) -> EpochMillis {
        last_seen - (f64::from(self.pattern_window_hours) * MS_PER_HOUR as f64) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        let rules = ScoringRules::default();
        assert_eq!(rules.level_for(0.0), ThreatLevel::Low);
        assert_eq!(rules.level_for(30.9), ThreatLevel::Low);
        assert_eq!(rules.level_for(31.0), ThreatLevel::Medium);
        assert_eq!(rules.level_for(61.0), ThreatLevel::High);
        assert_eq!(rules.level_for(81.0), ThreatLevel::Critical);
        assert_eq!(rules.level_for(100.0), ThreatLevel::Critical);
    }

    #[test]
    fn test_inconsistent_cutoffs() {
        let rules = ScoringRules {
            high_cutoff: 20.0,
            ..Default::default()
        };
        assert!(!rules.is_consistent());
        assert!(ScoringRules::default().is_consistent());
    }

    #[test]
    fn test_pattern_window_start() {
        let rules = ScoringRules::default();
        assert_eq!(rules.pattern_window_start(10 * MS_PER_HOUR), 4 * MS_PER_HOUR);
    }
}

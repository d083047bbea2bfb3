//! Threat Types
//!
//! Core types for threat scoring and alerting.
//! No logic here - only data structures.

use serde::{Deserialize, Serialize};

use crate::logic::device::DeviceClass;
use crate::logic::EpochMillis;

// ============================================================================
// THREAT LEVEL
// ============================================================================

/// Threat level buckets on the 0-100 score range.
///
/// Ordering follows severity, so `level > alerted_level` is a rising edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatLevel {
    /// Below the suspicious cutoff, never alerts
    #[default]
    Low,
    /// Suspicious: at or above the cutoff
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        }
    }

    /// True for every level at or above the suspicious cutoff
    pub fn is_suspicious(&self) -> bool {
        *self >= ThreatLevel::Medium
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// USER ACTION
// ============================================================================

/// What the user did about an alert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertAction {
    #[default]
    None,
    Ignored,
    Whitelisted,
    Flagged,
    Reported,
    Blocked,
}

impl AlertAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertAction::None => "NONE",
            AlertAction::Ignored => "IGNORED",
            AlertAction::Whitelisted => "WHITELISTED",
            AlertAction::Flagged => "FLAGGED",
            AlertAction::Reported => "REPORTED",
            AlertAction::Blocked => "BLOCKED",
        }
    }
}

impl std::fmt::Display for AlertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// THREAT ALERT
// ============================================================================

pub type AlertId = i64;

/// One threshold-crossing event for a device.
///
/// Alerts reference the device by identity only and outlive it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAlert {
    /// Assigned by the store; 0 until appended
    pub id: AlertId,
    pub device_id: String,
    pub device_name: Option<String>,
    pub device_class: DeviceClass,
    pub timestamp: EpochMillis,
    pub threat_score: f32,
    pub threat_level: ThreatLevel,
    pub latitude: f64,
    pub longitude: f64,
    pub sighting_count: u32,
    pub location_count: u32,
    pub follow_duration_ms: i64,
    pub acknowledged: bool,
    pub user_action: AlertAction,
    /// Extra context, e.g. the known-tracker signature that fired
    pub reason: Option<String>,
}

// ============================================================================
// SCORE BREAKDOWN
// ============================================================================

/// How the final score was put together
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub place_points: f32,
    pub duration_points: f32,
    pub detection_points: f32,
    /// Reacquisition + route order, from recent sightings (0-20)
    pub pattern_points: f32,
    pub reacquisitions: u32,
    pub route_order_ratio: f32,
    /// 1.0 - 1.15, steadier signal while moving scores higher
    pub rssi_modifier: f32,
    /// 0.3 for single-place devices, 1.0 otherwise
    pub static_penalty: f32,
    /// 1.0 right after a sighting, decaying to 0.0
    pub recency_factor: f32,
    /// Set when a known-tracker signature overrode the formula
    pub tracker: Option<String>,
}

// ============================================================================
// SCORE OUTCOME
// ============================================================================

/// Result of recomputing a device's score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: f32,
    pub level: ThreatLevel,
    /// Rising edge that should produce an alert
    pub crossed_threshold: bool,
    /// New edge-detection state when the level fell below the last alert
    pub rearm_to: Option<ThreatLevel>,
    pub breakdown: ScoreBreakdown,
}

//! Threat Module
//!
//! Turns a device's aggregates into a 0-100 follow score and a level,
//! and decides when an alert is due (rising edge only).
//!
//! ## Structure
//! - `types`: ThreatLevel, ThreatAlert, AlertAction, ScoreOutcome
//! - `rules`: weights, cutoffs, ScoringRules
//! - `pattern`: movement habits in recent sightings (leapfrog, route order, steady RSSI)
//! - `scorer`: ThreatScorer (formula + edge detection)
//! - `tracker`: known commercial tracker signatures
//!
//! ## Usage
//! ```ignore
//! let scorer = ThreatScorer::new(ScoringRules::default());
//! let since = scorer.rules().pattern_window_start(device.last_seen);
//! let recent = tx.sightings_for_device(&device.id, since)?;
//! let outcome = scorer.recompute_score(&device, &recent, sighting.timestamp);
//! if outcome.crossed_threshold {
//!     // append a ThreatAlert
//! }
//! ```

pub mod types;
pub mod rules;
pub mod pattern;
pub mod scorer;
pub mod tracker;

pub use types::{AlertAction, AlertId, ScoreBreakdown, ScoreOutcome, ThreatAlert, ThreatLevel};
pub use rules::ScoringRules;
pub use scorer::ThreatScorer;
pub use tracker::{detect as detect_tracker, TrackerMatch, TrackerType};

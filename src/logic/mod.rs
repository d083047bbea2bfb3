//! Logic Module - Business Logic & Engines
//!
//! ## Architecture
//! - `store/` - Persistent store trait, SQLite and in-memory implementations
//! - `cluster/` - Spatial index and clustering engine (places)
//! - `device/` - Device model and aggregate maintenance
//! - `threat/` - Scoring rules, scorer, known-tracker signatures, alerts
//! - `ingest/` - Ingestion pipeline, per-device locks, moderation
//! - `retention` - Periodic cleanup of stale records
//! - `events` - Change feed for downstream observers
//! - `views` - Read-side queries and dashboard statistics

pub mod config;
pub mod events;
pub mod views;
pub mod retention;

pub mod store;
pub mod cluster;
pub mod device;
pub mod threat;
pub mod ingest;

/// Milliseconds since the Unix epoch (the persisted timestamp format)
pub type EpochMillis = i64;

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> EpochMillis {
    chrono::Utc::now().timestamp_millis()
}

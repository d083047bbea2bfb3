//! Follower Core - Library Entry Point
//!
//! Sighting ingestion, location clustering and threat scoring for detecting
//! wireless devices that follow the user across places.
//!
//! See `logic` for the engines and `constants` for configuration defaults.

pub mod constants;
pub mod logic;

pub use logic::config::EngineConfig;
pub use logic::ingest::{IngestError, IngestOutcome, IngestPipeline, Observation, RetryBacklog};
pub use logic::retention::{RetentionSweeper, SweepReport};
pub use logic::store::{MemoryStore, SqliteStore, Store, StoreError, StoreTx};

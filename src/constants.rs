//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! `EngineConfig::default()` is built from these values; environment
//! variables override them at start-up.

/// Score at or above which a device is "suspicious" (0-100 scale)
pub const DEFAULT_SUSPICIOUS_CUTOFF: f32 = 31.0;

/// Score at or above which a device is HIGH
pub const DEFAULT_HIGH_CUTOFF: f32 = 61.0;

/// Score at or above which a device is CRITICAL
pub const DEFAULT_CRITICAL_CUTOFF: f32 = 81.0;

/// Clustering epsilon in degrees, applied to latitude and longitude (~111 m at the equator)
pub const DEFAULT_CLUSTER_EPSILON_DEG: f64 = 0.001;

/// Smallest radius a new cluster is created with (metres)
pub const DEFAULT_MIN_CLUSTER_RADIUS_M: f32 = 25.0;

/// Decimal digits kept when quantizing coordinates for distinct-location counts (~11 m grid)
pub const DEFAULT_LOCATION_PRECISION: u32 = 4;

/// Devices not seen for this long are eligible for deletion
pub const DEFAULT_DEVICE_TTL_DAYS: u32 = 7;

/// Sightings older than this are deleted
pub const DEFAULT_SIGHTING_TTL_DAYS: u32 = 7;

/// Retention sweep period (seconds)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Devices deleted per sweep batch
pub const DEFAULT_SWEEP_BATCH_SIZE: usize = 200;

/// SQLite busy timeout (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 1_000;

/// Buffered change sets per subscriber
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 256;

/// Observations the daemon holds for retry during a store outage
pub const DEFAULT_RETRY_BACKLOG_CAPACITY: usize = 10_000;

/// Database file name inside the data directory
pub const DATABASE_FILE: &str = "follower.db";

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "follower-core";

pub const MS_PER_HOUR: i64 = 60 * 60 * 1000;
pub const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;

// ============================================
// Environment variable names
// ============================================

pub const ENV_DB_PATH: &str = "FOLLOWER_DB_PATH";
pub const ENV_SUSPICIOUS_CUTOFF: &str = "FOLLOWER_SUSPICIOUS_CUTOFF";
pub const ENV_CLUSTER_EPSILON: &str = "FOLLOWER_CLUSTER_EPSILON";
pub const ENV_LOCATION_PRECISION: &str = "FOLLOWER_LOCATION_PRECISION";
pub const ENV_DEVICE_TTL_DAYS: &str = "FOLLOWER_DEVICE_TTL_DAYS";
pub const ENV_SIGHTING_TTL_DAYS: &str = "FOLLOWER_SIGHTING_TTL_DAYS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "FOLLOWER_SWEEP_INTERVAL_SECS";
pub const ENV_ALERT_ON_ESCALATION: &str = "FOLLOWER_ALERT_ON_ESCALATION";

// ============================================
// Helpers
// ============================================

/// Get the data directory, honouring the platform default
pub fn get_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("follower")
}

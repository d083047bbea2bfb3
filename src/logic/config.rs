//! Engine Configuration
//!
//! Defaults come from `constants.rs`. A JSON file may override any subset
//! of fields, then `FOLLOWER_*` environment variables override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::*;
use crate::logic::threat::ScoringRules;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Defaults to `<data dir>/follower/follower.db`
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub scoring: ScoringRules,
    pub cluster_epsilon_deg: f64,
    pub min_cluster_radius_m: f32,
    pub location_precision: u32,
    pub device_ttl_days: u32,
    pub sighting_ttl_days: u32,
    pub sweep_interval_secs: u64,
    pub sweep_batch_size: usize,
    pub change_feed_capacity: usize,
    /// Observations held for retry while the store is unavailable
    pub retry_backlog_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            scoring: ScoringRules::default(),
            cluster_epsilon_deg: DEFAULT_CLUSTER_EPSILON_DEG,
            min_cluster_radius_m: DEFAULT_MIN_CLUSTER_RADIUS_M,
            location_precision: DEFAULT_LOCATION_PRECISION,
            device_ttl_days: DEFAULT_DEVICE_TTL_DAYS,
            sighting_ttl_days: DEFAULT_SIGHTING_TTL_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            change_feed_capacity: DEFAULT_CHANGE_FEED_CAPACITY,
            retry_backlog_capacity: DEFAULT_RETRY_BACKLOG_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_slice(&data)?;
        Ok(config)
    }

    /// Full start-up resolution: optional file, then environment, then validation
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `FOLLOWER_*` overrides from any key lookup.
    /// Unparsable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        override_parsed(&lookup, ENV_SUSPICIOUS_CUTOFF, &mut self.scoring.suspicious_cutoff);
        override_parsed(&lookup, ENV_CLUSTER_EPSILON, &mut self.cluster_epsilon_deg);
        override_parsed(&lookup, ENV_LOCATION_PRECISION, &mut self.location_precision);
        override_parsed(&lookup, ENV_DEVICE_TTL_DAYS, &mut self.device_ttl_days);
        override_parsed(&lookup, ENV_SIGHTING_TTL_DAYS, &mut self.sighting_ttl_days);
        override_parsed(&lookup, ENV_SWEEP_INTERVAL_SECS, &mut self.sweep_interval_secs);

        if let Some(raw) = lookup(ENV_ALERT_ON_ESCALATION) {
            self.scoring.alert_on_escalation = raw.to_lowercase() != "false" && raw != "0";
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.scoring.is_consistent() {
            return Err(ConfigError::Invalid(format!(
                "level cutoffs must increase within 0-100: {} / {} / {}",
                self.scoring.suspicious_cutoff, self.scoring.high_cutoff, self.scoring.critical_cutoff
            )));
        }
        if !(self.cluster_epsilon_deg > 0.0 && self.cluster_epsilon_deg < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "cluster epsilon {} out of range (0, 1) degrees",
                self.cluster_epsilon_deg
            )));
        }
        if !(self.min_cluster_radius_m >= 0.0) {
            return Err(ConfigError::Invalid("min cluster radius must be >= 0".to_string()));
        }
        if self.location_precision > 8 {
            return Err(ConfigError::Invalid(format!(
                "location precision {} exceeds 8 digits",
                self.location_precision
            )));
        }
        if self.device_ttl_days == 0 || self.sighting_ttl_days == 0 {
            return Err(ConfigError::Invalid("retention TTLs must be at least one day".to_string()));
        }
        if self.sweep_interval_secs == 0 || self.sweep_batch_size == 0 {
            return Err(ConfigError::Invalid("sweep interval and batch size must be positive".to_string()));
        }
        if self.retry_backlog_capacity == 0 {
            return Err(ConfigError::Invalid("retry backlog capacity must be positive".to_string()));
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| get_data_dir().join(DATABASE_FILE))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn device_ttl_ms(&self) -> i64 {
        i64::from(self.device_ttl_days) * MS_PER_DAY
    }

    pub fn sighting_ttl_ms(&self) -> i64 {
        i64::from(self.sighting_ttl_days) * MS_PER_DAY
    }
}

fn override_parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring {}={:?}: not a valid value", key, raw),
        }
    }
}

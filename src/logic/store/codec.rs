//! Persisted enum string mapping
//!
//! Enums are stored as their `as_str()` spelling. Reading goes through
//! `FromStr`, which also accepts legacy spellings. The mapping version is
//! recorded in `schema_meta` so a later build can tell which spellings a
//! database was written with.

use std::str::FromStr;

use thiserror::Error;

use crate::logic::device::DeviceClass;
use crate::logic::threat::{AlertAction, ThreatLevel};

/// Bump whenever a variant is renamed or removed
pub const ENUM_MAPPING_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl FromStr for DeviceClass {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BLUETOOTH_CLASSIC" => Ok(DeviceClass::BluetoothClassic),
            "BLUETOOTH_LE" => Ok(DeviceClass::BluetoothLe),
            "WIFI_ACCESS_POINT" => Ok(DeviceClass::WifiAccessPoint),
            "WIFI_PROBE_REQUEST" => Ok(DeviceClass::WifiProbeRequest),
            other => Err(UnknownVariant::new("device class", other)),
        }
    }
}

impl FromStr for ThreatLevel {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(ThreatLevel::Low),
            "MEDIUM" => Ok(ThreatLevel::Medium),
            "HIGH" => Ok(ThreatLevel::High),
            "CRITICAL" => Ok(ThreatLevel::Critical),
            other => Err(UnknownVariant::new("threat level", other)),
        }
    }
}

impl FromStr for AlertAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(AlertAction::None),
            // legacy spelling
            "IGNORED" | "DISMISSED" => Ok(AlertAction::Ignored),
            "WHITELISTED" => Ok(AlertAction::Whitelisted),
            "FLAGGED" => Ok(AlertAction::Flagged),
            "REPORTED" => Ok(AlertAction::Reported),
            "BLOCKED" => Ok(AlertAction::Blocked),
            other => Err(UnknownVariant::new("alert action", other)),
        }
    }
}

//! Known Tracker Signatures
//!
//! Matches BLE advertising data against commercial tracking tags
//! (AirTag, Tile, SmartTag, Chipolo). A confident match skips the
//! gradual scoring and pins the device at the top of the range.

use serde::{Deserialize, Serialize};

use super::rules::TRACKER_CONFIDENCE_MIN;

// ============================================================================
// SIGNATURES
// ============================================================================

/// Bluetooth SIG company identifiers
pub const APPLE_COMPANY_ID: u16 = 0x004C;
pub const TILE_COMPANY_ID: u16 = 0x03E0;
pub const SAMSUNG_COMPANY_ID: u16 = 0x0075;
pub const CHIPOLO_COMPANY_ID: u16 = 0x02FF;

/// Apple payload type bytes
const AIRTAG_TYPE_BYTE: u8 = 0x12;
const FINDMY_ACCESSORY_TYPE: u8 = 0x07;

/// Service UUID prefixes (lower-case)
const TILE_SERVICE_UUID: &str = "0000feed";
const SAMSUNG_SMARTTAG_UUID: &str = "0000fd5a";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackerType {
    AppleAirtag,
    AppleFindmyAccessory,
    TileTracker,
    SamsungSmarttag,
    ChipoloTracker,
    GenericFindmyNetwork,
}

impl TrackerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerType::AppleAirtag => "APPLE_AIRTAG",
            TrackerType::AppleFindmyAccessory => "APPLE_FINDMY_ACCESSORY",
            TrackerType::TileTracker => "TILE_TRACKER",
            TrackerType::SamsungSmarttag => "SAMSUNG_SMARTTAG",
            TrackerType::ChipoloTracker => "CHIPOLO_TRACKER",
            TrackerType::GenericFindmyNetwork => "GENERIC_FINDMY_NETWORK",
        }
    }
}

/// A signature hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerMatch {
    pub tracker_type: TrackerType,
    /// 0.0 - 1.0
    pub confidence: f32,
    pub description: String,
}

impl TrackerMatch {
    fn new(tracker_type: TrackerType, confidence: f32, description: &str) -> Self {
        Self {
            tracker_type,
            confidence,
            description: description.to_string(),
        }
    }

    /// Confident enough to bypass gradual scoring
    pub fn is_conclusive(&self) -> bool {
        self.confidence >= TRACKER_CONFIDENCE_MIN
    }
}

// ============================================================================
// DETECTION
// ============================================================================

/// Match manufacturer data first (most reliable), then service UUIDs.
pub fn detect(manufacturer_data: Option<&[u8]>, service_uuids: &[String]) -> Option<TrackerMatch> {
    if let Some(hit) = manufacturer_data.and_then(match_manufacturer_data) {
        return Some(hit);
    }
    match_service_uuids(service_uuids)
}

fn match_manufacturer_data(data: &[u8]) -> Option<TrackerMatch> {
    if data.len() < 2 {
        return None;
    }
    let company_id = u16::from_le_bytes([data[0], data[1]]);

    match company_id {
        APPLE_COMPANY_ID => match_apple(data),
        TILE_COMPANY_ID => Some(TrackerMatch::new(
            TrackerType::TileTracker,
            0.9,
            "Tile Bluetooth tracker",
        )),
        SAMSUNG_COMPANY_ID => match_samsung(data),
        CHIPOLO_COMPANY_ID => Some(TrackerMatch::new(
            TrackerType::ChipoloTracker,
            0.85,
            "Chipolo Bluetooth tracker",
        )),
        _ => None,
    }
}

fn match_apple(data: &[u8]) -> Option<TrackerMatch> {
    match *data.get(2)? {
        AIRTAG_TYPE_BYTE => Some(TrackerMatch::new(TrackerType::AppleAirtag, 0.95, "Apple AirTag")),
        FINDMY_ACCESSORY_TYPE => Some(TrackerMatch::new(
            TrackerType::AppleFindmyAccessory,
            0.85,
            "Apple Find My network accessory",
        )),
        _ if is_likely_findmy_payload(data) => Some(TrackerMatch::new(
            TrackerType::GenericFindmyNetwork,
            0.6,
            "Possible Apple Find My network device",
        )),
        _ => None,
    }
}

/// Find My payloads are 29+ bytes with the "separated" status bit set in byte 3
fn is_likely_findmy_payload(data: &[u8]) -> bool {
    data.len() >= 29 && data[3] & 0x10 != 0
}

fn match_samsung(data: &[u8]) -> Option<TrackerMatch> {
    if data.len() >= 6 && data[2] == 0x01 {
        Some(TrackerMatch::new(TrackerType::SamsungSmarttag, 0.8, "Samsung SmartTag"))
    } else {
        None
    }
}

fn match_service_uuids(uuids: &[String]) -> Option<TrackerMatch> {
    uuids.iter().find_map(|uuid| {
        let lower = uuid.to_ascii_lowercase();
        if lower.starts_with(TILE_SERVICE_UUID) {
            Some(TrackerMatch::new(
                TrackerType::TileTracker,
                0.9,
                "Tile tracker (service UUID)",
            ))
        } else if lower.starts_with(SAMSUNG_SMARTTAG_UUID) {
            Some(TrackerMatch::new(
                TrackerType::SamsungSmarttag,
                0.85,
                "Samsung SmartTag (service UUID)",
            ))
        } else {
            None
        }
    })
}

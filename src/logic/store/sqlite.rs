//! SQLite store
//!
//! One connection behind a mutex; every `transaction` is an IMMEDIATE
//! SQLite transaction so writers queue on the busy timeout instead of
//! failing on lock upgrade. Schema is created if absent.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};

use super::codec::ENUM_MAPPING_VERSION;
use super::{Store, StoreError, StoreTx};
use crate::logic::cluster::{ClusterId, LocationCluster};
use crate::logic::device::{DetectedDevice, DeviceClass, DeviceSighting, SightingId};
use crate::logic::threat::{AlertAction, AlertId, ThreatAlert, ThreatLevel};
use crate::logic::EpochMillis;

const SCHEMA: &str = include_str!("schema.sql");

const META_ENUM_MAPPING: &str = "enum_mapping_version";
const META_APP_VERSION: &str = "created_by";

const DEVICE_COLUMNS: &str = "id, device_class, name, first_seen, last_seen, detection_count, \
     location_count, place_count, threat_score, threat_level, last_rssi, probed_ssids, subclass, \
     is_whitelisted, is_flagged, metadata, tracker, alerted_level, revision";

const SIGHTING_COLUMNS: &str = "id, device_id, timestamp, latitude, longitude, accuracy, rssi, \
     device_class, probed_ssid, ap_ssid, channel, frequency, cluster_id, lat_q, lon_q";

const CLUSTER_COLUMNS: &str = "id, center_latitude, center_longitude, radius, first_visit, \
     last_visit, visit_count, place_name";

const ALERT_COLUMNS: &str = "id, device_id, device_name, device_class, timestamp, threat_score, \
     threat_level, latitude, longitude, sighting_count, location_count, follow_duration_ms, \
     acknowledged, user_action, reason";

// ============================================================================
// STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Unavailable(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self::bootstrap(conn)?;
        log::info!("Database ready at {}", path.display());
        Ok(store)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = ?1",
                params![META_ENUM_MAPPING],
                |row| row.get(0),
            )
            .optional()?;

        match stored.as_deref().map(str::parse::<u32>) {
            None => {
                conn.execute(
                    "INSERT INTO schema_meta (key, value) VALUES (?1, ?2), (?3, ?4)",
                    params![
                        META_ENUM_MAPPING,
                        ENUM_MAPPING_VERSION.to_string(),
                        META_APP_VERSION,
                        crate::constants::APP_VERSION
                    ],
                )?;
            }
            Some(Ok(version)) if version > ENUM_MAPPING_VERSION => {
                log::warn!(
                    "Database enum mapping v{} is newer than v{}; unknown values will be quarantined",
                    version,
                    ENUM_MAPPING_VERSION
                );
            }
            Some(Ok(_)) => {}
            Some(Err(_)) => log::warn!("Unreadable enum mapping version in schema_meta"),
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Enum mapping version recorded when the database was created
    pub fn enum_mapping_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.conn.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM schema_meta WHERE key = ?1",
                params![META_ENUM_MAPPING],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<usize, StoreError> {
        Ok(self.conn.lock().execute(sql, [])?)
    }
}

impl Store for SqliteStore {
    fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut dyn StoreTx) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = {
            let mut handle = SqliteTx { conn: &tx };
            f(&mut handle)?
        };
        tx.commit()?;
        Ok(value)
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn quarantined(table: &'static str, key: impl ToString, reason: impl ToString) -> StoreError {
    StoreError::Quarantined {
        table,
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

/// Convert raw rows, skipping (and logging) quarantined ones
fn collect_rows<R, T>(
    rows: impl Iterator<Item = rusqlite::Result<R>>,
    convert: impl Fn(R) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    let mut out = Vec::new();
    for row in rows {
        match convert(row?) {
            Ok(value) => out.push(value),
            Err(StoreError::Quarantined { table, key, reason }) => {
                log::warn!("Skipping quarantined {} row {}: {}", table, key, reason);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Device row with enum columns still as text
struct DeviceRow {
    id: String,
    device_class: String,
    name: Option<String>,
    first_seen: i64,
    last_seen: i64,
    detection_count: u32,
    location_count: u32,
    place_count: u32,
    threat_score: f64,
    threat_level: String,
    last_rssi: i32,
    probed_ssids: Option<String>,
    subclass: Option<i32>,
    is_whitelisted: bool,
    is_flagged: bool,
    metadata: Option<String>,
    tracker: Option<String>,
    alerted_level: String,
    revision: i64,
}

impl DeviceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_class: row.get(1)?,
            name: row.get(2)?,
            first_seen: row.get(3)?,
            last_seen: row.get(4)?,
            detection_count: row.get(5)?,
            location_count: row.get(6)?,
            place_count: row.get(7)?,
            threat_score: row.get(8)?,
            threat_level: row.get(9)?,
            last_rssi: row.get(10)?,
            probed_ssids: row.get(11)?,
            subclass: row.get(12)?,
            is_whitelisted: row.get(13)?,
            is_flagged: row.get(14)?,
            metadata: row.get(15)?,
            tracker: row.get(16)?,
            alerted_level: row.get(17)?,
            revision: row.get(18)?,
        })
    }

    fn into_device(self) -> Result<DetectedDevice, StoreError> {
        let table = "detected_devices";
        let probed_ssids = match self.probed_ssids.as_deref() {
            None | Some("") => Vec::new(),
            Some(json) => serde_json::from_str(json).map_err(|e| quarantined(table, &self.id, e))?,
        };
        Ok(DetectedDevice {
            device_class: self
                .device_class
                .parse::<DeviceClass>()
                .map_err(|e| quarantined(table, &self.id, e))?,
            threat_level: self
                .threat_level
                .parse::<ThreatLevel>()
                .map_err(|e| quarantined(table, &self.id, e))?,
            alerted_level: self
                .alerted_level
                .parse::<ThreatLevel>()
                .map_err(|e| quarantined(table, &self.id, e))?,
            probed_ssids,
            id: self.id,
            name: self.name,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
            detection_count: self.detection_count,
            location_count: self.location_count,
            place_count: self.place_count,
            threat_score: self.threat_score as f32,
            last_rssi: self.last_rssi,
            subclass: self.subclass,
            is_whitelisted: self.is_whitelisted,
            is_flagged: self.is_flagged,
            metadata: self.metadata,
            tracker: self.tracker,
            revision: self.revision,
        })
    }
}

struct SightingRow {
    id: i64,
    device_id: String,
    timestamp: i64,
    latitude: f64,
    longitude: f64,
    accuracy: f64,
    rssi: i32,
    device_class: String,
    probed_ssid: Option<String>,
    ap_ssid: Option<String>,
    channel: Option<i32>,
    frequency: Option<i32>,
    cluster_id: i64,
    lat_q: i64,
    lon_q: i64,
}

impl SightingRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            timestamp: row.get(2)?,
            latitude: row.get(3)?,
            longitude: row.get(4)?,
            accuracy: row.get(5)?,
            rssi: row.get(6)?,
            device_class: row.get(7)?,
            probed_ssid: row.get(8)?,
            ap_ssid: row.get(9)?,
            channel: row.get(10)?,
            frequency: row.get(11)?,
            cluster_id: row.get(12)?,
            lat_q: row.get(13)?,
            lon_q: row.get(14)?,
        })
    }

    fn into_sighting(self) -> Result<DeviceSighting, StoreError> {
        Ok(DeviceSighting {
            device_class: self
                .device_class
                .parse::<DeviceClass>()
                .map_err(|e| quarantined("device_sightings", self.id, e))?,
            id: self.id,
            device_id: self.device_id,
            timestamp: self.timestamp,
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.accuracy as f32,
            rssi: self.rssi,
            probed_ssid: self.probed_ssid,
            ap_ssid: self.ap_ssid,
            channel: self.channel,
            frequency: self.frequency,
            cluster_id: self.cluster_id,
            lat_q: self.lat_q,
            lon_q: self.lon_q,
        })
    }
}

fn cluster_from_row(row: &Row<'_>) -> rusqlite::Result<LocationCluster> {
    Ok(LocationCluster {
        id: row.get(0)?,
        center_latitude: row.get(1)?,
        center_longitude: row.get(2)?,
        radius: row.get::<_, f64>(3)? as f32,
        first_visit: row.get(4)?,
        last_visit: row.get(5)?,
        visit_count: row.get(6)?,
        place_name: row.get(7)?,
    })
}

struct AlertRow {
    id: i64,
    device_id: String,
    device_name: Option<String>,
    device_class: String,
    timestamp: i64,
    threat_score: f64,
    threat_level: String,
    latitude: f64,
    longitude: f64,
    sighting_count: u32,
    location_count: u32,
    follow_duration_ms: i64,
    acknowledged: bool,
    user_action: String,
    reason: Option<String>,
}

impl AlertRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            device_id: row.get(1)?,
            device_name: row.get(2)?,
            device_class: row.get(3)?,
            timestamp: row.get(4)?,
            threat_score: row.get(5)?,
            threat_level: row.get(6)?,
            latitude: row.get(7)?,
            longitude: row.get(8)?,
            sighting_count: row.get(9)?,
            location_count: row.get(10)?,
            follow_duration_ms: row.get(11)?,
            acknowledged: row.get(12)?,
            user_action: row.get(13)?,
            reason: row.get(14)?,
        })
    }

    fn into_alert(self) -> Result<ThreatAlert, StoreError> {
        let table = "threat_alerts";
        Ok(ThreatAlert {
            device_class: self.device_class.parse::<DeviceClass>().map_err(|e| quarantined(table, self.id, e))?,
            threat_level: self.threat_level.parse::<ThreatLevel>().map_err(|e| quarantined(table, self.id, e))?,
            user_action: self.user_action.parse::<AlertAction>().map_err(|e| quarantined(table, self.id, e))?,
            id: self.id,
            device_id: self.device_id,
            device_name: self.device_name,
            timestamp: self.timestamp,
            threat_score: self.threat_score as f32,
            latitude: self.latitude,
            longitude: self.longitude,
            sighting_count: self.sighting_count,
            location_count: self.location_count,
            follow_duration_ms: self.follow_duration_ms,
            acknowledged: self.acknowledged,
            reason: self.reason,
        })
    }
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

// ============================================================================
// TRANSACTION
// ============================================================================

struct SqliteTx<'c> {
    conn: &'c Connection,
}

impl SqliteTx<'_> {
    fn query_devices(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<DetectedDevice>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, DeviceRow::from_row)?;
        collect_rows(rows, DeviceRow::into_device)
    }

    fn query_alerts(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ThreatAlert>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, AlertRow::from_row)?;
        collect_rows(rows, AlertRow::into_alert)
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> Result<u64, StoreError> {
        let value: i64 = self.conn.query_row(sql, params, |row| row.get(0))?;
        Ok(to_count(value))
    }
}

impl StoreTx for SqliteTx<'_> {
    fn get_device(&mut self, id: &str) -> Result<Option<DetectedDevice>, StoreError> {
        let sql = format!("SELECT {} FROM detected_devices WHERE id = ?1", DEVICE_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], DeviceRow::from_row)
            .optional()?;
        row.map(DeviceRow::into_device).transpose()
    }

    fn put_device(&mut self, d: &DetectedDevice) -> Result<i64, StoreError> {
        let probed = if d.probed_ssids.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&d.probed_ssids)?)
        };

        if d.revision == 0 {
            let inserted = self.conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO detected_devices ({}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, 1)",
                    DEVICE_COLUMNS
                ),
                params![
                    d.id,
                    d.device_class.as_str(),
                    d.name,
                    d.first_seen,
                    d.last_seen,
                    d.detection_count,
                    d.location_count,
                    d.place_count,
                    d.threat_score as f64,
                    d.threat_level.as_str(),
                    d.last_rssi,
                    probed,
                    d.subclass,
                    d.is_whitelisted,
                    d.is_flagged,
                    d.metadata,
                    d.tracker,
                    d.alerted_level.as_str(),
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::Conflict(d.id.clone()));
            }
            return Ok(1);
        }

        let updated = self.conn.execute(
            "UPDATE detected_devices SET device_class = ?2, name = ?3, first_seen = ?4, last_seen = ?5, \
             detection_count = ?6, location_count = ?7, place_count = ?8, threat_score = ?9, \
             threat_level = ?10, last_rssi = ?11, probed_ssids = ?12, subclass = ?13, \
             is_whitelisted = ?14, is_flagged = ?15, metadata = ?16, tracker = ?17, \
             alerted_level = ?18, revision = revision + 1 \
             WHERE id = ?1 AND revision = ?19",
            params![
                d.id,
                d.device_class.as_str(),
                d.name,
                d.first_seen,
                d.last_seen,
                d.detection_count,
                d.location_count,
                d.place_count,
                d.threat_score as f64,
                d.threat_level.as_str(),
                d.last_rssi,
                probed,
                d.subclass,
                d.is_whitelisted,
                d.is_flagged,
                d.metadata,
                d.tracker,
                d.alerted_level.as_str(),
                d.revision,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::Conflict(d.id.clone()));
        }
        Ok(d.revision + 1)
    }

    fn delete_device(&mut self, id: &str) -> Result<bool, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM detected_devices WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    fn append_sighting(&mut self, s: &DeviceSighting) -> Result<SightingId, StoreError> {
        self.conn.execute(
            "INSERT INTO device_sightings (device_id, timestamp, latitude, longitude, accuracy, rssi, \
             device_class, probed_ssid, ap_ssid, channel, frequency, cluster_id, lat_q, lon_q) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                s.device_id,
                s.timestamp,
                s.latitude,
                s.longitude,
                s.accuracy as f64,
                s.rssi,
                s.device_class.as_str(),
                s.probed_ssid,
                s.ap_ssid,
                s.channel,
                s.frequency,
                s.cluster_id,
                s.lat_q,
                s.lon_q,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn count_distinct_locations(&mut self, device_id: &str) -> Result<u32, StoreError> {
        let n = self.count(
            "SELECT COUNT(*) FROM (SELECT DISTINCT lat_q, lon_q FROM device_sightings WHERE device_id = ?1)",
            params![device_id],
        )?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    fn count_distinct_clusters(&mut self, device_id: &str) -> Result<u32, StoreError> {
        let n = self.count(
            "SELECT COUNT(DISTINCT cluster_id) FROM device_sightings WHERE device_id = ?1",
            params![device_id],
        )?;
        Ok(u32::try_from(n).unwrap_or(u32::MAX))
    }

    fn delete_sightings_older_than(&mut self, cutoff: EpochMillis) -> Result<usize, StoreError> {
        Ok(self
            .conn
            .execute("DELETE FROM device_sightings WHERE timestamp < ?1", params![cutoff])?)
    }

    fn find_cluster_near(
        &mut self,
        latitude: f64,
        longitude: f64,
        epsilon_deg: f64,
    ) -> Result<Option<LocationCluster>, StoreError> {
        let sql = format!(
            "SELECT {} FROM location_clusters \
             WHERE ABS(center_latitude - ?1) < ?3 AND ABS(center_longitude - ?2) < ?3 \
             ORDER BY (center_latitude - ?1) * (center_latitude - ?1) \
                    + (center_longitude - ?2) * (center_longitude - ?2), id \
             LIMIT 1",
            CLUSTER_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![latitude, longitude, epsilon_deg], cluster_from_row)
            .optional()?)
    }

    fn get_cluster(&mut self, id: ClusterId) -> Result<Option<LocationCluster>, StoreError> {
        let sql = format!("SELECT {} FROM location_clusters WHERE id = ?1", CLUSTER_COLUMNS);
        Ok(self.conn.query_row(&sql, params![id], cluster_from_row).optional()?)
    }

    fn put_cluster(&mut self, c: &LocationCluster) -> Result<ClusterId, StoreError> {
        if c.id == 0 {
            self.conn.execute(
                "INSERT INTO location_clusters (center_latitude, center_longitude, radius, \
                 first_visit, last_visit, visit_count, place_name) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    c.center_latitude,
                    c.center_longitude,
                    c.radius as f64,
                    c.first_visit,
                    c.last_visit,
                    c.visit_count,
                    c.place_name,
                ],
            )?;
            return Ok(self.conn.last_insert_rowid());
        }

        let updated = self.conn.execute(
            "UPDATE location_clusters SET center_latitude = ?2, center_longitude = ?3, radius = ?4, \
             first_visit = ?5, last_visit = ?6, visit_count = ?7, place_name = ?8 WHERE id = ?1",
            params![
                c.id,
                c.center_latitude,
                c.center_longitude,
                c.radius as f64,
                c.first_visit,
                c.last_visit,
                c.visit_count,
                c.place_name,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("cluster", c.id));
        }
        Ok(c.id)
    }

    fn list_clusters(&mut self) -> Result<Vec<LocationCluster>, StoreError> {
        let sql = format!("SELECT {} FROM location_clusters ORDER BY id", CLUSTER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], cluster_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn append_alert(&mut self, a: &ThreatAlert) -> Result<AlertId, StoreError> {
        self.conn.execute(
            "INSERT INTO threat_alerts (device_id, device_name, device_class, timestamp, threat_score, \
             threat_level, latitude, longitude, sighting_count, location_count, follow_duration_ms, \
             acknowledged, user_action, reason) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                a.device_id,
                a.device_name,
                a.device_class.as_str(),
                a.timestamp,
                a.threat_score as f64,
                a.threat_level.as_str(),
                a.latitude,
                a.longitude,
                a.sighting_count,
                a.location_count,
                a.follow_duration_ms,
                a.acknowledged,
                a.user_action.as_str(),
                a.reason,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn update_alert(&mut self, a: &ThreatAlert) -> Result<(), StoreError> {
        let updated = self.conn.execute(
            "UPDATE threat_alerts SET acknowledged = ?2, user_action = ?3 WHERE id = ?1",
            params![a.id, a.acknowledged, a.user_action.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::not_found("alert", a.id));
        }
        Ok(())
    }

    fn get_alert(&mut self, id: AlertId) -> Result<Option<ThreatAlert>, StoreError> {
        let sql = format!("SELECT {} FROM threat_alerts WHERE id = ?1", ALERT_COLUMNS);
        let row = self.conn.query_row(&sql, params![id], AlertRow::from_row).optional()?;
        row.map(AlertRow::into_alert).transpose()
    }

    fn get_latest_alert(&mut self, device_id: &str) -> Result<Option<ThreatAlert>, StoreError> {
        let sql = format!(
            "SELECT {} FROM threat_alerts WHERE device_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT 1",
            ALERT_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![device_id], AlertRow::from_row)
            .optional()?;
        row.map(AlertRow::into_alert).transpose()
    }

    fn stale_device_ids(&mut self, cutoff: EpochMillis, limit: usize) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM detected_devices \
             WHERE last_seen < ?1 AND is_whitelisted = 0 AND is_flagged = 0 \
             ORDER BY last_seen LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![cutoff, to_limit(limit)], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    fn delete_device_if_stale(&mut self, id: &str, cutoff: EpochMillis) -> Result<bool, StoreError> {
        let n = self.conn.execute(
            "DELETE FROM detected_devices \
             WHERE id = ?1 AND last_seen < ?2 AND is_whitelisted = 0 AND is_flagged = 0",
            params![id, cutoff],
        )?;
        Ok(n > 0)
    }

    fn recent_devices(&mut self, limit: usize) -> Result<Vec<DetectedDevice>, StoreError> {
        let sql = format!(
            "SELECT {} FROM detected_devices ORDER BY last_seen DESC, id LIMIT ?1",
            DEVICE_COLUMNS
        );
        self.query_devices(&sql, params![to_limit(limit)])
    }

    fn suspicious_devices(&mut self, cutoff: f32) -> Result<Vec<DetectedDevice>, StoreError> {
        let sql = format!(
            "SELECT {} FROM detected_devices WHERE threat_score >= ?1 \
             ORDER BY threat_score DESC, last_seen DESC",
            DEVICE_COLUMNS
        );
        self.query_devices(&sql, params![cutoff as f64])
    }

    fn unacknowledged_alerts(&mut self) -> Result<Vec<ThreatAlert>, StoreError> {
        let sql = format!(
            "SELECT {} FROM threat_alerts WHERE acknowledged = 0 ORDER BY timestamp DESC, id DESC",
            ALERT_COLUMNS
        );
        self.query_alerts(&sql, [])
    }

    fn alerts_for_device(&mut self, device_id: &str) -> Result<Vec<ThreatAlert>, StoreError> {
        let sql = format!(
            "SELECT {} FROM threat_alerts WHERE device_id = ?1 ORDER BY timestamp DESC, id DESC",
            ALERT_COLUMNS
        );
        self.query_alerts(&sql, params![device_id])
    }

    fn sightings_for_device(&mut self, device_id: &str, since: EpochMillis) -> Result<Vec<DeviceSighting>, StoreError> {
        let sql = format!(
            "SELECT {} FROM device_sightings WHERE device_id = ?1 AND timestamp >= ?2 \
             ORDER BY timestamp, id",
            SIGHTING_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![device_id, since], SightingRow::from_row)?;
        collect_rows(rows, SightingRow::into_sighting)
    }

    fn count_devices(&mut self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(*) FROM detected_devices", [])
    }

    fn count_suspicious_devices(&mut self, cutoff: f32) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM detected_devices WHERE threat_score >= ?1",
            params![cutoff as f64],
        )
    }

    fn count_sightings_since(&mut self, since: EpochMillis) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM device_sightings WHERE timestamp >= ?1",
            params![since],
        )
    }

    fn count_unacknowledged_alerts(&mut self) -> Result<u64, StoreError> {
        self.count("SELECT COUNT(*) FROM threat_alerts WHERE acknowledged = 0", [])
    }

    fn count_unique_devices_since(&mut self, since: EpochMillis) -> Result<u64, StoreError> {
        self.count(
            "SELECT COUNT(*) FROM detected_devices WHERE last_seen >= ?1",
            params![since],
        )
    }
}

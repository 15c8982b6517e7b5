//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use seastreak_types::{
    DeviceStatistics, OdometerEndpoints, TelemetryRecord, format_date, parse_date, utc_day_bounds,
};

use crate::error::{Error, Result};
use crate::models::{StoredDevice, StoredStatistics, StoredTelemetry};
use crate::queries::TelemetryQuery;
use crate::schema;

/// SQLite-based store for device telemetry and streak statistics.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Device operations ===

    /// Get or create a device entry.
    pub fn upsert_device(&self, device_uid: &str, name: Option<&str>) -> Result<StoredDevice> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        self.conn.execute(
            "INSERT INTO devices (device_uid, name, first_seen, last_seen) VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(device_uid) DO UPDATE SET
                name = COALESCE(?2, name),
                last_seen = ?3",
            rusqlite::params![device_uid, name, now],
        )?;

        self.get_device(device_uid)?
            .ok_or_else(|| Error::DeviceNotFound(device_uid.to_string()))
    }

    /// Get a device by uid.
    pub fn get_device(&self, device_uid: &str) -> Result<Option<StoredDevice>> {
        let mut stmt = self.conn.prepare(
            "SELECT device_uid, name, first_seen, last_seen FROM devices WHERE device_uid = ?",
        )?;

        let device = stmt.query_row([device_uid], device_from_row).optional()?;

        Ok(device)
    }

    /// List all devices, oldest registration first.
    pub fn list_devices(&self) -> Result<Vec<StoredDevice>> {
        let mut stmt = self.conn.prepare(
            "SELECT device_uid, name, first_seen, last_seen FROM devices
             ORDER BY first_seen, device_uid",
        )?;

        let devices = stmt
            .query_map([], device_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(devices)
    }

    /// List every device uid.
    pub fn list_device_uids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT device_uid FROM devices ORDER BY device_uid")?;

        let uids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;

        Ok(uids)
    }
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<StoredDevice> {
    Ok(StoredDevice {
        device_uid: row.get(0)?,
        name: row.get(1)?,
        first_seen: timestamp_column(row, 2)?,
        last_seen: timestamp_column(row, 3)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let ts: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Date>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| parse_date(&s))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn telemetry_from_row(row: &Row<'_>) -> rusqlite::Result<StoredTelemetry> {
    Ok(StoredTelemetry {
        id: row.get(0)?,
        record: TelemetryRecord {
            device_uid: row.get(1)?,
            timestamp: timestamp_column(row, 2)?,
            lat_avg: row.get(3)?,
            lon_avg: row.get(4)?,
            total_dist: row.get(5)?,
            buffered_uploads_remaining: row.get::<_, Option<i64>>(6)?.map(|v| v.max(0) as u32),
        },
    })
}

// Telemetry operations
impl Store {
    /// Insert telemetry uploads, ignoring duplicates by (device, timestamp).
    ///
    /// Unknown devices are registered on the fly.
    pub fn insert_telemetry(&self, records: &[TelemetryRecord]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut inserted = 0;

        for record in records {
            tx.execute(
                "INSERT INTO devices (device_uid, first_seen, last_seen) VALUES (?1, ?2, ?2)
                 ON CONFLICT(device_uid) DO UPDATE SET last_seen = ?2",
                rusqlite::params![record.device_uid, now],
            )?;
            inserted += tx.execute(
                "INSERT OR IGNORE INTO telemetry (device_uid, timestamp, lat_avg, lon_avg,
                 total_dist, buffered_uploads_remaining)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.device_uid,
                    record.timestamp.unix_timestamp(),
                    record.lat_avg,
                    record.lon_avg,
                    record.total_dist,
                    record.buffered_uploads_remaining,
                ],
            )?;
        }

        tx.commit()?;
        debug!(
            "Inserted {} of {} telemetry uploads",
            inserted,
            records.len()
        );
        Ok(inserted)
    }

    /// Query telemetry uploads with filters.
    pub fn query_telemetry(&self, query: &TelemetryQuery) -> Result<Vec<StoredTelemetry>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let uploads = stmt
            .query_map(params_ref.as_slice(), telemetry_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(uploads)
    }

    /// All uploads of one UTC day, newest first.
    pub fn uploads_on(&self, device_uid: &str, date: Date) -> Result<Vec<TelemetryRecord>> {
        let (start, end) = utc_day_bounds(date);
        let query = TelemetryQuery::new()
            .device(device_uid)
            .since(start)
            .until(end);
        Ok(self
            .query_telemetry(&query)?
            .into_iter()
            .map(|stored| stored.record)
            .collect())
    }

    /// Odometer of the earliest and latest upload of one UTC day.
    pub fn odometer_endpoints(&self, device_uid: &str, date: Date) -> Result<OdometerEndpoints> {
        let (start, end) = utc_day_bounds(date);
        let day = TelemetryQuery::new()
            .device(device_uid)
            .since(start)
            .until(end)
            .limit(1);

        let latest = self.query_telemetry(&day)?.pop();
        let earliest = self.query_telemetry(&day.oldest_first())?.pop();

        Ok(OdometerEndpoints {
            earliest: earliest.and_then(|s| s.record.total_dist),
            latest: latest.and_then(|s| s.record.total_dist),
        })
    }

    /// Count telemetry uploads, optionally for one device.
    pub fn count_telemetry(&self, device_uid: Option<&str>) -> Result<u64> {
        let count: i64 = match device_uid {
            Some(uid) => self.conn.query_row(
                "SELECT COUNT(*) FROM telemetry WHERE device_uid = ?",
                [uid],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM telemetry", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

fn statistics_from_row(row: &Row<'_>) -> rusqlite::Result<StoredStatistics> {
    Ok(StoredStatistics {
        device_uid: row.get(0)?,
        statistics: DeviceStatistics {
            days_at_sea_alltime: row.get(1)?,
            current_streak_days: row.get(2)?,
            longest_streak_days: row.get(3)?,
            consecutive_days_moving: row.get(4)?,
            longest_consecutive_days_moving: row.get(5)?,
            last_position_check_date: date_column(row, 6)?,
        },
        updated_at: timestamp_column(row, 7)?,
    })
}

const STATISTICS_COLUMNS: &str = "device_uid, days_at_sea_alltime, current_streak_days, \
     longest_streak_days, consecutive_days_moving, longest_consecutive_days_moving, \
     last_position_check_date, updated_at";

// Statistics operations
impl Store {
    /// Get the statistics row for a device.
    pub fn get_statistics(&self, device_uid: &str) -> Result<Option<StoredStatistics>> {
        let sql = format!(
            "SELECT {} FROM device_statistics WHERE device_uid = ?",
            STATISTICS_COLUMNS
        );
        let stats = self
            .conn
            .query_row(&sql, [device_uid], statistics_from_row)
            .optional()?;
        Ok(stats)
    }

    /// List every statistics row.
    pub fn list_statistics(&self) -> Result<Vec<StoredStatistics>> {
        let sql = format!(
            "SELECT {} FROM device_statistics ORDER BY device_uid",
            STATISTICS_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], statistics_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Create a zeroed statistics row if the device has none.
    ///
    /// Returns the row as stored, which is the existing one when it was
    /// already present.
    pub fn seed_statistics(&self, device_uid: &str) -> Result<StoredStatistics> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let created = self.conn.execute(
            "INSERT OR IGNORE INTO device_statistics (device_uid, updated_at) VALUES (?1, ?2)",
            rusqlite::params![device_uid, now],
        )?;

        if created > 0 {
            info!("Created initial statistics for {}", device_uid);
        }

        self.get_statistics(device_uid)?
            .ok_or_else(|| Error::DeviceNotFound(device_uid.to_string()))
    }

    /// Write a statistics row, provided its check date is still `expected_last_check`.
    ///
    /// The condition makes concurrent runs for the same device fail with
    /// [`Error::StaleStatistics`] instead of overwriting each other.
    pub fn save_statistics(
        &self,
        device_uid: &str,
        stats: &DeviceStatistics,
        expected_last_check: Option<Date>,
    ) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let updated = self.conn.execute(
            "UPDATE device_statistics SET
                days_at_sea_alltime = ?2,
                current_streak_days = ?3,
                longest_streak_days = ?4,
                consecutive_days_moving = ?5,
                longest_consecutive_days_moving = ?6,
                last_position_check_date = ?7,
                updated_at = ?8
             WHERE device_uid = ?1 AND last_position_check_date IS ?9",
            rusqlite::params![
                device_uid,
                stats.days_at_sea_alltime,
                stats.current_streak_days,
                stats.longest_streak_days,
                stats.consecutive_days_moving,
                stats.longest_consecutive_days_moving,
                stats.last_position_check_date.map(format_date),
                now,
                expected_last_check.map(format_date),
            ],
        )?;

        if updated == 0 {
            return Err(Error::StaleStatistics {
                device_uid: device_uid.to_string(),
                expected: expected_last_check
                    .map(format_date)
                    .unwrap_or_else(|| "none".to_string()),
            });
        }

        debug!(
            "Saved statistics for {}: streak={}, moving={}, last_check={:?}",
            device_uid,
            stats.current_streak_days,
            stats.consecutive_days_moving,
            stats.last_position_check_date
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use time::macros::{date, datetime};

    fn upload(device_uid: &str, at: OffsetDateTime) -> TelemetryRecord {
        TelemetryRecord::new(device_uid, at).with_position(36.5, -122.1)
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_devices().unwrap().is_empty());
        assert!(store.list_statistics().unwrap().is_empty());
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        let store = Store::open(&path).unwrap();
        store.upsert_device("SV-1", None).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_upsert_device() {
        let store = Store::open_in_memory().unwrap();

        let device = store.upsert_device("SV-1", Some("Albatross")).unwrap();
        assert_eq!(device.device_uid, "SV-1");
        assert_eq!(device.name.as_deref(), Some("Albatross"));

        // A missing name keeps the previous one
        let device = store.upsert_device("SV-1", None).unwrap();
        assert_eq!(device.name.as_deref(), Some("Albatross"));
    }

    #[test]
    fn test_list_device_uids() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device("SV-2", None).unwrap();
        store.upsert_device("SV-1", None).unwrap();

        assert_eq!(store.list_device_uids().unwrap(), vec!["SV-1", "SV-2"]);
    }

    #[test]
    fn test_insert_telemetry_registers_device_and_dedups() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2025-06-01 10:00 UTC);

        let inserted = store
            .insert_telemetry(&[upload("SV-1", at), upload("SV-1", at)])
            .unwrap();

        assert_eq!(inserted, 1);
        assert_eq!(store.count_telemetry(Some("SV-1")).unwrap(), 1);
        assert!(store.get_device("SV-1").unwrap().is_some());
    }

    #[test]
    fn test_uploads_on_respects_day_bounds() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_telemetry(&[
                upload("SV-1", datetime!(2025-05-31 23:59:59 UTC)),
                upload("SV-1", datetime!(2025-06-01 00:00:00 UTC)),
                upload("SV-1", datetime!(2025-06-01 23:59:59 UTC)),
                upload("SV-1", datetime!(2025-06-02 00:00:00 UTC)),
                upload("SV-2", datetime!(2025-06-01 12:00:00 UTC)),
            ])
            .unwrap();

        let uploads = store.uploads_on("SV-1", date!(2025 - 06 - 01)).unwrap();

        assert_eq!(uploads.len(), 2);
        // Newest first
        assert_eq!(uploads[0].timestamp, datetime!(2025-06-01 23:59:59 UTC));
        assert_eq!(uploads[1].timestamp, datetime!(2025-06-01 00:00:00 UTC));
    }

    #[test]
    fn test_backlog_counter_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let at = datetime!(2025-06-01 10:00 UTC);
        store
            .insert_telemetry(&[upload("SV-1", at).with_backlog(3).with_odometer(12.5)])
            .unwrap();

        let uploads = store.uploads_on("SV-1", date!(2025 - 06 - 01)).unwrap();
        assert_eq!(uploads[0].buffered_uploads_remaining, Some(3));
        assert_eq!(uploads[0].total_dist, Some(12.5));
    }

    #[test]
    fn test_odometer_endpoints() {
        let store = Store::open_in_memory().unwrap();
        let start = datetime!(2025-06-01 00:05 UTC);
        let records: Vec<_> = (0..5)
            .map(|i| upload("SV-1", start + Duration::hours(i)).with_odometer(100.0 + i as f64))
            .collect();
        store.insert_telemetry(&records).unwrap();

        let endpoints = store
            .odometer_endpoints("SV-1", date!(2025 - 06 - 01))
            .unwrap();

        assert_eq!(endpoints.earliest, Some(100.0));
        assert_eq!(endpoints.latest, Some(104.0));
        assert!(endpoints.moved());
    }

    #[test]
    fn test_odometer_endpoints_empty_day() {
        let store = Store::open_in_memory().unwrap();
        let endpoints = store
            .odometer_endpoints("SV-1", date!(2025 - 06 - 01))
            .unwrap();
        assert_eq!(endpoints, OdometerEndpoints::default());
    }

    #[test]
    fn test_seed_statistics_is_zeroed_and_idempotent() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device("SV-1", None).unwrap();

        let seeded = store.seed_statistics("SV-1").unwrap();
        assert_eq!(seeded.statistics, DeviceStatistics::default());

        let advanced = DeviceStatistics {
            current_streak_days: 1,
            longest_streak_days: 1,
            days_at_sea_alltime: 1,
            ..Default::default()
        }
        .resolved_on(date!(2025 - 06 - 01));
        store.save_statistics("SV-1", &advanced, None).unwrap();

        // Seeding again must not reset an existing row
        let again = store.seed_statistics("SV-1").unwrap();
        assert_eq!(again.statistics, advanced);
    }

    #[test]
    fn test_seed_statistics_unknown_device_fails() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.seed_statistics("ghost").is_err());
    }

    #[test]
    fn test_save_statistics_round_trip() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device("SV-1", None).unwrap();
        store.seed_statistics("SV-1").unwrap();

        let stats = DeviceStatistics {
            days_at_sea_alltime: 12,
            current_streak_days: 5,
            longest_streak_days: 8,
            consecutive_days_moving: 2,
            longest_consecutive_days_moving: 6,
            last_position_check_date: Some(date!(2025 - 06 - 01)),
        };
        store.save_statistics("SV-1", &stats, None).unwrap();

        let loaded = store.get_statistics("SV-1").unwrap().unwrap();
        assert_eq!(loaded.statistics, stats);
    }

    #[test]
    fn test_save_statistics_rejects_stale_check_date() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device("SV-1", None).unwrap();
        store.seed_statistics("SV-1").unwrap();

        let first = DeviceStatistics::default().resolved_on(date!(2025 - 06 - 01));
        store.save_statistics("SV-1", &first, None).unwrap();

        // A second writer that still believes the row is unchecked loses
        let competing = DeviceStatistics::default().resolved_on(date!(2025 - 06 - 02));
        let result = store.save_statistics("SV-1", &competing, None);
        assert!(matches!(result, Err(Error::StaleStatistics { .. })));

        let loaded = store.get_statistics("SV-1").unwrap().unwrap();
        assert_eq!(loaded.statistics, first);

        // The writer that read the current date succeeds
        store
            .save_statistics("SV-1", &competing, Some(date!(2025 - 06 - 01)))
            .unwrap();
    }

    #[test]
    fn test_save_statistics_without_row_fails() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_device("SV-1", None).unwrap();

        let result = store.save_statistics("SV-1", &DeviceStatistics::default(), None);
        assert!(matches!(result, Err(Error::StaleStatistics { .. })));
    }
}

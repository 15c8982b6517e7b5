//! Database schema.
//!
//! The schema version lives in SQLite's `user_version` pragma.

use rusqlite::Connection;

use crate::error::{Error, Result};

/// Schema version written by this release.
pub const SCHEMA_VERSION: i32 = 1;

const SCHEMA_V1: &str = r#"
    -- Registered devices
    CREATE TABLE IF NOT EXISTS devices (
        device_uid TEXT PRIMARY KEY,
        name TEXT,
        first_seen INTEGER NOT NULL,
        last_seen INTEGER NOT NULL
    );

    -- Per-upload telemetry (append-only)
    CREATE TABLE IF NOT EXISTS telemetry (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        device_uid TEXT NOT NULL REFERENCES devices(device_uid),
        timestamp INTEGER NOT NULL,
        lat_avg REAL,
        lon_avg REAL,
        total_dist REAL,
        buffered_uploads_remaining INTEGER,
        UNIQUE(device_uid, timestamp)
    );
    CREATE INDEX IF NOT EXISTS idx_telemetry_device_time
        ON telemetry(device_uid, timestamp);

    -- Durable streak state, one row per device
    CREATE TABLE IF NOT EXISTS device_statistics (
        device_uid TEXT PRIMARY KEY REFERENCES devices(device_uid),
        days_at_sea_alltime INTEGER NOT NULL DEFAULT 0,
        current_streak_days INTEGER NOT NULL DEFAULT 0,
        longest_streak_days INTEGER NOT NULL DEFAULT 0,
        consecutive_days_moving INTEGER NOT NULL DEFAULT 0,
        longest_consecutive_days_moving INTEGER NOT NULL DEFAULT 0,
        last_position_check_date TEXT,
        updated_at INTEGER NOT NULL
    );
"#;

/// Create missing tables and stamp the schema version.
///
/// Fails with [`Error::UnsupportedSchema`] for a database from a newer release.
pub fn initialize(conn: &Connection) -> Result<()> {
    match user_version(conn)? {
        SCHEMA_VERSION => Ok(()),
        found if found > SCHEMA_VERSION => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
        _ => {
            conn.execute_batch(SCHEMA_V1)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            Ok(())
        }
    }
}

fn user_version(conn: &Connection) -> Result<i32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type = 'table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .map(|name| name.unwrap())
            .collect()
    }

    #[test]
    fn test_creates_tables() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables = table_names(&conn);
        for table in ["devices", "telemetry", "device_statistics"] {
            assert!(tables.iter().any(|t| t == table), "missing {table}");
        }
    }

    #[test]
    fn test_version_stamped_and_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(user_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        initialize(&conn).unwrap();

        assert_eq!(user_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        match initialize(&conn).unwrap_err() {
            Error::UnsupportedSchema { found, supported } => {
                assert_eq!(found, SCHEMA_VERSION + 1);
                assert_eq!(supported, SCHEMA_VERSION);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

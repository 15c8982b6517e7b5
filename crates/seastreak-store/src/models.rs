//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use seastreak_types::{DeviceStatistics, TelemetryRecord};

/// A device stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDevice {
    /// Device identifier.
    pub device_uid: String,
    /// Display name.
    pub name: Option<String>,
    /// First time this device was seen.
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    /// Last time this device was seen.
    #[serde(with = "time::serde::rfc3339")]
    pub last_seen: OffsetDateTime,
}

/// A telemetry upload stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTelemetry {
    /// Database row ID.
    pub id: i64,
    /// The upload itself.
    #[serde(flatten)]
    pub record: TelemetryRecord,
}

/// A device's streak statistics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredStatistics {
    /// Device identifier.
    pub device_uid: String,
    /// Streak counters and check date.
    #[serde(flatten)]
    pub statistics: DeviceStatistics,
    /// When the row was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

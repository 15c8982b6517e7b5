//! Capability traits for the streak evaluator's collaborators.
//!
//! The evaluator never talks to a database or spatial service directly.
//! Each collaborator is a narrow trait so the evaluator, driver and
//! controller can run against SQLite, an HTTP oracle, or the in-memory
//! fakes in [`crate::mock`].
//!
//! # Example
//!
//! ```ignore
//! use seastreak_core::{LandProximityOracle, Result};
//! use time::Date;
//!
//! async fn at_sea<O: LandProximityOracle>(oracle: &O, date: Date) -> Result<bool> {
//!     Ok(oracle.count_near_land("SV-0042", date, 804.67).await? == 0)
//! }
//! ```

use async_trait::async_trait;
use time::Date;

use seastreak_types::{DeviceStatistics, OdometerEndpoints, TelemetryRecord};

use crate::error::Result;

/// Enumerates every device a run must visit.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// List all known device uids.
    async fn list_devices(&self) -> Result<Vec<String>>;
}

/// Durable per-device streak rows.
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Load the row for a device, `None` if it has never been seeded.
    async fn load(&self, device_uid: &str) -> Result<Option<DeviceStatistics>>;

    /// Create a zeroed row with no check date unless one already exists.
    async fn seed(&self, device_uid: &str) -> Result<DeviceStatistics>;

    /// Write the row if its stored check date still equals `expected_last_check`.
    ///
    /// Implementations return [`Error::Conflict`](crate::Error::Conflict)
    /// when the condition does not hold.
    async fn save(
        &self,
        device_uid: &str,
        stats: &DeviceStatistics,
        expected_last_check: Option<Date>,
    ) -> Result<()>;
}

/// Read access to uploaded telemetry.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Every upload of a UTC calendar day, in any order.
    async fn uploads_on(&self, device_uid: &str, date: Date) -> Result<Vec<TelemetryRecord>>;

    /// Odometer of the earliest and latest upload of a UTC calendar day.
    async fn odometer_endpoints(&self, device_uid: &str, date: Date) -> Result<OdometerEndpoints>;
}

/// External authority on coastal proximity.
#[async_trait]
pub trait LandProximityOracle: Send + Sync {
    /// Count positions recorded on `date` within `threshold_meters` of any coastline.
    async fn count_near_land(
        &self,
        device_uid: &str,
        date: Date,
        threshold_meters: f64,
    ) -> Result<u32>;
}

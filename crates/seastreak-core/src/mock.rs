//! In-memory fleet for testing.
//!
//! [`InMemoryFleet`] implements all four collaborator traits over plain
//! maps, so the evaluator, driver and controller can be exercised without
//! SQLite or a spatial service.
//!
//! # Features
//!
//! - **Failure injection**: fail device listing, statistics access for a
//!   device, or the oracle for a specific device-day
//! - **Latency simulation**: delay oracle calls to trigger call timeouts
//! - **Concurrent writers**: make the next save for a device lose its
//!   optimistic-concurrency check
//! - **Call counting**: observe how often the oracle and saves were hit

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::{Date, UtcOffset};
use tokio::sync::RwLock;

use seastreak_types::{DeviceStatistics, OdometerEndpoints, TelemetryRecord, utc_day_bounds};

use crate::error::{Error, Result};
use crate::traits::{DeviceDirectory, LandProximityOracle, StatisticsStore, TelemetrySource};

type DeviceDay = (String, Date);

/// A fleet of devices held entirely in memory.
///
/// # Example
///
/// ```
/// use seastreak_core::{InMemoryFleet, TelemetrySource, synthetic_day};
/// use time::macros::date;
///
/// #[tokio::main]
/// async fn main() {
///     let fleet = InMemoryFleet::new();
///     fleet.add_uploads(synthetic_day("SV-1", date!(2025 - 06 - 01), 150, 3.0)).await;
///
///     let uploads = fleet.uploads_on("SV-1", date!(2025 - 06 - 01)).await.unwrap();
///     assert_eq!(uploads.len(), 150);
/// }
/// ```
#[derive(Default)]
pub struct InMemoryFleet {
    devices: RwLock<BTreeSet<String>>,
    statistics: RwLock<HashMap<String, DeviceStatistics>>,
    uploads: RwLock<Vec<TelemetryRecord>>,
    near_land: RwLock<HashMap<DeviceDay, u32>>,
    failing_oracle: RwLock<HashSet<DeviceDay>>,
    failing_statistics: RwLock<HashSet<String>>,
    concurrent_writers: RwLock<HashSet<String>>,
    fail_listing: AtomicBool,
    /// Simulated oracle latency in milliseconds (0 = no delay).
    oracle_latency_ms: AtomicU64,
    oracle_calls: AtomicU32,
    save_calls: AtomicU32,
}

impl std::fmt::Debug for InMemoryFleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryFleet")
            .field("oracle_calls", &self.oracle_calls.load(Ordering::Relaxed))
            .field("save_calls", &self.save_calls.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl InMemoryFleet {
    /// Create an empty fleet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with no statistics row.
    pub async fn add_device(&self, device_uid: &str) {
        self.devices.write().await.insert(device_uid.to_string());
    }

    /// Register a device with an existing statistics row.
    pub async fn set_statistics(&self, device_uid: &str, stats: DeviceStatistics) {
        self.add_device(device_uid).await;
        self.statistics
            .write()
            .await
            .insert(device_uid.to_string(), stats);
    }

    /// Current statistics row for a device.
    pub async fn statistics(&self, device_uid: &str) -> Option<DeviceStatistics> {
        self.statistics.read().await.get(device_uid).copied()
    }

    /// Append uploads, registering their devices.
    pub async fn add_uploads(&self, records: Vec<TelemetryRecord>) {
        {
            let mut devices = self.devices.write().await;
            for record in &records {
                devices.insert(record.device_uid.clone());
            }
        }
        self.uploads.write().await.extend(records);
    }

    /// Set how many positions the oracle reports near land for a device-day.
    pub async fn set_near_land(&self, device_uid: &str, date: Date, positions: u32) {
        self.near_land
            .write()
            .await
            .insert((device_uid.to_string(), date), positions);
    }

    /// Make device listing fail.
    pub fn fail_device_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::Relaxed);
    }

    /// Make every statistics call for a device fail.
    pub async fn fail_statistics_for(&self, device_uid: &str) {
        self.failing_statistics
            .write()
            .await
            .insert(device_uid.to_string());
    }

    /// Make the oracle fail for a device-day.
    pub async fn fail_oracle_on(&self, device_uid: &str, date: Date) {
        self.failing_oracle
            .write()
            .await
            .insert((device_uid.to_string(), date));
    }

    /// Have another writer touch the device's row right before its next save.
    pub async fn simulate_concurrent_writer(&self, device_uid: &str) {
        self.concurrent_writers
            .write()
            .await
            .insert(device_uid.to_string());
    }

    /// Set simulated oracle latency.
    ///
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_oracle_latency(&self, latency: Duration) {
        self.oracle_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of oracle queries served.
    pub fn oracle_calls(&self) -> u32 {
        self.oracle_calls.load(Ordering::Relaxed)
    }

    /// Number of save attempts.
    pub fn save_calls(&self) -> u32 {
        self.save_calls.load(Ordering::Relaxed)
    }

    async fn check_statistics(&self, device_uid: &str) -> Result<()> {
        if self.failing_statistics.read().await.contains(device_uid) {
            return Err(Error::statistics(format!(
                "statistics unavailable for {device_uid}"
            )));
        }
        Ok(())
    }

    async fn day_uploads(&self, device_uid: &str, date: Date) -> Vec<TelemetryRecord> {
        self.uploads
            .read()
            .await
            .iter()
            .filter(|r| r.device_uid == device_uid)
            .filter(|r| r.timestamp.to_offset(UtcOffset::UTC).date() == date)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DeviceDirectory for InMemoryFleet {
    async fn list_devices(&self) -> Result<Vec<String>> {
        if self.fail_listing.load(Ordering::Relaxed) {
            return Err(Error::directory("device directory unavailable"));
        }
        Ok(self.devices.read().await.iter().cloned().collect())
    }
}

#[async_trait]
impl StatisticsStore for InMemoryFleet {
    async fn load(&self, device_uid: &str) -> Result<Option<DeviceStatistics>> {
        self.check_statistics(device_uid).await?;
        Ok(self.statistics(device_uid).await)
    }

    async fn seed(&self, device_uid: &str) -> Result<DeviceStatistics> {
        self.check_statistics(device_uid).await?;
        let mut rows = self.statistics.write().await;
        Ok(*rows.entry(device_uid.to_string()).or_default())
    }

    async fn save(
        &self,
        device_uid: &str,
        stats: &DeviceStatistics,
        expected_last_check: Option<Date>,
    ) -> Result<()> {
        self.save_calls.fetch_add(1, Ordering::Relaxed);
        self.check_statistics(device_uid).await?;

        let interfere = self.concurrent_writers.write().await.remove(device_uid);
        let mut rows = self.statistics.write().await;
        let Some(row) = rows.get_mut(device_uid) else {
            return Err(Error::Conflict {
                device_uid: device_uid.to_string(),
            });
        };

        if interfere {
            row.last_position_check_date = row
                .last_position_check_date
                .and_then(|d| d.next_day())
                .or(stats.last_position_check_date);
        }

        if row.last_position_check_date != expected_last_check {
            return Err(Error::Conflict {
                device_uid: device_uid.to_string(),
            });
        }

        *row = *stats;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySource for InMemoryFleet {
    async fn uploads_on(&self, device_uid: &str, date: Date) -> Result<Vec<TelemetryRecord>> {
        Ok(self.day_uploads(device_uid, date).await)
    }

    async fn odometer_endpoints(&self, device_uid: &str, date: Date) -> Result<OdometerEndpoints> {
        let uploads = self.day_uploads(device_uid, date).await;
        let earliest = uploads.iter().min_by_key(|r| r.timestamp);
        let latest = uploads.iter().max_by_key(|r| r.timestamp);
        Ok(OdometerEndpoints {
            earliest: earliest.and_then(|r| r.total_dist),
            latest: latest.and_then(|r| r.total_dist),
        })
    }
}

#[async_trait]
impl LandProximityOracle for InMemoryFleet {
    async fn count_near_land(
        &self,
        device_uid: &str,
        date: Date,
        _threshold_meters: f64,
    ) -> Result<u32> {
        self.oracle_calls.fetch_add(1, Ordering::Relaxed);

        let latency = self.oracle_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let key = (device_uid.to_string(), date);
        if self.failing_oracle.read().await.contains(&key) {
            return Err(Error::oracle(format!(
                "spatial query failed for {device_uid} on {date}"
            )));
        }

        Ok(self.near_land.read().await.get(&key).copied().unwrap_or(0))
    }
}

/// Generate one UTC day of evenly spaced uploads with a GPS fix.
///
/// The odometer climbs linearly by `distance_nm` over the day and every
/// upload reports an empty buffer.
pub fn synthetic_day(
    device_uid: &str,
    date: Date,
    gps_uploads: usize,
    distance_nm: f64,
) -> Vec<TelemetryRecord> {
    if gps_uploads == 0 {
        return Vec::new();
    }

    let (start, _) = utc_day_bounds(date);
    let step = 86_399 / gps_uploads as i64;
    let last = (gps_uploads - 1).max(1) as f64;

    (0..gps_uploads)
        .map(|i| {
            let fraction = i as f64 / last;
            TelemetryRecord::new(device_uid, start + time::Duration::seconds(step * i as i64))
                .with_position(41.5 + fraction * 0.1, -70.6 - fraction * 0.1)
                .with_odometer(100.0 + fraction * distance_nm)
                .with_backlog(0)
        })
        .collect()
}

//! SQLite-backed implementations of the evaluator's collaborator traits.
//!
//! All three traits share one [`Store`] behind the state's mutex. The lock
//! is held only for the duration of each synchronous query.

use std::sync::Arc;

use async_trait::async_trait;
use time::Date;
use tokio::sync::Mutex;

use seastreak_core::{
    DeviceDirectory, DeviceStatistics, Error, OdometerEndpoints, Result, StatisticsStore,
    TelemetryRecord, TelemetrySource,
};
use seastreak_store::Store;

/// Directory, statistics and telemetry access over the local database.
#[derive(Clone)]
pub struct SqliteBackend {
    store: Arc<Mutex<Store>>,
}

impl SqliteBackend {
    /// Wrap a shared store.
    pub fn new(store: Arc<Mutex<Store>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DeviceDirectory for SqliteBackend {
    async fn list_devices(&self) -> Result<Vec<String>> {
        let store = self.store.lock().await;
        store.list_device_uids().map_err(Error::directory)
    }
}

#[async_trait]
impl StatisticsStore for SqliteBackend {
    async fn load(&self, device_uid: &str) -> Result<Option<DeviceStatistics>> {
        let store = self.store.lock().await;
        store
            .get_statistics(device_uid)
            .map(|row| row.map(|s| s.statistics))
            .map_err(Error::statistics)
    }

    async fn seed(&self, device_uid: &str) -> Result<DeviceStatistics> {
        let store = self.store.lock().await;
        store
            .seed_statistics(device_uid)
            .map(|row| row.statistics)
            .map_err(Error::statistics)
    }

    async fn save(
        &self,
        device_uid: &str,
        stats: &DeviceStatistics,
        expected_last_check: Option<Date>,
    ) -> Result<()> {
        let store = self.store.lock().await;
        store
            .save_statistics(device_uid, stats, expected_last_check)
            .map_err(|e| match e {
                seastreak_store::Error::StaleStatistics { device_uid, .. } => {
                    Error::Conflict { device_uid }
                }
                other => Error::statistics(other),
            })
    }
}

#[async_trait]
impl TelemetrySource for SqliteBackend {
    async fn uploads_on(&self, device_uid: &str, date: Date) -> Result<Vec<TelemetryRecord>> {
        let store = self.store.lock().await;
        store.uploads_on(device_uid, date).map_err(Error::telemetry)
    }

    async fn odometer_endpoints(&self, device_uid: &str, date: Date) -> Result<OdometerEndpoints> {
        let store = self.store.lock().await;
        store
            .odometer_endpoints(device_uid, date)
            .map_err(Error::telemetry)
    }
}

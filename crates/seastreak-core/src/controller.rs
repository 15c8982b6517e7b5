//! Fleet-wide run orchestration.
//!
//! The controller enumerates devices, runs a [`CatchUpDriver`] for each with
//! bounded concurrency, and folds the outcomes into a [`RunSummary`]. A
//! device-level error never stops other devices; only a failure to list
//! devices fails the run.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use time::Date;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::driver::CatchUpDriver;
use crate::error::{Error, Result, bounded};
use crate::summary::{DeviceOutcome, RunSummary};
use crate::traits::DeviceDirectory;

/// Fleet-level run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Devices processed at the same time.
    pub max_concurrent_devices: usize,
    /// Upper bound on the device listing call.
    pub call_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_concurrent_devices: 4,
            call_timeout: Duration::from_secs(30),
        }
    }
}

enum Visit {
    Done(DeviceOutcome),
    Failed(String, Error),
    Skipped,
}

/// Runs the daily check across every known device.
#[derive(Clone)]
pub struct FleetRunController {
    directory: Arc<dyn DeviceDirectory>,
    driver: CatchUpDriver,
    options: RunOptions,
}

impl FleetRunController {
    /// Create a controller.
    pub fn new(
        directory: Arc<dyn DeviceDirectory>,
        driver: CatchUpDriver,
        options: RunOptions,
    ) -> Self {
        Self {
            directory,
            driver,
            options,
        }
    }

    /// Run the check as of `today`: every device is caught up to the day before.
    ///
    /// Returns `Err` only when the device list cannot be read.
    pub async fn run_all(&self, today: Date, cancel: &CancellationToken) -> Result<RunSummary> {
        let devices = bounded(
            self.options.call_timeout,
            "device listing",
            self.directory.list_devices(),
        )
        .await
        .inspect_err(|e| error!("Daily check aborted: {}", e))?;

        info!(
            "Starting daily check for {} device(s) as of {}",
            devices.len(),
            today
        );

        let mut summary = RunSummary::new(today, devices.len());
        let concurrency = self.options.max_concurrent_devices.max(1);

        let mut visits = stream::iter(devices)
            .map(|device_uid| async move {
                if cancel.is_cancelled() {
                    return Visit::Skipped;
                }
                match self.driver.run_device(&device_uid, today, cancel).await {
                    Ok(outcome) => Visit::Done(outcome),
                    Err(e) => Visit::Failed(device_uid, e),
                }
            })
            .buffer_unordered(concurrency);

        while let Some(visit) = visits.next().await {
            match visit {
                Visit::Done(outcome) => summary.absorb(&outcome),
                Visit::Failed(device_uid, e) => {
                    error!("Error processing device {}: {}", device_uid, e);
                    summary.record_failure(&device_uid, &e);
                }
                Visit::Skipped => summary.skip_cancelled(),
            }
        }

        summary.finish();
        info!(
            "Daily check completed: {}/{} processed, {} dates checked, {} errors",
            summary.processed,
            summary.total_devices,
            summary.counters.total_dates_checked,
            summary.errors.len()
        );

        Ok(summary)
    }
}

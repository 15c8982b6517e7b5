//! Run-level accounting.
//!
//! Each device run returns its own [`DeviceOutcome`]; the controller folds
//! outcomes into a [`RunSummary`]. Nothing here is shared between devices
//! while they run.

use std::ops::AddAssign;

use serde::Serialize;
use time::{Date, OffsetDateTime};

use seastreak_types::DayClassification;

/// Counters accumulated over evaluated dates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    /// Dates that produced a classification (deferred or resolved).
    pub total_dates_checked: u32,
    /// Dates deferred because the device buffer was not empty.
    pub skipped_buffer_not_empty: u32,
    /// Dates resolved without a streak update due to missing GPS coverage.
    pub skipped_insufficient_data: u32,
    /// Evaluated dates with every position at sea.
    pub streaks_incremented: u32,
    /// Evaluated dates with at least one position near land.
    pub streaks_broken: u32,
    /// Evaluated dates covering the movement threshold.
    pub movement_streaks_incremented: u32,
    /// Evaluated dates below the movement threshold.
    pub movement_streaks_broken: u32,
    /// Dates that failed and were left unresolved.
    pub date_errors: u32,
}

impl RunCounters {
    /// Count one classified date.
    pub fn record(&mut self, classification: &DayClassification) {
        self.total_dates_checked += 1;
        match classification {
            DayClassification::BufferPending => self.skipped_buffer_not_empty += 1,
            DayClassification::InsufficientCoverage => self.skipped_insufficient_data += 1,
            DayClassification::Evaluated { all_at_sea, moved } => {
                if *all_at_sea {
                    self.streaks_incremented += 1;
                } else {
                    self.streaks_broken += 1;
                }
                if *moved {
                    self.movement_streaks_incremented += 1;
                } else {
                    self.movement_streaks_broken += 1;
                }
            }
        }
    }
}

impl AddAssign for RunCounters {
    fn add_assign(&mut self, other: Self) {
        self.total_dates_checked += other.total_dates_checked;
        self.skipped_buffer_not_empty += other.skipped_buffer_not_empty;
        self.skipped_insufficient_data += other.skipped_insufficient_data;
        self.streaks_incremented += other.streaks_incremented;
        self.streaks_broken += other.streaks_broken;
        self.movement_streaks_incremented += other.movement_streaks_incremented;
        self.movement_streaks_broken += other.movement_streaks_broken;
        self.date_errors += other.date_errors;
    }
}

/// A date that could not be evaluated or persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateError {
    /// The date left unresolved.
    #[serde(with = "crate::summary::iso_date")]
    pub date: Date,
    /// Rendered failure.
    pub error: String,
}

/// What one device run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceOutcome {
    /// Device this outcome belongs to.
    pub device_uid: String,
    /// A statistics row was created and evaluation deferred to the next run.
    pub seeded: bool,
    /// Counters for the dates this device evaluated.
    pub counters: RunCounters,
    /// Dates that failed; later dates were still evaluated.
    pub date_errors: Vec<DateError>,
    /// Deferred date where the device stopped advancing under the halt policy.
    #[serde(with = "crate::summary::iso_date::option")]
    pub halted_at: Option<Date>,
    /// The run was cancelled before the backlog was finished.
    pub cancelled: bool,
}

impl DeviceOutcome {
    /// Start an empty outcome for a device.
    pub fn new(device_uid: &str) -> Self {
        Self {
            device_uid: device_uid.to_string(),
            ..Default::default()
        }
    }
}

/// A device that failed as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceError {
    /// Device that was skipped.
    pub device_uid: String,
    /// Rendered failure.
    pub error: String,
}

/// Summary of one fleet run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// When the run started.
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    /// When the run finished; `None` while it is executing.
    #[serde(with = "time::serde::rfc3339::option")]
    pub finished_at: Option<OffsetDateTime>,
    /// The UTC date the run treated as "today".
    #[serde(with = "crate::summary::iso_date")]
    pub run_date: Date,
    /// Devices listed at the start of the run.
    pub total_devices: usize,
    /// Devices that completed without a device-level error.
    pub processed: usize,
    /// Devices that got a fresh statistics row this run.
    pub seeded: usize,
    /// Devices that stopped at a deferred date.
    pub halted: usize,
    /// Devices cut short or never started because the run was cancelled.
    pub cancelled: usize,
    /// Date counters summed over all devices.
    #[serde(flatten)]
    pub counters: RunCounters,
    /// Devices that failed as a whole.
    pub errors: Vec<DeviceError>,
}

impl RunSummary {
    /// Start a summary for `total_devices` devices.
    pub fn new(run_date: Date, total_devices: usize) -> Self {
        Self {
            started_at: OffsetDateTime::now_utc(),
            finished_at: None,
            run_date,
            total_devices,
            processed: 0,
            seeded: 0,
            halted: 0,
            cancelled: 0,
            counters: RunCounters::default(),
            errors: Vec::new(),
        }
    }

    /// Fold in a completed device run.
    pub fn absorb(&mut self, outcome: &DeviceOutcome) {
        self.processed += 1;
        if outcome.seeded {
            self.seeded += 1;
        }
        if outcome.halted_at.is_some() {
            self.halted += 1;
        }
        if outcome.cancelled {
            self.cancelled += 1;
        }
        self.counters += outcome.counters;
    }

    /// Record a device the run never started on.
    pub fn skip_cancelled(&mut self) {
        self.cancelled += 1;
    }

    /// Record a device that failed as a whole.
    pub fn record_failure(&mut self, device_uid: &str, error: &crate::Error) {
        self.errors.push(DeviceError {
            device_uid: device_uid.to_string(),
            error: error.to_string(),
        });
    }

    /// Stamp the finish time and order errors by device.
    pub fn finish(&mut self) {
        self.errors.sort_by(|a, b| a.device_uid.cmp(&b.device_uid));
        self.finished_at = Some(OffsetDateTime::now_utc());
    }
}

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

//! Per-device catch-up over the backlog of unresolved days.
//!
//! Streak counters depend on history, so a device's backlog is folded left
//! to right: every date sees the statistics produced by the date before it,
//! and each resolved date is persisted before the next one starts. A crash
//! or cancellation therefore loses at most the date in flight.
//!
//! # Failed dates
//!
//! A date whose store or oracle call fails is recorded in the outcome and
//! left unresolved; the driver moves on to the next date with the last
//! persisted statistics. A single bad day never stops the device.
//!
//! # Deferred dates
//!
//! A date is deferred ([`DayClassification::BufferPending`]) while the device
//! still holds buffered uploads for it. What happens to the dates after it is
//! governed by [`UnresolvedDatePolicy`]:
//!
//! - [`Halt`](UnresolvedDatePolicy::Halt) stops the device at that date, so
//!   the next run starts from it again.
//! - [`SkipAndContinue`](UnresolvedDatePolicy::SkipAndContinue) evaluates the
//!   remaining dates against the last persisted statistics. A later resolved
//!   date then moves the check date past the gap and the gap is never retried.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::Date;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use seastreak_types::{DayClassification, DeviceStatistics, INITIAL_BACKLOG_DAYS};

use crate::error::{Result, bounded};
use crate::evaluator::DayEvaluator;
use crate::summary::{DateError, DeviceOutcome};
use crate::traits::StatisticsStore;

/// What to do with later dates once a date is deferred for buffered uploads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedDatePolicy {
    /// Stop advancing the device until the buffer drains.
    #[default]
    Halt,
    /// Keep evaluating later dates against the unchanged statistics.
    SkipAndContinue,
}

/// Tuning for the catch-up driver.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Upper bound on each store or oracle call.
    pub call_timeout: Duration,
    /// Handling of dates after a deferred one.
    pub unresolved_date_policy: UnresolvedDatePolicy,
    /// How many days back a never-evaluated device starts.
    pub initial_backlog_days: i64,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            unresolved_date_policy: UnresolvedDatePolicy::default(),
            initial_backlog_days: INITIAL_BACKLOG_DAYS,
        }
    }
}

/// Inclusive range of UTC dates a device still has to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacklogWindow {
    /// First date to evaluate.
    pub start: Date,
    /// Last date to evaluate, always before today.
    pub end: Date,
}

impl BacklogWindow {
    /// Compute the backlog for `stats` as of `today`.
    ///
    /// Starts the day after the last check, or `initial_days` before today
    /// for a device never checked. Ends yesterday, since today has not
    /// elapsed. Returns `None` when there is nothing to do.
    pub fn for_statistics(
        stats: &DeviceStatistics,
        today: Date,
        initial_days: i64,
    ) -> Option<Self> {
        let end = today.previous_day()?;
        let start = match stats.last_position_check_date {
            Some(last) => last.next_day()?,
            None => today.checked_sub(time::Duration::days(initial_days))?,
        };

        (start <= end).then_some(Self { start, end })
    }

    /// Dates in ascending order.
    pub fn dates(&self) -> impl Iterator<Item = Date> + use<> {
        let end = self.end;
        std::iter::successors(Some(self.start), |d| d.next_day()).take_while(move |d| *d <= end)
    }

    /// Number of dates in the window.
    pub fn day_count(&self) -> usize {
        ((self.end - self.start).whole_days() + 1) as usize
    }
}

/// Drives one device through its backlog.
#[derive(Clone)]
pub struct CatchUpDriver {
    statistics: Arc<dyn StatisticsStore>,
    evaluator: DayEvaluator,
    options: DriverOptions,
}

impl CatchUpDriver {
    /// Create a driver.
    pub fn new(
        statistics: Arc<dyn StatisticsStore>,
        evaluator: DayEvaluator,
        options: DriverOptions,
    ) -> Self {
        Self {
            statistics,
            evaluator,
            options,
        }
    }

    /// Catch a device up to yesterday.
    ///
    /// Returns `Err` only for device-level failures (the statistics row
    /// cannot be read or seeded). Date-level failures are recorded in the
    /// outcome and the remaining dates are still evaluated.
    pub async fn run_device(
        &self,
        device_uid: &str,
        today: Date,
        cancel: &CancellationToken,
    ) -> Result<DeviceOutcome> {
        let mut outcome = DeviceOutcome::new(device_uid);
        let timeout = self.options.call_timeout;

        let loaded = bounded(timeout, "statistics load", self.statistics.load(device_uid)).await?;
        let Some(mut current) = loaded else {
            bounded(timeout, "statistics seed", self.statistics.seed(device_uid)).await?;
            info!(
                "Created initial statistics for {}, evaluation starts next run",
                device_uid
            );
            outcome.seeded = true;
            return Ok(outcome);
        };

        let Some(window) =
            BacklogWindow::for_statistics(&current, today, self.options.initial_backlog_days)
        else {
            debug!("No new dates to check for {}", device_uid);
            return Ok(outcome);
        };

        info!(
            "Checking {} date(s) for {}: {} to {}",
            window.day_count(),
            device_uid,
            window.start,
            window.end
        );

        for date in window.dates() {
            if cancel.is_cancelled() {
                info!("Run cancelled, {} stops before {}", device_uid, date);
                outcome.cancelled = true;
                break;
            }

            match self.resolve_date(device_uid, date, &current).await {
                Ok((classification, next)) => {
                    outcome.counters.record(&classification);
                    current = next;

                    if !classification.resolves_day() {
                        info!(
                            "{} {}: buffer not empty, date will be rechecked",
                            device_uid, date
                        );
                        if self.halt_at(date, &mut outcome) {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!("Error processing {} for {}: {}", date, device_uid, e);
                    outcome.counters.date_errors += 1;
                    outcome.date_errors.push(DateError {
                        date,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Completed {} for {}: {} checked, last check {:?}",
            window.day_count(),
            device_uid,
            outcome.counters.total_dates_checked,
            current.last_position_check_date
        );

        Ok(outcome)
    }

    /// Evaluate one date and persist it if it resolved.
    async fn resolve_date(
        &self,
        device_uid: &str,
        date: Date,
        current: &DeviceStatistics,
    ) -> Result<(DayClassification, DeviceStatistics)> {
        let evaluation = self.evaluator.evaluate(device_uid, date, current).await?;

        if !evaluation.classification.resolves_day() {
            return Ok((evaluation.classification, *current));
        }

        bounded(
            self.options.call_timeout,
            "statistics save",
            self.statistics.save(
                device_uid,
                &evaluation.stats,
                current.last_position_check_date,
            ),
        )
        .await?;

        Ok((evaluation.classification, evaluation.stats))
    }

    /// Apply the deferred-date policy; returns true when the device must stop.
    fn halt_at(&self, date: Date, outcome: &mut DeviceOutcome) -> bool {
        match self.options.unresolved_date_policy {
            UnresolvedDatePolicy::Halt => {
                outcome.halted_at = Some(date);
                true
            }
            UnresolvedDatePolicy::SkipAndContinue => false,
        }
    }
}

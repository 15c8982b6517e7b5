//! Day evaluation.
//!
//! A day passes through two gates before any streak changes:
//!
//! 1. **Buffer gate**: if the most recent upload of the day still reports
//!    buffered readings, the day's telemetry is incomplete. The day is
//!    [`BufferPending`](DayClassification::BufferPending) and nothing changes.
//! 2. **Coverage gate**: fewer than [`UPLOADS_PER_DAY_REQUIRED`] uploads with a
//!    GPS fix resolve the day as
//!    [`InsufficientCoverage`](DayClassification::InsufficientCoverage); only
//!    the check date moves.
//!
//! Days that pass both gates query the odometer and the land-proximity oracle
//! and update the at-sea and movement streaks independently.
//!
//! [`UPLOADS_PER_DAY_REQUIRED`]: seastreak_types::UPLOADS_PER_DAY_REQUIRED

use std::sync::Arc;
use std::time::Duration;

use time::Date;
use tracing::debug;

use seastreak_types::{
    DailyTelemetrySummary, DayClassification, DeviceStatistics, LAND_THRESHOLD_METERS,
    OdometerEndpoints,
};

use crate::error::{Result, bounded};
use crate::traits::{LandProximityOracle, TelemetrySource};

/// Result of evaluating one device-day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayEvaluation {
    /// The day evaluated.
    pub date: Date,
    /// How the day was classified.
    pub classification: DayClassification,
    /// Proposed statistics after the day.
    pub stats: DeviceStatistics,
}

/// Apply the buffer and coverage gates.
///
/// Returns `None` when the day must go on to full evaluation.
pub fn gate(summary: &DailyTelemetrySummary, stats: &DeviceStatistics) -> Option<DayEvaluation> {
    if summary.buffer_pending() {
        return Some(DayEvaluation {
            date: summary.date,
            classification: DayClassification::BufferPending,
            stats: *stats,
        });
    }

    if !summary.has_coverage() {
        return Some(DayEvaluation {
            date: summary.date,
            classification: DayClassification::InsufficientCoverage,
            stats: stats.resolved_on(summary.date),
        });
    }

    None
}

/// Fold a fully observed day into the statistics.
pub fn settle(
    date: Date,
    stats: &DeviceStatistics,
    near_land_positions: u32,
    odometer: &OdometerEndpoints,
) -> DayEvaluation {
    let all_at_sea = near_land_positions == 0;
    let moved = odometer.moved();

    let mut next = *stats;
    next.record_at_sea(all_at_sea);
    next.record_movement(moved);

    DayEvaluation {
        date,
        classification: DayClassification::Evaluated { all_at_sea, moved },
        stats: next.resolved_on(date),
    }
}

/// Evaluates single device-days against the telemetry store and oracle.
#[derive(Clone)]
pub struct DayEvaluator {
    telemetry: Arc<dyn TelemetrySource>,
    oracle: Arc<dyn LandProximityOracle>,
    call_timeout: Duration,
}

impl DayEvaluator {
    /// Create an evaluator whose backend calls each get `call_timeout`.
    pub fn new(
        telemetry: Arc<dyn TelemetrySource>,
        oracle: Arc<dyn LandProximityOracle>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            telemetry,
            oracle,
            call_timeout,
        }
    }

    /// Classify `date` for a device and propose its next statistics.
    ///
    /// Never mutates `stats`. Any backend failure is returned as an error
    /// and the day is left for a later run.
    pub async fn evaluate(
        &self,
        device_uid: &str,
        date: Date,
        stats: &DeviceStatistics,
    ) -> Result<DayEvaluation> {
        let records = bounded(
            self.call_timeout,
            "telemetry query",
            self.telemetry.uploads_on(device_uid, date),
        )
        .await?;

        let summary = DailyTelemetrySummary::from_records(date, &records);
        debug!(
            "{} {}: {} uploads, {} with GPS",
            device_uid, date, summary.upload_count, summary.gps_upload_count
        );

        if let Some(gated) = gate(&summary, stats) {
            debug!("{} {}: {}", device_uid, date, gated.classification);
            return Ok(gated);
        }

        let odometer = bounded(
            self.call_timeout,
            "odometer query",
            self.telemetry.odometer_endpoints(device_uid, date),
        )
        .await?;

        let near_land = bounded(
            self.call_timeout,
            "land-proximity query",
            self.oracle
                .count_near_land(device_uid, date, LAND_THRESHOLD_METERS),
        )
        .await?;

        let evaluation = settle(date, stats, near_land, &odometer);
        debug!(
            "{} {}: {} ({} near land, {:.2} nm)",
            device_uid,
            date,
            evaluation.classification,
            near_land,
            odometer.distance_nm()
        );

        Ok(evaluation)
    }
}

//! Core types for streak tracking.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::macros::{format_description, time};
use time::{Date, OffsetDateTime, Time};

use crate::error::{ParseError, ParseResult};

/// Minimum GPS-bearing uploads for a day to count (10 minute cadence over 20 hours).
pub const UPLOADS_PER_DAY_REQUIRED: usize = 120;

/// Distance from land, in statute miles, below which a position counts as "near land".
pub const LAND_THRESHOLD_MILES: f64 = 0.5;

/// Meters per statute mile.
pub const METERS_PER_STATUTE_MILE: f64 = 1609.34;

/// Near-land threshold handed to the land-proximity oracle.
pub const LAND_THRESHOLD_METERS: f64 = LAND_THRESHOLD_MILES * METERS_PER_STATUTE_MILE;

/// Odometer delta, in nautical miles, that makes a day a movement day.
pub const MOVEMENT_THRESHOLD_NM: f64 = 2.0;

/// How far back a never-evaluated device is caught up.
pub const INITIAL_BACKLOG_DAYS: i64 = 30;

#[cfg(feature = "serde")]
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Parse a `YYYY-MM-DD` calendar date.
///
/// # Examples
///
/// ```
/// use seastreak_types::parse_date;
///
/// let date = parse_date("2025-03-14").unwrap();
/// assert_eq!(date.day(), 14);
/// assert!(parse_date("14/03/2025").is_err());
/// ```
pub fn parse_date(s: &str) -> ParseResult<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .map_err(|_| ParseError::InvalidDate(s.to_string()))
}

/// Format a calendar date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| date.to_string())
}

/// UTC bounds `[00:00:00, 23:59:59]` of a calendar day.
pub fn utc_day_bounds(date: Date) -> (OffsetDateTime, OffsetDateTime) {
    (
        date.with_time(Time::MIDNIGHT).assume_utc(),
        date.with_time(time!(23:59:59)).assume_utc(),
    )
}

/// Durable streak state for one device.
///
/// A freshly seeded row is all zeros with no check date. Both streak pairs
/// keep `longest >= current` after every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceStatistics {
    /// Days ever classified as "all positions at sea".
    pub days_at_sea_alltime: u32,
    /// Consecutive at-sea days ending at `last_position_check_date`.
    pub current_streak_days: u32,
    /// Longest at-sea streak ever observed.
    pub longest_streak_days: u32,
    /// Consecutive movement days ending at `last_position_check_date`.
    pub consecutive_days_moving: u32,
    /// Longest movement streak ever observed.
    pub longest_consecutive_days_moving: u32,
    /// Last UTC date whose streak state was conclusively resolved.
    #[cfg_attr(feature = "serde", serde(with = "iso_date::option"))]
    pub last_position_check_date: Option<Date>,
}

impl DeviceStatistics {
    /// Apply one day's at-sea verdict.
    pub fn record_at_sea(&mut self, all_at_sea: bool) {
        if all_at_sea {
            self.current_streak_days = self.current_streak_days.saturating_add(1);
            self.days_at_sea_alltime = self.days_at_sea_alltime.saturating_add(1);
            self.longest_streak_days = self.longest_streak_days.max(self.current_streak_days);
        } else {
            self.current_streak_days = 0;
        }
    }

    /// Apply one day's movement verdict.
    pub fn record_movement(&mut self, moved: bool) {
        if moved {
            self.consecutive_days_moving = self.consecutive_days_moving.saturating_add(1);
            self.longest_consecutive_days_moving = self
                .longest_consecutive_days_moving
                .max(self.consecutive_days_moving);
        } else {
            self.consecutive_days_moving = 0;
        }
    }

    /// Mark `date` as resolved without touching any counter.
    #[must_use]
    pub fn resolved_on(mut self, date: Date) -> Self {
        self.last_position_check_date = Some(date);
        self
    }

    /// Whether both `longest >= current` orderings hold.
    pub fn is_consistent(&self) -> bool {
        self.longest_streak_days >= self.current_streak_days
            && self.longest_consecutive_days_moving >= self.consecutive_days_moving
    }
}

/// One telemetry upload as seen by the streak evaluator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelemetryRecord {
    /// Device that produced the upload.
    pub device_uid: String,
    /// Upload timestamp.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Averaged latitude over the upload interval.
    pub lat_avg: Option<f64>,
    /// Averaged longitude over the upload interval.
    pub lon_avg: Option<f64>,
    /// Cumulative distance odometer in nautical miles.
    pub total_dist: Option<f64>,
    /// Readings still held in the device's local buffer at upload time.
    pub buffered_uploads_remaining: Option<u32>,
}

impl TelemetryRecord {
    /// Create an upload with no position, odometer or backlog.
    pub fn new(device_uid: &str, timestamp: OffsetDateTime) -> Self {
        Self {
            device_uid: device_uid.to_string(),
            timestamp,
            lat_avg: None,
            lon_avg: None,
            total_dist: None,
            buffered_uploads_remaining: None,
        }
    }

    /// Set the averaged position.
    #[must_use]
    pub fn with_position(mut self, lat: f64, lon: f64) -> Self {
        self.lat_avg = Some(lat);
        self.lon_avg = Some(lon);
        self
    }

    /// Set the odometer reading.
    #[must_use]
    pub fn with_odometer(mut self, total_dist: f64) -> Self {
        self.total_dist = Some(total_dist);
        self
    }

    /// Set the buffered-upload backlog.
    #[must_use]
    pub fn with_backlog(mut self, remaining: u32) -> Self {
        self.buffered_uploads_remaining = Some(remaining);
        self
    }

    /// True when both coordinates are present and non-zero.
    ///
    /// Devices without a fix report `0.0, 0.0`, so zero is treated as missing.
    pub fn has_gps_fix(&self) -> bool {
        matches!(
            (self.lat_avg, self.lon_avg),
            (Some(lat), Some(lon)) if lat != 0.0 && lon != 0.0
        )
    }
}

/// Per-day digest of a device's uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DailyTelemetrySummary {
    /// The UTC calendar day summarized.
    #[cfg_attr(feature = "serde", serde(with = "iso_date"))]
    pub date: Date,
    /// Uploads recorded on the day.
    pub upload_count: usize,
    /// Uploads carrying a usable GPS fix.
    pub gps_upload_count: usize,
    /// Buffered backlog reported by the most recent upload of the day.
    pub latest_backlog: Option<u32>,
}

impl DailyTelemetrySummary {
    /// Summarize the uploads of `date`; record order does not matter.
    pub fn from_records(date: Date, records: &[TelemetryRecord]) -> Self {
        let latest = records.iter().max_by_key(|r| r.timestamp);
        Self {
            date,
            upload_count: records.len(),
            gps_upload_count: records.iter().filter(|r| r.has_gps_fix()).count(),
            latest_backlog: latest.and_then(|r| r.buffered_uploads_remaining),
        }
    }

    /// Whether the device still had readings buffered at its last upload.
    pub fn buffer_pending(&self) -> bool {
        self.latest_backlog.is_some_and(|n| n > 0)
    }

    /// Whether enough GPS-bearing uploads landed to judge the day.
    pub fn has_coverage(&self) -> bool {
        self.gps_upload_count >= UPLOADS_PER_DAY_REQUIRED
    }
}

/// Odometer readings at the first and last upload of a day.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OdometerEndpoints {
    /// Odometer of the day's first upload, in nautical miles.
    pub earliest: Option<f64>,
    /// Odometer of the day's last upload, in nautical miles.
    pub latest: Option<f64>,
}

impl OdometerEndpoints {
    /// Distance travelled over the day in nautical miles, 0 when an endpoint is missing.
    pub fn distance_nm(&self) -> f64 {
        match (self.earliest, self.latest) {
            (Some(earliest), Some(latest)) => latest - earliest,
            _ => 0.0,
        }
    }

    /// Whether the day counts as a movement day.
    pub fn moved(&self) -> bool {
        self.distance_nm() >= MOVEMENT_THRESHOLD_NM
    }
}

/// Outcome of evaluating one device-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum DayClassification {
    /// The device had unflushed readings; the day must be retried later.
    BufferPending,
    /// Too few GPS uploads; the day is resolved without touching streaks.
    InsufficientCoverage,
    /// Both streaks were updated.
    Evaluated { all_at_sea: bool, moved: bool },
}

impl DayClassification {
    /// Whether the day's check date advances.
    pub fn resolves_day(&self) -> bool {
        !matches!(self, DayClassification::BufferPending)
    }
}

impl fmt::Display for DayClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayClassification::BufferPending => write!(f, "buffer pending"),
            DayClassification::InsufficientCoverage => write!(f, "insufficient coverage"),
            DayClassification::Evaluated { all_at_sea, moved } => write!(
                f,
                "{}, {}",
                if *all_at_sea { "all at sea" } else { "near land" },
                if *moved { "moving" } else { "stationary" }
            ),
        }
    }
}

//! Shared types for at-sea and movement streak tracking.
//!
//! This crate provides the domain types used by the evaluator
//! (seastreak-core), persistence (seastreak-store) and the service.
//!
//! # Features
//!
//! - Durable per-device streak statistics
//! - Telemetry upload records and per-day summaries
//! - Day classification outcomes
//! - The contract thresholds (coverage, land distance, movement distance)
//!
//! # Example
//!
//! ```
//! use seastreak_types::DeviceStatistics;
//!
//! let mut stats = DeviceStatistics::default();
//! stats.record_at_sea(true);
//! assert_eq!(stats.current_streak_days, 1);
//! assert!(stats.is_consistent());
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    DailyTelemetrySummary, DayClassification, DeviceStatistics, INITIAL_BACKLOG_DAYS,
    LAND_THRESHOLD_METERS, LAND_THRESHOLD_MILES, METERS_PER_STATUTE_MILE, MOVEMENT_THRESHOLD_NM,
    OdometerEndpoints, TelemetryRecord, UPLOADS_PER_DAY_REQUIRED, format_date, parse_date,
    utc_day_bounds,
};

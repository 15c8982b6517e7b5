//! Daily at-sea and movement streak evaluation.
//!
//! Once a day, every device in the fleet is caught up from the day after its
//! last resolved date to yesterday (UTC). For each day the evaluator decides
//! whether the device stayed more than half a statute mile from land for the
//! whole day and whether it travelled at least two nautical miles, and the
//! driver persists the updated streaks one day at a time.
//!
//! # Components
//!
//! | Type | Role |
//! |------|------|
//! | [`DayEvaluator`] | Classifies one device-day from telemetry and the land oracle |
//! | [`CatchUpDriver`] | Folds a device's backlog in date order and persists each day |
//! | [`FleetRunController`] | Runs the driver for every device with bounded concurrency |
//! | [`RunSummary`] | Counters and per-device errors for a run |
//!
//! Collaborators are the traits in [`traits`]; [`InMemoryFleet`] implements
//! all of them for tests.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use seastreak_core::{
//!     CatchUpDriver, DayEvaluator, DriverOptions, FleetRunController, InMemoryFleet,
//!     RunOptions,
//! };
//! use time::macros::date;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> seastreak_core::Result<()> {
//!     let fleet = Arc::new(InMemoryFleet::new());
//!     fleet.add_device("SV-0042").await;
//!
//!     let evaluator = DayEvaluator::new(fleet.clone(), fleet.clone(), Duration::from_secs(10));
//!     let driver = CatchUpDriver::new(fleet.clone(), evaluator, DriverOptions::default());
//!     let controller = FleetRunController::new(fleet.clone(), driver, RunOptions::default());
//!
//!     let summary = controller
//!         .run_all(date!(2025 - 06 - 10), &CancellationToken::new())
//!         .await?;
//!     assert_eq!(summary.seeded, 1);
//!     Ok(())
//! }
//! ```

pub mod controller;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod mock;
pub mod summary;
pub mod traits;

pub use controller::{FleetRunController, RunOptions};
pub use driver::{BacklogWindow, CatchUpDriver, DriverOptions, UnresolvedDatePolicy};
pub use error::{BoxError, Error, Result};
pub use evaluator::{DayEvaluation, DayEvaluator, gate, settle};
pub use mock::{InMemoryFleet, synthetic_day};
pub use summary::{DateError, DeviceError, DeviceOutcome, RunCounters, RunSummary};
pub use traits::{DeviceDirectory, LandProximityOracle, StatisticsStore, TelemetrySource};

// Re-export from seastreak-types
pub use seastreak_types::{
    DailyTelemetrySummary, DayClassification, DeviceStatistics, OdometerEndpoints,
    TelemetryRecord,
};

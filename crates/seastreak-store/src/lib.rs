//! Local data persistence for device telemetry and streak statistics.
//!
//! This crate provides SQLite-based storage for the three tables the streak
//! evaluator reads and writes:
//!
//! - `devices`: every known device uid
//! - `telemetry`: append-only uploads (position, odometer, buffered backlog)
//! - `device_statistics`: one streak row per device, written conditionally
//!
//! # Example
//!
//! ```no_run
//! use seastreak_store::{Store, TelemetryQuery};
//!
//! let store = Store::open_default()?;
//!
//! let query = TelemetryQuery::new().device("SV-0042").limit(10);
//! let uploads = store.query_telemetry(&query)?;
//! # Ok::<(), seastreak_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{StoredDevice, StoredStatistics, StoredTelemetry};
pub use queries::TelemetryQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/seastreak/data.db`
/// - macOS: `~/Library/Application Support/seastreak/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\seastreak\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("seastreak")
        .join("data.db")
}

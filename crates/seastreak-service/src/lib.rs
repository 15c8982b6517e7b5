//! Daily streak scheduler and HTTP REST API for marine telemetry devices.
//!
//! This crate provides a service that:
//! - Runs the fleet-wide at-sea check once a day at a configured UTC time
//! - Catches every device up on the dates it has not evaluated yet
//! - Stores telemetry and streak statistics in the local database
//! - Queries an external land-proximity endpoint for each evaluated day
//! - Exposes a REST API for triggering runs and reading statistics
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check (no auth required)
//! - `GET /api/status` - Scheduler and run status
//! - `POST /api/runs` - Run the daily check now
//! - `GET /api/runs/last` - Summary of the last completed run
//! - `GET /api/devices` - List all known devices
//! - `GET /api/devices/{id}/statistics` - Streak statistics for a device
//! - `GET /api/devices/{id}/telemetry` - Paginated telemetry uploads for a device
//! - `GET /api/statistics` - Streak statistics for all devices
//! - `POST /api/telemetry` - Ingest telemetry uploads
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/seastreak/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/seastreak/data.db"
//!
//! [schedule]
//! enabled = true
//! run_at = "02:00"   # UTC
//!
//! [run]
//! max_concurrent_devices = 4
//! call_timeout_secs = 30
//! unresolved_date_policy = "halt"   # or "skip_and_continue"
//! initial_backlog_days = 30
//!
//! [oracle]
//! url = "https://db.example.com/rest/v1/rpc/count_positions_near_land"
//! api_key = "service-role-key"
//! timeout_secs = 30
//! ```
//!
//! # Security
//!
//! ```toml
//! [security]
//! # Require X-API-Key header for all requests (except /api/health)
//! api_key_enabled = true
//! api_key = "your-secure-random-key-at-least-16-chars"
//! ```

pub mod api;
pub mod backend;
pub mod config;
pub mod middleware;
pub mod oracle;
pub mod runner;
pub mod scheduler;
pub mod state;

pub use backend::SqliteBackend;
pub use config::{
    Config, ConfigError, OracleConfig, RunConfig, ScheduleConfig, SecurityConfig, ServerConfig,
    StorageConfig,
};
pub use oracle::HttpLandOracle;
pub use runner::{RunError, execute_run, execute_run_now};
pub use scheduler::Scheduler;
pub use state::AppState;

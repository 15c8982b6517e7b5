//! Error types for seastreak-store.

use std::path::PathBuf;

/// Result type for seastreak-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in seastreak-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The database was written by a newer release.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// Device not found in database.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The statistics row changed since it was read.
    #[error("Statistics for {device_uid} changed since read (expected last check {expected})")]
    StaleStatistics {
        device_uid: String,
        expected: String,
    },
}

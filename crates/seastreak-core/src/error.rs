//! Error types for seastreak-core.
//!
//! Errors fall into three tiers, and the tier decides how far a failure
//! reaches:
//!
//! | Tier | Raised when | Effect |
//! |------|-------------|--------|
//! | Run | [`Error::Directory`] while listing devices | The whole run fails |
//! | Device | Loading or seeding the statistics row fails | The device is skipped and reported |
//! | Date | A telemetry, oracle or save call fails on one date | The date stays unresolved |
//!
//! Backends convert their own errors into the matching variant with the
//! constructor helpers (e.g. [`Error::telemetry`]).

use std::future::Future;
use std::time::Duration;

/// Boxed backend error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for seastreak-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while evaluating streaks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device directory could not be read.
    #[error("Failed to fetch devices: {0}")]
    Directory(#[source] BoxError),

    /// The statistics store failed.
    #[error("Statistics store error: {0}")]
    Statistics(#[source] BoxError),

    /// The telemetry store failed.
    #[error("Failed to fetch telemetry: {0}")]
    Telemetry(#[source] BoxError),

    /// The land-proximity oracle failed.
    #[error("Spatial query failed: {0}")]
    Oracle(#[source] BoxError),

    /// The statistics row was changed by someone else since it was read.
    #[error("Statistics for {device_uid} were modified concurrently")]
    Conflict { device_uid: String },

    /// A backend call did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl Error {
    /// Wrap a device directory failure.
    pub fn directory(err: impl Into<BoxError>) -> Self {
        Error::Directory(err.into())
    }

    /// Wrap a statistics store failure.
    pub fn statistics(err: impl Into<BoxError>) -> Self {
        Error::Statistics(err.into())
    }

    /// Wrap a telemetry store failure.
    pub fn telemetry(err: impl Into<BoxError>) -> Self {
        Error::Telemetry(err.into())
    }

    /// Wrap an oracle failure.
    pub fn oracle(err: impl Into<BoxError>) -> Self {
        Error::Oracle(err.into())
    }
}

/// Run a backend call with an upper bound on its duration.
pub(crate) async fn bounded<T, F>(timeout: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout { operation, timeout }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::oracle("connection refused");
        assert_eq!(err.to_string(), "Spatial query failed: connection refused");

        let err = Error::Timeout {
            operation: "telemetry query",
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "telemetry query timed out after 5s");
    }

    #[test]
    fn test_error_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = Error::telemetry(io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "reset");
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Duration::from_secs(1), "slow call", async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;

        assert!(matches!(
            result,
            Err(Error::Timeout {
                operation: "slow call",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_bounded_passes_result_through() {
        let result = bounded(Duration::from_secs(1), "fast call", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

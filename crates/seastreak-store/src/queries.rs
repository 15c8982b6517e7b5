//! Query builder for telemetry uploads.
//!
//! [`TelemetryQuery`] follows the builder pattern for filtering and paginating
//! stored uploads.
//!
//! # Example
//!
//! ```
//! use seastreak_store::{Store, TelemetryQuery};
//! use time::macros::datetime;
//!
//! let store = Store::open_in_memory()?;
//!
//! // Latest upload of a day
//! let query = TelemetryQuery::new()
//!     .device("SV-0042")
//!     .since(datetime!(2025-06-01 00:00:00 UTC))
//!     .until(datetime!(2025-06-01 23:59:59 UTC))
//!     .limit(1);
//!
//! let latest = store.query_telemetry(&query)?;
//! assert!(latest.is_empty());
//! # Ok::<(), seastreak_store::Error>(())
//! ```

use time::OffsetDateTime;

/// Filters for [`Store::query_telemetry`](crate::Store::query_telemetry).
///
/// An empty query matches every upload, newest first.
#[derive(Debug, Default, Clone)]
pub struct TelemetryQuery {
    /// Filter by device uid.
    pub device_uid: Option<String>,
    /// Include only uploads at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include only uploads at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Row cap.
    pub limit: Option<u32>,
    /// Rows skipped before the first returned one.
    pub offset: Option<u32>,
    /// Descending timestamp order.
    pub newest_first: bool,
}

impl TelemetryQuery {
    /// A query matching every upload, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by device uid.
    pub fn device(mut self, device_uid: &str) -> Self {
        self.device_uid = Some(device_uid.to_string());
        self
    }

    /// Filter to uploads at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to uploads at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Return at most `limit` uploads.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` matching uploads.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Return uploads in upload order.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// WHERE clause with its positional parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref device_uid) = self.device_uid {
            conditions.push("device_uid = ?");
            params.push(Box::new(device_uid.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// SELECT statement for this query; binds the parameters of [`Self::build_where`].
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, device_uid, timestamp, lat_avg, lon_avg, total_dist, \
             buffered_uploads_remaining \
             FROM telemetry {} ORDER BY timestamp {}",
            where_clause, order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            // SQLite only accepts OFFSET after a LIMIT
            if self.limit.is_none() {
                sql.push_str(" LIMIT -1");
            }
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}

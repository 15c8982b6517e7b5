//! Error types for data parsing in seastreak-types.

use thiserror::Error;

/// Errors that can occur when parsing stored or transmitted values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A calendar date was not in `YYYY-MM-DD` form.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Result type alias using seastreak-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

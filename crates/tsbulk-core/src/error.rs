//! Error types for tsbulk-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Empty measurement name")]
    EmptyMeasurement,

    #[error("Empty tag key")]
    EmptyTagKey,

    #[error("Empty field key")]
    EmptyFieldKey,

    #[error("no fields input")]
    NoFields,

    #[error("incorrect timestamp precision ({0}), only support (s, ms, us, ns)")]
    InvalidPrecision(String),

    #[error("timestamp {timestamp} overflows at precision {precision}")]
    TimestampOverflow { timestamp: i64, precision: String },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

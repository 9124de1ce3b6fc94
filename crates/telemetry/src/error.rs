//! Validation Error Types

use thiserror::Error;

/// Errors raised while validating an inbound telemetry sample
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Subject id is empty or blank
    #[error("Missing required field: subject id")]
    MissingSubject,

    /// Sample carries identifying fields only
    #[error("Sample contains no measured field")]
    NoMeasurement,

    /// NaN or infinite numeric value
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    /// Timestamp too far ahead of the server clock
    #[error("timestamp is {ahead_secs}s in the future (allowed skew {max_skew_secs}s)")]
    FutureTimestamp { ahead_secs: i64, max_skew_secs: i64 },

    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
}

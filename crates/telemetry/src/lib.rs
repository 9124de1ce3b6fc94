//! Telemetry Model and Validation
//!
//! Provides the sample type reported by wearables and phones, plus input
//! validation applied before a sample reaches the alerting engine.

mod error;
mod sample;
mod validator;

pub use error::ValidationError;
pub use sample::{Position, SubjectId, TelemetrySample};
pub use validator::{ValidationConfig, Validator};

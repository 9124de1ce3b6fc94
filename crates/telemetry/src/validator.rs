//! Sample Validator for Range Checking

use crate::error::ValidationError;
use crate::sample::TelemetrySample;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Latitude valid range (degrees)
    pub latitude_range: (f64, f64),
    /// Longitude valid range (degrees)
    pub longitude_range: (f64, f64),
    /// Separation distance valid range (metres)
    pub separation_range: (f64, f64),
    /// How far a sample may be stamped ahead of the server clock (seconds)
    pub max_future_skew_secs: i64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            latitude_range: (-90.0, 90.0),
            longitude_range: (-180.0, 180.0),
            separation_range: (0.0, f64::MAX),
            max_future_skew_secs: 60,
        }
    }
}

/// Validator for inbound telemetry samples.
///
/// Heart rate and stress are only checked for finiteness. Implausible but
/// finite readings are passed through so the rule evaluator sees them.
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    /// Create a new validator with given config
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a sample against the current time
    pub fn validate(&self, sample: &TelemetrySample) -> Result<(), ValidationError> {
        self.validate_at(sample, Utc::now())
    }

    /// Validate a sample, returning the first problem found
    pub fn validate_at(
        &self,
        sample: &TelemetrySample,
        now: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        if sample.subject.is_blank() {
            return Err(ValidationError::MissingSubject);
        }
        if !sample.has_measurement() {
            return Err(ValidationError::NoMeasurement);
        }

        let ahead = sample.timestamp - now;
        if ahead > Duration::seconds(self.config.max_future_skew_secs) {
            return Err(ValidationError::FutureTimestamp {
                ahead_secs: ahead.num_seconds(),
                max_skew_secs: self.config.max_future_skew_secs,
            });
        }

        if let Some(position) = sample.position {
            self.validate_range("latitude", position.latitude, self.config.latitude_range)?;
            self.validate_range("longitude", position.longitude, self.config.longitude_range)?;
        }
        if let Some(bpm) = sample.heart_rate {
            Self::validate_finite("heart_rate", bpm)?;
        }
        if let Some(stress) = sample.stress_level {
            Self::validate_finite("stress_level", stress)?;
        }
        if let Some(metres) = sample.separation_m {
            self.validate_range("separation_m", metres, self.config.separation_range)?;
        }

        debug!("Sample for {} passed validation", sample.subject);
        Ok(())
    }

    /// Validate a single value against a range
    pub fn validate_range(
        &self,
        field: &'static str,
        value: f64,
        range: (f64, f64),
    ) -> Result<(), ValidationError> {
        Self::validate_finite(field, value)?;
        if value < range.0 || value > range.1 {
            Err(ValidationError::OutOfRange {
                field,
                value,
                min: range.0,
                max: range.1,
            })
        } else {
            Ok(())
        }
    }

    fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(ValidationError::NonFinite { field })
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

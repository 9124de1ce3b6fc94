//! Telemetry sample model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a monitored person or device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the id has no visible characters
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SubjectId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// GPS fix in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// One observation reported for a subject.
///
/// Every measured field is optional. An absent field means "unknown" and is
/// never read as zero; a present zero is a real reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub subject: SubjectId,
    pub timestamp: DateTime<Utc>,
    pub position: Option<Position>,
    /// Beats per minute
    pub heart_rate: Option<f64>,
    pub stress_level: Option<f64>,
    pub fall_detected: Option<bool>,
    /// Distance from companions in metres
    pub separation_m: Option<f64>,
    pub sos: Option<bool>,
}

impl TelemetrySample {
    /// Create a sample with no measurements
    pub fn new(subject: impl Into<SubjectId>, timestamp: DateTime<Utc>) -> Self {
        Self {
            subject: subject.into(),
            timestamp,
            position: None,
            heart_rate: None,
            stress_level: None,
            fall_detected: None,
            separation_m: None,
            sos: None,
        }
    }

    pub fn with_position(mut self, latitude: f64, longitude: f64) -> Self {
        self.position = Some(Position::new(latitude, longitude));
        self
    }

    pub fn with_heart_rate(mut self, bpm: f64) -> Self {
        self.heart_rate = Some(bpm);
        self
    }

    pub fn with_stress_level(mut self, level: f64) -> Self {
        self.stress_level = Some(level);
        self
    }

    pub fn with_fall_detected(mut self, fallen: bool) -> Self {
        self.fall_detected = Some(fallen);
        self
    }

    pub fn with_separation(mut self, metres: f64) -> Self {
        self.separation_m = Some(metres);
        self
    }

    pub fn with_sos(mut self, pressed: bool) -> Self {
        self.sos = Some(pressed);
        self
    }

    /// Whether at least one measured field is present
    pub fn has_measurement(&self) -> bool {
        self.position.is_some()
            || self.heart_rate.is_some()
            || self.stress_level.is_some()
            || self.fall_detected.is_some()
            || self.separation_m.is_some()
            || self.sos.is_some()
    }

    /// Position formatted for alert text
    pub fn gps_label(&self) -> String {
        self.position
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

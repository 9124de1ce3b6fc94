//! Stored threshold preferences

use serde::{Deserialize, Serialize};

/// Threshold preferences as stored for one subject.
///
/// Any field may be missing; the alerting engine fills gaps from system
/// defaults field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRecord {
    #[serde(default)]
    pub max_heart_rate: Option<f64>,
    #[serde(default)]
    pub min_heart_rate: Option<f64>,
    #[serde(default)]
    pub max_stress_level: Option<f64>,
    /// Metres
    #[serde(default)]
    pub max_distance_apart: Option<f64>,
    /// Seconds between the warning and the escalation re-check
    #[serde(default, alias = "countdownBeforeNotify")]
    pub grace_period_secs: Option<u64>,
}

impl PreferenceRecord {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

//! Alert rule evaluation
//!
//! Maps a sample and the subject's thresholds to the set of conditions it
//! triggers. Pure: no I/O, no clock.

use crate::profile::ThresholdProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use telemetry::TelemetrySample;

/// A triggered alert condition.
///
/// Declaration order is the order used when composing alert text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCondition {
    Sos,
    FallDetected,
    HeartRateHigh,
    HeartRateLow,
    StressHigh,
    SeparationExceeded,
}

impl AlertCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sos => "sos",
            Self::FallDetected => "fall_detected",
            Self::HeartRateHigh => "heart_rate_high",
            Self::HeartRateLow => "heart_rate_low",
            Self::StressHigh => "stress_high",
            Self::SeparationExceeded => "separation_exceeded",
        }
    }
}

impl fmt::Display for AlertCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of triggered conditions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConditionSet(BTreeSet<AlertCondition>);

impl ConditionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, condition: AlertCondition) {
        self.0.insert(condition);
    }

    pub fn contains(&self, condition: AlertCondition) -> bool {
        self.0.contains(&condition)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_sos(&self) -> bool {
        self.contains(AlertCondition::Sos)
    }

    /// Conditions in message order
    pub fn iter(&self) -> impl Iterator<Item = AlertCondition> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<AlertCondition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = AlertCondition>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ConditionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Evaluate a sample against a profile.
///
/// An SOS short-circuits to `{Sos}`. Absent fields never trigger; present
/// values are compared literally, so a zero heart rate is below any
/// positive minimum.
pub fn evaluate(sample: &TelemetrySample, profile: &ThresholdProfile) -> ConditionSet {
    let mut conditions = ConditionSet::new();

    if sample.sos == Some(true) {
        conditions.insert(AlertCondition::Sos);
        return conditions;
    }

    if sample.fall_detected == Some(true) {
        conditions.insert(AlertCondition::FallDetected);
    }

    if let Some(bpm) = sample.heart_rate {
        if bpm > profile.max_heart_rate {
            conditions.insert(AlertCondition::HeartRateHigh);
        }
        if bpm < profile.min_heart_rate {
            conditions.insert(AlertCondition::HeartRateLow);
        }
    }

    if let Some(stress) = sample.stress_level {
        if stress > profile.max_stress_level {
            conditions.insert(AlertCondition::StressHigh);
        }
    }

    if let Some(metres) = sample.separation_m {
        if metres > profile.max_distance_apart {
            conditions.insert(AlertCondition::SeparationExceeded);
        }
    }

    conditions
}

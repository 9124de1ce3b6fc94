//! Alert text composition

use crate::profile::ThresholdProfile;
use crate::rules::{AlertCondition, ConditionSet};
use telemetry::TelemetrySample;

/// Describe one condition using the sample's reading and the limit it broke
fn describe(condition: AlertCondition, sample: &TelemetrySample, profile: &ThresholdProfile) -> String {
    let reading = |v: Option<f64>| v.map(|v| format!("{v}")).unwrap_or_else(|| "?".to_string());

    match condition {
        AlertCondition::Sos => "SOS button pressed".to_string(),
        AlertCondition::FallDetected => "fall detected".to_string(),
        AlertCondition::HeartRateHigh => format!(
            "heart rate {} bpm above maximum {}",
            reading(sample.heart_rate),
            profile.max_heart_rate
        ),
        AlertCondition::HeartRateLow => format!(
            "heart rate {} bpm below minimum {}",
            reading(sample.heart_rate),
            profile.min_heart_rate
        ),
        AlertCondition::StressHigh => format!(
            "stress level {} above maximum {}",
            reading(sample.stress_level),
            profile.max_stress_level
        ),
        AlertCondition::SeparationExceeded => format!(
            "more than {}m from friends ({}m)",
            profile.max_distance_apart,
            reading(sample.separation_m)
        ),
    }
}

fn describe_all(conditions: &ConditionSet, sample: &TelemetrySample, profile: &ThresholdProfile) -> String {
    conditions
        .iter()
        .map(|c| describe(c, sample, profile))
        .collect::<Vec<_>>()
        .join("; ")
}

/// First-phase message to the subject
pub fn warning(conditions: &ConditionSet, sample: &TelemetrySample, profile: &ThresholdProfile) -> (String, String) {
    let title = "Safety Warning".to_string();
    let body = format!(
        "WARNING: You ({}) triggered a safety check: {}.\nGPS: {}\nPlease check in within {} seconds to avoid notifying your friends.",
        sample.subject,
        describe_all(conditions, sample, profile),
        sample.gps_label(),
        profile.grace_period_secs
    );
    (title, body)
}

/// Second-phase message to the rest of the group
pub fn escalation(conditions: &ConditionSet, sample: &TelemetrySample, profile: &ThresholdProfile) -> (String, String) {
    let title = "Friend Safety Alert".to_string();
    let body = format!(
        "ALERT: {} still needs attention after {} seconds: {}.\nGPS: {}\nPlease check on them.",
        sample.subject,
        profile.grace_period_secs,
        describe_all(conditions, sample, profile),
        sample.gps_label()
    );
    (title, body)
}

/// Immediate SOS message to the rest of the group
pub fn sos(sample: &TelemetrySample) -> (String, String) {
    let title = "Friend SOS Alert".to_string();
    let body = format!(
        "ALERT: Friend {} pressed the SOS button!\nGPS: {}",
        sample.subject,
        sample.gps_label()
    );
    (title, body)
}

//! Threshold preference endpoints

use crate::error::ApiError;
use crate::AppState;
use alerting::ThresholdProfile;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use storage::PreferenceRecord;
use telemetry::SubjectId;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    /// What the subject has stored, if anything
    pub stored: Option<PreferenceRecord>,
    /// Thresholds the engine will apply
    pub effective: ThresholdProfile,
}

/// GET /api/v1/subjects/:id/preferences
pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let subject = SubjectId::new(id);
    let stored = state.preferences.get(&subject).await?;
    let effective = state.engine.resolver().resolve(&subject).await;
    Ok(Json(PreferencesResponse { stored, effective }))
}

/// PUT /api/v1/subjects/:id/preferences
pub async fn put_preferences(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(record): Json<PreferenceRecord>,
) -> Result<Json<PreferencesResponse>, ApiError> {
    let subject = SubjectId::new(id);
    if subject.is_blank() {
        return Err(ApiError::BadRequest("Subject id is required".to_string()));
    }
    check_record(&record, state.engine.resolver().defaults())?;

    state.preferences.put(&subject, &record).await?;
    info!("Updated preferences for {}", subject);

    let effective = state.engine.resolver().resolve(&subject).await;
    Ok(Json(PreferencesResponse {
        stored: Some(record),
        effective,
    }))
}

fn check_record(record: &PreferenceRecord, defaults: &ThresholdProfile) -> Result<(), ApiError> {
    let thresholds = [
        ("maxHeartRate", record.max_heart_rate),
        ("minHeartRate", record.min_heart_rate),
        ("maxStressLevel", record.max_stress_level),
        ("maxDistanceApart", record.max_distance_apart),
    ];
    for (field, value) in thresholds {
        if let Some(v) = value {
            if !v.is_finite() || v <= 0.0 {
                return Err(ApiError::BadRequest(format!(
                    "{} must be a positive number",
                    field
                )));
            }
        }
    }
    if record.grace_period_secs == Some(0) {
        return Err(ApiError::BadRequest(
            "countdownBeforeNotify must be positive".to_string(),
        ));
    }

    // Compare against whichever bound the record leaves to the defaults
    let merged = defaults.merged_with(record);
    if merged.min_heart_rate >= merged.max_heart_rate {
        return Err(ApiError::BadRequest(
            "minHeartRate must be below maxHeartRate".to_string(),
        ));
    }
    Ok(())
}

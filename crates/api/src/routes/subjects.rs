//! Subject status and history endpoints

use super::clamp_limit;
use crate::error::ApiError;
use crate::AppState;
use alerting::CaseSnapshot;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telemetry::{SubjectId, TelemetrySample};

/// One reading under the field names the mobile client posts
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleView {
    pub friend_id: SubjectId,
    pub updated_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heart_rate: Option<f64>,
    pub stress_level: Option<f64>,
    pub fall_detected: Option<bool>,
    pub distance_from_friends: Option<f64>,
    pub sos: Option<bool>,
}

impl From<TelemetrySample> for SampleView {
    fn from(sample: TelemetrySample) -> Self {
        Self {
            friend_id: sample.subject,
            updated_at: sample.timestamp,
            latitude: sample.position.map(|p| p.latitude),
            longitude: sample.position.map(|p| p.longitude),
            heart_rate: sample.heart_rate,
            stress_level: sample.stress_level,
            fall_detected: sample.fall_detected,
            distance_from_friends: sample.separation_m,
            sos: sample.sos,
        }
    }
}

/// Latest reading for a subject, as shown to companions
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub sample: SampleView,
    /// Open escalation case, if any
    pub escalation: Option<CaseSnapshot>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/subjects/:id/status
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let subject = SubjectId::new(id);
    let sample = state
        .telemetry
        .get_latest(&subject)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No telemetry for {}", subject)))?;
    let escalation = state.engine.coordinator().case_for(&subject).await;

    Ok(Json(StatusResponse {
        sample: sample.into(),
        escalation,
    }))
}

/// GET /api/v1/subjects/:id/history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<SampleView>>, ApiError> {
    let subject = SubjectId::new(id);
    let samples = state
        .telemetry
        .history(&subject, clamp_limit(query.limit))
        .await?;
    Ok(Json(samples.into_iter().map(SampleView::from).collect()))
}

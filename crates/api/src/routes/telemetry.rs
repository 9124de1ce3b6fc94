//! Telemetry ingestion endpoint

use crate::error::ApiError;
use crate::AppState;
use alerting::IngestReport;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use telemetry::{Position, TelemetrySample};

/// Body posted by a wearable or phone
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRequest {
    #[serde(alias = "subjectId")]
    pub friend_id: String,
    /// Defaults to the time of receipt
    pub timestamp: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub heart_rate: Option<f64>,
    pub stress_level: Option<f64>,
    pub fall_detected: Option<bool>,
    /// Metres to the nearest companion
    pub distance_from_friends: Option<f64>,
    pub sos: Option<bool>,
}

impl TelemetryRequest {
    fn into_sample(self) -> Result<TelemetrySample, ApiError> {
        let mut sample =
            TelemetrySample::new(self.friend_id, self.timestamp.unwrap_or_else(Utc::now));

        sample.position = match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Position { latitude, longitude }),
            (None, None) => None,
            _ => {
                return Err(ApiError::BadRequest(
                    "latitude and longitude must be given together".to_string(),
                ))
            }
        };
        sample.heart_rate = self.heart_rate;
        sample.stress_level = self.stress_level;
        sample.fall_detected = self.fall_detected;
        sample.separation_m = self.distance_from_friends;
        sample.sos = self.sos;
        Ok(sample)
    }
}

/// POST /api/v1/telemetry
pub async fn ingest(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TelemetryRequest>,
) -> Result<Json<IngestReport>, ApiError> {
    let sample = request.into_sample()?;
    let report = state.engine.ingest(sample).await?;
    Ok(Json(report))
}

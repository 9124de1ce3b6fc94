//! Escalation case endpoints

use super::clamp_limit;
use crate::AppState;
use alerting::{CaseSnapshot, EscalationRecord};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct EscalationQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/escalations
pub async fn get_active(State(state): State<Arc<AppState>>) -> Json<Vec<CaseSnapshot>> {
    Json(state.engine.coordinator().active_cases().await)
}

/// GET /api/v1/escalations/history
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EscalationQuery>,
) -> Json<Vec<EscalationRecord>> {
    Json(state.engine.coordinator().history(clamp_limit(query.limit)))
}

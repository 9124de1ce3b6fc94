//! API error responses

use alerting::{ConditionSet, IngestError, Transition};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use storage::StorageError;
use thiserror::Error;
use tracing::error;

/// Errors returned by handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conditions: Option<ConditionSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    transition: Option<Transition>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, conditions, transition) = match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, None, None),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, None, None),
            ApiError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, None, None),
            ApiError::Ingest(IngestError::Validation(_)) => (StatusCode::BAD_REQUEST, None, None),
            // The escalation already happened; tell the caller what it was
            ApiError::Ingest(IngestError::Persist { report, .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Some(report.conditions),
                Some(report.transition),
            ),
        };

        if status.is_server_error() {
            error!("Request failed: {}", message);
        }

        let body = ErrorBody {
            error: message,
            conditions,
            transition,
        };
        (status, Json(body)).into_response()
    }
}

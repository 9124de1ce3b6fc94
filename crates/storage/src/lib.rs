//! Storage Layer
//!
//! Persistence for telemetry history and per-subject threshold preferences.
//! The alerting engine only sees the [`TelemetryStore`] and
//! [`PreferenceStore`] traits; an in-memory repository and a SQLite
//! repository implement both.

mod preferences;
mod repository;
mod sqlite;

pub use preferences::PreferenceRecord;
pub use repository::Repository;
pub use sqlite::SqliteRepository;

use async_trait::async_trait;
use telemetry::{SubjectId, TelemetrySample};
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Record not found")]
    NotFound,
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound,
            other => StorageError::DatabaseError(other.to_string()),
        }
    }
}

/// Append-only telemetry history with a "latest sample" view per subject.
///
/// Writes never overwrite earlier samples. Implementations provide per-key
/// atomicity only.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Append a sample to the subject's history
    async fn put_latest(&self, sample: &TelemetrySample) -> Result<(), StorageError>;

    /// Sample with the greatest timestamp for the subject
    async fn get_latest(&self, subject: &SubjectId) -> Result<Option<TelemetrySample>, StorageError>;

    /// Most recent samples for the subject, newest first
    async fn history(
        &self,
        subject: &SubjectId,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, StorageError>;
}

/// Per-subject threshold preferences written by the preferences path
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, subject: &SubjectId) -> Result<Option<PreferenceRecord>, StorageError>;

    /// Replace the subject's stored record
    async fn put(&self, subject: &SubjectId, record: &PreferenceRecord) -> Result<(), StorageError>;
}

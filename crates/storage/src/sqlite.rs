//! SQLite Repository Implementation

use crate::{PreferenceRecord, PreferenceStore, StorageError, TelemetryStore};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use telemetry::{Position, SubjectId, TelemetrySample};
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS telemetry (
        seq            INTEGER PRIMARY KEY AUTOINCREMENT,
        subject_id     TEXT    NOT NULL,
        timestamp_ms   INTEGER NOT NULL,
        latitude       REAL,
        longitude      REAL,
        heart_rate     REAL,
        stress_level   REAL,
        fall_detected  INTEGER,
        separation_m   REAL,
        sos            INTEGER
    )",
    "CREATE INDEX IF NOT EXISTS telemetry_subject_time
        ON telemetry (subject_id, timestamp_ms DESC, seq DESC)",
    "CREATE TABLE IF NOT EXISTS preferences (
        subject_id         TEXT PRIMARY KEY,
        max_heart_rate     REAL,
        min_heart_rate     REAL,
        max_stress_level   REAL,
        max_distance_apart REAL,
        grace_period_secs  INTEGER
    )",
];

/// SQLite-backed repository
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Open (creating if missing) the database at `url` and apply the schema.
    ///
    /// `sqlite::memory:` gives a private database on a single connection.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let in_memory = url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(if in_memory {
                SqliteJournalMode::Memory
            } else {
                SqliteJournalMode::Wal
            });

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("Opened SQLite repository at {}", url);

        Ok(Self { pool })
    }

    fn sample_from_row(row: &SqliteRow) -> Result<TelemetrySample, StorageError> {
        let timestamp_ms: i64 = row.try_get("timestamp_ms")?;
        let timestamp = DateTime::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            StorageError::SerializationError(format!("invalid timestamp {}", timestamp_ms))
        })?;
        let latitude: Option<f64> = row.try_get("latitude")?;
        let longitude: Option<f64> = row.try_get("longitude")?;

        Ok(TelemetrySample {
            subject: SubjectId::new(row.try_get::<String, _>("subject_id")?),
            timestamp,
            position: latitude.zip(longitude).map(|(lat, lon)| Position::new(lat, lon)),
            heart_rate: row.try_get("heart_rate")?,
            stress_level: row.try_get("stress_level")?,
            fall_detected: row.try_get("fall_detected")?,
            separation_m: row.try_get("separation_m")?,
            sos: row.try_get("sos")?,
        })
    }
}

#[async_trait]
impl TelemetryStore for SqliteRepository {
    async fn put_latest(&self, sample: &TelemetrySample) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO telemetry (subject_id, timestamp_ms, latitude, longitude, heart_rate, \
             stress_level, fall_detected, separation_m, sos) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(sample.subject.as_str())
        .bind(sample.timestamp.timestamp_millis())
        .bind(sample.position.map(|p| p.latitude))
        .bind(sample.position.map(|p| p.longitude))
        .bind(sample.heart_rate)
        .bind(sample.stress_level)
        .bind(sample.fall_detected)
        .bind(sample.separation_m)
        .bind(sample.sos)
        .execute(&self.pool)
        .await?;

        debug!("Inserted sample for {}", sample.subject);
        Ok(())
    }

    async fn get_latest(&self, subject: &SubjectId) -> Result<Option<TelemetrySample>, StorageError> {
        let row = sqlx::query(
            "SELECT * FROM telemetry WHERE subject_id = ? \
             ORDER BY timestamp_ms DESC, seq DESC LIMIT 1",
        )
        .bind(subject.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::sample_from_row).transpose()
    }

    async fn history(
        &self,
        subject: &SubjectId,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, StorageError> {
        let rows = sqlx::query(
            "SELECT * FROM telemetry WHERE subject_id = ? \
             ORDER BY timestamp_ms DESC, seq DESC LIMIT ?",
        )
        .bind(subject.as_str())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::sample_from_row).collect()
    }
}

#[async_trait]
impl PreferenceStore for SqliteRepository {
    async fn get(&self, subject: &SubjectId) -> Result<Option<PreferenceRecord>, StorageError> {
        let row = sqlx::query("SELECT * FROM preferences WHERE subject_id = ?")
            .bind(subject.as_str())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let grace: Option<i64> = row.try_get("grace_period_secs")?;
        Ok(Some(PreferenceRecord {
            max_heart_rate: row.try_get("max_heart_rate")?,
            min_heart_rate: row.try_get("min_heart_rate")?,
            max_stress_level: row.try_get("max_stress_level")?,
            max_distance_apart: row.try_get("max_distance_apart")?,
            grace_period_secs: grace.and_then(|s| u64::try_from(s).ok()),
        }))
    }

    async fn put(&self, subject: &SubjectId, record: &PreferenceRecord) -> Result<(), StorageError> {
        let grace = record
            .grace_period_secs
            .map(i64::try_from)
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        sqlx::query(
            "INSERT INTO preferences (subject_id, max_heart_rate, min_heart_rate, \
             max_stress_level, max_distance_apart, grace_period_secs) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(subject_id) DO UPDATE SET \
             max_heart_rate = excluded.max_heart_rate, \
             min_heart_rate = excluded.min_heart_rate, \
             max_stress_level = excluded.max_stress_level, \
             max_distance_apart = excluded.max_distance_apart, \
             grace_period_secs = excluded.grace_period_secs",
        )
        .bind(subject.as_str())
        .bind(record.max_heart_rate)
        .bind(record.min_heart_rate)
        .bind(record.max_stress_level)
        .bind(record.max_distance_apart)
        .bind(grace)
        .execute(&self.pool)
        .await?;

        debug!("Upserted preferences for {}", subject);
        Ok(())
    }
}

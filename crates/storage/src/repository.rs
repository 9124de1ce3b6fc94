//! In-memory Repository Implementation

use crate::{PreferenceRecord, PreferenceStore, StorageError, TelemetryStore};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use telemetry::{SubjectId, TelemetrySample};
use tracing::{debug, info};

/// Repository for telemetry and preferences held in process memory
pub struct Repository {
    /// Sample history per subject, ascending by timestamp
    samples: Mutex<HashMap<SubjectId, VecDeque<TelemetrySample>>>,
    /// Stored preference records
    preferences: Mutex<HashMap<SubjectId, PreferenceRecord>>,
    /// Max samples retained per subject
    max_samples_per_subject: usize,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn new() -> Self {
        Self::with_retention(10_000)
    }

    /// Create a repository keeping at most `max_samples_per_subject` samples
    pub fn with_retention(max_samples_per_subject: usize) -> Self {
        info!(
            "Creating in-memory repository (retention {} samples per subject)",
            max_samples_per_subject
        );
        Self {
            samples: Mutex::new(HashMap::new()),
            preferences: Mutex::new(HashMap::new()),
            max_samples_per_subject: max_samples_per_subject.max(1),
        }
    }

    /// Get total sample count across subjects
    pub fn sample_count(&self) -> usize {
        self.samples
            .lock()
            .map(|s| s.values().map(VecDeque::len).sum())
            .unwrap_or(0)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::DatabaseError(format!("Lock error: {}", e))
}

#[async_trait]
impl TelemetryStore for Repository {
    async fn put_latest(&self, sample: &TelemetrySample) -> Result<(), StorageError> {
        let mut samples = self.samples.lock().map_err(lock_error)?;
        let history = samples.entry(sample.subject.clone()).or_default();

        // Late arrivals are slotted into place so the back stays the latest
        let at = history.partition_point(|s| s.timestamp <= sample.timestamp);
        history.insert(at, sample.clone());

        // Enforce retention
        while history.len() > self.max_samples_per_subject {
            history.pop_front();
        }

        debug!("Stored sample for {} ({} retained)", sample.subject, history.len());
        Ok(())
    }

    async fn get_latest(&self, subject: &SubjectId) -> Result<Option<TelemetrySample>, StorageError> {
        let samples = self.samples.lock().map_err(lock_error)?;
        Ok(samples.get(subject).and_then(|h| h.back().cloned()))
    }

    async fn history(
        &self,
        subject: &SubjectId,
        limit: usize,
    ) -> Result<Vec<TelemetrySample>, StorageError> {
        let samples = self.samples.lock().map_err(lock_error)?;
        Ok(samples
            .get(subject)
            .map(|h| h.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PreferenceStore for Repository {
    async fn get(&self, subject: &SubjectId) -> Result<Option<PreferenceRecord>, StorageError> {
        let prefs = self.preferences.lock().map_err(lock_error)?;
        Ok(prefs.get(subject).cloned())
    }

    async fn put(&self, subject: &SubjectId, record: &PreferenceRecord) -> Result<(), StorageError> {
        let mut prefs = self.preferences.lock().map_err(lock_error)?;
        prefs.insert(subject.clone(), record.clone());
        debug!("Stored preferences for {}", subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_sample_insert_and_latest() {
        let repo = Repository::new();
        let subject = SubjectId::new("alice");
        let t0 = Utc::now();

        repo.put_latest(&TelemetrySample::new("alice", t0).with_heart_rate(70.0))
            .await
            .unwrap();
        repo.put_latest(&TelemetrySample::new("alice", t0 + Duration::seconds(5)).with_heart_rate(90.0))
            .await
            .unwrap();

        let latest = repo.get_latest(&subject).await.unwrap().unwrap();
        assert_eq!(latest.heart_rate, Some(90.0));
        assert_eq!(repo.history(&subject, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_late_sample_does_not_become_latest() {
        let repo = Repository::new();
        let subject = SubjectId::new("alice");
        let t0 = Utc::now();

        repo.put_latest(&TelemetrySample::new("alice", t0).with_heart_rate(90.0))
            .await
            .unwrap();
        repo.put_latest(&TelemetrySample::new("alice", t0 - Duration::seconds(30)).with_heart_rate(60.0))
            .await
            .unwrap();

        let latest = repo.get_latest(&subject).await.unwrap().unwrap();
        assert_eq!(latest.heart_rate, Some(90.0));

        let history = repo.history(&subject, 10).await.unwrap();
        assert_eq!(history[0].heart_rate, Some(90.0));
        assert_eq!(history[1].heart_rate, Some(60.0));
    }

    #[tokio::test]
    async fn test_unknown_subject() {
        let repo = Repository::new();
        let subject = SubjectId::new("nobody");
        assert!(repo.get_latest(&subject).await.unwrap().is_none());
        assert!(repo.history(&subject, 5).await.unwrap().is_empty());
        assert!(PreferenceStore::get(&repo, &subject).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retention_limit() {
        let repo = Repository::with_retention(5);
        let t0 = Utc::now();

        for i in 0..10 {
            repo.put_latest(&TelemetrySample::new("alice", t0 + Duration::seconds(i)).with_heart_rate(i as f64))
                .await
                .unwrap();
        }

        assert_eq!(repo.sample_count(), 5);
        let latest = repo.get_latest(&SubjectId::new("alice")).await.unwrap().unwrap();
        assert_eq!(latest.heart_rate, Some(9.0));
    }

    #[tokio::test]
    async fn test_preference_round_trip() {
        let repo = Repository::new();
        let subject = SubjectId::new("alice");
        let record = PreferenceRecord {
            max_heart_rate: Some(170.0),
            ..Default::default()
        };

        repo.put(&subject, &record).await.unwrap();
        assert_eq!(PreferenceStore::get(&repo, &subject).await.unwrap(), Some(record));
    }
}

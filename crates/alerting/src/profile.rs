//! Threshold profiles and the preference resolver

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storage::{PreferenceRecord, PreferenceStore};
use telemetry::SubjectId;
use tracing::{debug, warn};

/// Effective thresholds for one subject.
///
/// Also used as the system-wide defaults section of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdProfile {
    /// Heart rate above this raises `HeartRateHigh` (bpm)
    pub max_heart_rate: f64,
    /// Heart rate below this raises `HeartRateLow` (bpm)
    pub min_heart_rate: f64,
    pub max_stress_level: f64,
    /// Allowed separation from companions (metres)
    pub max_distance_apart: f64,
    /// Delay between the warning and the escalation re-check (seconds)
    pub grace_period_secs: u64,
}

impl Default for ThresholdProfile {
    fn default() -> Self {
        Self {
            max_heart_rate: 150.0,
            min_heart_rate: 40.0,
            max_stress_level: 80.0,
            max_distance_apart: 250.0,
            grace_period_secs: 600, // 10 minutes
        }
    }
}

impl ThresholdProfile {
    /// Overlay a stored record on these defaults, field by field
    pub fn merged_with(&self, record: &PreferenceRecord) -> Self {
        Self {
            max_heart_rate: record.max_heart_rate.unwrap_or(self.max_heart_rate),
            min_heart_rate: record.min_heart_rate.unwrap_or(self.min_heart_rate),
            max_stress_level: record.max_stress_level.unwrap_or(self.max_stress_level),
            max_distance_apart: record.max_distance_apart.unwrap_or(self.max_distance_apart),
            grace_period_secs: record.grace_period_secs.unwrap_or(self.grace_period_secs),
        }
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

/// Loads per-subject thresholds, degrading to defaults.
///
/// Never fails: a store error or a missing record yields the defaults.
pub struct PreferenceResolver {
    store: Arc<dyn PreferenceStore>,
    defaults: ThresholdProfile,
}

impl PreferenceResolver {
    pub fn new(store: Arc<dyn PreferenceStore>, defaults: ThresholdProfile) -> Self {
        Self { store, defaults }
    }

    pub fn defaults(&self) -> &ThresholdProfile {
        &self.defaults
    }

    /// Resolve the effective profile for a subject
    pub async fn resolve(&self, subject: &SubjectId) -> ThresholdProfile {
        match self.store.get(subject).await {
            Ok(Some(record)) => {
                debug!("Loaded preferences for {}: {:?}", subject, record);
                self.defaults.merged_with(&record)
            }
            Ok(None) => {
                debug!("No stored preferences for {}, using defaults", subject);
                self.defaults.clone()
            }
            Err(e) => {
                warn!("Preference lookup for {} failed, using defaults: {}", subject, e);
                metrics::counter!("safety_preference_fallbacks_total").increment(1);
                self.defaults.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use storage::{Repository, StorageError};

    struct UnavailableStore;

    #[async_trait]
    impl PreferenceStore for UnavailableStore {
        async fn get(&self, _subject: &SubjectId) -> Result<Option<PreferenceRecord>, StorageError> {
            Err(StorageError::DatabaseError("connection refused".to_string()))
        }

        async fn put(&self, _subject: &SubjectId, _record: &PreferenceRecord) -> Result<(), StorageError> {
            Err(StorageError::DatabaseError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_missing_record_uses_defaults() {
        let resolver = PreferenceResolver::new(Arc::new(Repository::new()), ThresholdProfile::default());
        let profile = resolver.resolve(&SubjectId::new("alice")).await;
        assert_eq!(profile, ThresholdProfile::default());
    }

    #[tokio::test]
    async fn test_store_failure_uses_defaults() {
        let defaults = ThresholdProfile {
            max_distance_apart: 100.0,
            ..Default::default()
        };
        let resolver = PreferenceResolver::new(Arc::new(UnavailableStore), defaults.clone());
        assert_eq!(resolver.resolve(&SubjectId::new("alice")).await, defaults);
    }

    #[tokio::test]
    async fn test_partial_record_falls_back_per_field() {
        let repo = Arc::new(Repository::new());
        let subject = SubjectId::new("alice");
        repo.put(
            &subject,
            &PreferenceRecord {
                max_heart_rate: Some(170.0),
                grace_period_secs: Some(30),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let resolver = PreferenceResolver::new(repo, ThresholdProfile::default());
        let profile = resolver.resolve(&subject).await;

        assert_eq!(profile.max_heart_rate, 170.0);
        assert_eq!(profile.grace_period(), Duration::from_secs(30));
        assert_eq!(profile.min_heart_rate, 40.0);
        assert_eq!(profile.max_distance_apart, 250.0);
        assert_eq!(profile.max_stress_level, 80.0);
    }

    #[test]
    fn test_defaults_deserialize_partially() {
        let profile: ThresholdProfile =
            serde_json::from_str(r#"{"grace_period_secs": 5}"#).unwrap();
        assert_eq!(profile.grace_period_secs, 5);
        assert_eq!(profile.max_heart_rate, 150.0);
    }
}

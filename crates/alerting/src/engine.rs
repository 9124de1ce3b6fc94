//! Ingest engine
//!
//! Entry point for inbound samples: validate, persist, resolve thresholds,
//! evaluate, then hand the result to the coordinator.

use crate::coordinator::{EscalationCoordinator, Transition};
use crate::profile::PreferenceResolver;
use crate::rules::{evaluate, ConditionSet};
use serde::Serialize;
use std::sync::Arc;
use storage::{StorageError, TelemetryStore};
use telemetry::{TelemetrySample, ValidationError, Validator};
use thiserror::Error;
use tracing::{debug, error};

/// What the engine did with one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub conditions: ConditionSet,
    pub transition: Transition,
}

/// Ingest errors
#[derive(Debug, Error)]
pub enum IngestError {
    /// Rejected before evaluation; nothing changed
    #[error("Invalid sample: {0}")]
    Validation(#[from] ValidationError),

    /// The sample was evaluated and coordinated but could not be stored
    #[error("Sample processed but not persisted: {source}")]
    Persist {
        report: IngestReport,
        #[source]
        source: StorageError,
    },
}

/// Ties validation, persistence, and escalation together
pub struct AlertEngine {
    validator: Validator,
    telemetry: Arc<dyn TelemetryStore>,
    resolver: Arc<PreferenceResolver>,
    coordinator: Arc<EscalationCoordinator>,
}

impl AlertEngine {
    pub fn new(
        validator: Validator,
        telemetry: Arc<dyn TelemetryStore>,
        resolver: Arc<PreferenceResolver>,
        coordinator: Arc<EscalationCoordinator>,
    ) -> Self {
        Self {
            validator,
            telemetry,
            resolver,
            coordinator,
        }
    }

    pub fn coordinator(&self) -> &Arc<EscalationCoordinator> {
        &self.coordinator
    }

    pub fn resolver(&self) -> &Arc<PreferenceResolver> {
        &self.resolver
    }

    /// Process one inbound sample.
    ///
    /// A store write failure does not stop evaluation; it is reported
    /// through [`IngestError::Persist`] once the transition has been applied.
    pub async fn ingest(&self, sample: TelemetrySample) -> Result<IngestReport, IngestError> {
        self.validator.validate(&sample)?;
        metrics::counter!("safety_samples_ingested_total").increment(1);

        let persisted = self.telemetry.put_latest(&sample).await;
        if let Err(e) = &persisted {
            error!("Failed to persist sample for {}: {}", sample.subject, e);
        }

        let profile = self.resolver.resolve(&sample.subject).await;
        let conditions = evaluate(&sample, &profile);
        debug!("Sample for {} evaluated to {}", sample.subject, conditions);

        let transition = self
            .coordinator
            .handle_sample(&sample, &profile, &conditions)
            .await;
        let report = IngestReport {
            conditions,
            transition,
        };

        match persisted {
            Ok(()) => Ok(report),
            Err(source) => Err(IngestError::Persist { report, source }),
        }
    }
}

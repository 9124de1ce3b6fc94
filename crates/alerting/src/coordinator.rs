//! Escalation Coordinator
//!
//! Per-subject state machine driving the two-phase notification workflow:
//!
//! ```text
//! Idle --conditions--> Warned --timer, still present--> Escalated --> Idle
//!   |                    |----cleared (sample or timer)--> Suppressed --> Idle
//!   '--SOS--> Escalated  '----SOS--> Escalated
//! ```
//!
//! At most one non-terminal case exists per subject. Every mutation of a
//! subject's case happens under that subject's async mutex, so samples for
//! one subject are serialized while different subjects run in parallel.

use crate::message;
use crate::notifier::{Destination, Notification, Notifier, NotifyError, Severity};
use crate::profile::{PreferenceResolver, ThresholdProfile};
use crate::rules::{evaluate, ConditionSet};
use crate::timer::{Timer, TimerFired, TimerHandle};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use storage::TelemetryStore;
use telemetry::{SubjectId, TelemetrySample};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Closed cases kept for the history endpoint; 0 disables history
    pub history_capacity: usize,
    /// Upper bound on one notifier send (seconds)
    pub notify_timeout_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            history_capacity: 1000,
            notify_timeout_secs: 10,
        }
    }
}

impl EscalationConfig {
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs.max(1))
    }
}

/// Lifecycle phase of an escalation case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Warned,
    Suppressed,
    Escalated,
}

/// Why a case reached a terminal phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cause {
    /// SOS bypassed the grace period
    Sos,
    /// Conditions still held when the grace period ran out
    GraceExpired,
    /// Conditions were no longer present
    Cleared,
}

/// Result of feeding a sample or a timer fire to the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// No conditions and no open case
    Idle,
    /// Out-of-order sample or stale timer fire
    Ignored,
    Warned { case_id: Uuid },
    /// Conditions persist on an open case; its deadline is unchanged
    Reinforced { case_id: Uuid },
    Suppressed { case_id: Uuid },
    Escalated { case_id: Uuid, cause: Cause },
}

impl Transition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Ignored => "ignored",
            Self::Warned { .. } => "warned",
            Self::Reinforced { .. } => "reinforced",
            Self::Suppressed { .. } => "suppressed",
            Self::Escalated { .. } => "escalated",
        }
    }
}

/// The open case for a subject
#[derive(Debug)]
pub struct EscalationCase {
    pub id: Uuid,
    pub subject: SubjectId,
    pub conditions: ConditionSet,
    pub phase: Phase,
    pub warned_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    /// Most recent sample applied to this case
    last_sample: TelemetrySample,
    timer: TimerHandle,
}

/// Read-only view of an open case
#[derive(Debug, Clone, Serialize)]
pub struct CaseSnapshot {
    pub case_id: Uuid,
    pub subject: SubjectId,
    pub conditions: ConditionSet,
    pub phase: Phase,
    pub warned_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

impl From<&EscalationCase> for CaseSnapshot {
    fn from(case: &EscalationCase) -> Self {
        Self {
            case_id: case.id,
            subject: case.subject.clone(),
            conditions: case.conditions.clone(),
            phase: case.phase,
            warned_at: case.warned_at,
            deadline: case.deadline,
        }
    }
}

/// A case that reached a terminal phase
#[derive(Debug, Clone, Serialize)]
pub struct EscalationRecord {
    pub case_id: Uuid,
    pub subject: SubjectId,
    pub phase: Phase,
    pub cause: Cause,
    pub conditions: ConditionSet,
    /// None when SOS skipped the warning phase
    pub warned_at: Option<DateTime<Utc>>,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SubjectSlot {
    case: Option<EscalationCase>,
    /// Newest sample timestamp processed for the subject
    last_seen: Option<DateTime<Utc>>,
}

/// Owns escalation cases and drives their transitions
pub struct EscalationCoordinator {
    resolver: Arc<PreferenceResolver>,
    telemetry: Arc<dyn TelemetryStore>,
    notifier: Arc<dyn Notifier>,
    timer: Arc<dyn Timer>,
    /// Entries are never removed so a subject always maps to one mutex
    slots: Mutex<HashMap<SubjectId, Arc<AsyncMutex<SubjectSlot>>>>,
    history: Mutex<VecDeque<EscalationRecord>>,
    config: EscalationConfig,
}

impl EscalationCoordinator {
    pub fn new(
        resolver: Arc<PreferenceResolver>,
        telemetry: Arc<dyn TelemetryStore>,
        notifier: Arc<dyn Notifier>,
        timer: Arc<dyn Timer>,
        config: EscalationConfig,
    ) -> Self {
        info!("Creating escalation coordinator with config: {:?}", config);
        Self {
            resolver,
            telemetry,
            notifier,
            timer,
            slots: Mutex::new(HashMap::new()),
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity.min(1024))),
            config,
        }
    }

    fn slot(&self, subject: &SubjectId) -> Arc<AsyncMutex<SubjectSlot>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(subject.clone()).or_default())
    }

    fn existing_slot(&self, subject: &SubjectId) -> Option<Arc<AsyncMutex<SubjectSlot>>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(subject).cloned()
    }

    /// Apply an evaluated sample to the subject's case
    pub async fn handle_sample(
        &self,
        sample: &TelemetrySample,
        profile: &ThresholdProfile,
        conditions: &ConditionSet,
    ) -> Transition {
        let cell = self.slot(&sample.subject);
        let mut slot = cell.lock().await;

        let stale = slot.last_seen.is_some_and(|seen| sample.timestamp < seen);
        // SOS escalates no matter how late it arrives
        if stale && !conditions.is_sos() {
            debug!(
                "Ignoring out-of-order sample for {} at {}",
                sample.subject, sample.timestamp
            );
            return observe(Transition::Ignored);
        }
        if !stale {
            slot.last_seen = Some(sample.timestamp);
        }

        let transition = match slot.case.take() {
            None if conditions.is_empty() => Transition::Idle,
            None if conditions.is_sos() => {
                self.escalate_sos(Uuid::new_v4(), sample, conditions, None).await
            }
            None => {
                let case = self.open_case(sample, profile, conditions).await;
                let case_id = case.id;
                slot.case = Some(case);
                Transition::Warned { case_id }
            }
            Some(case) if conditions.is_empty() => {
                let case_id = case.id;
                info!("Conditions cleared for {}, suppressing case {}", case.subject, case_id);
                case.timer.cancel();
                self.close(
                    case_id,
                    &sample.subject,
                    Phase::Suppressed,
                    Cause::Cleared,
                    conditions,
                    Some(case.warned_at),
                );
                Transition::Suppressed { case_id }
            }
            Some(case) if conditions.is_sos() => {
                info!("SOS while case {} is warned for {}, escalating now", case.id, case.subject);
                case.timer.cancel();
                self.escalate_sos(case.id, sample, conditions, Some(case.warned_at))
                    .await
            }
            Some(mut case) => {
                debug!(
                    "Case {} for {} reinforced by {}; deadline stays {}",
                    case.id, case.subject, conditions, case.deadline
                );
                case.conditions = conditions.clone();
                case.last_sample = sample.clone();
                let case_id = case.id;
                slot.case = Some(case);
                Transition::Reinforced { case_id }
            }
        };

        observe(transition)
    }

    /// Handle a grace-period expiry.
    ///
    /// Re-reads the latest stored sample and re-evaluates it; fires for a
    /// case that is no longer open are ignored.
    pub async fn on_timer(&self, fire: TimerFired) -> Transition {
        let Some(cell) = self.existing_slot(&fire.subject) else {
            debug!("Timer fired for unknown subject {}", fire.subject);
            return observe(Transition::Ignored);
        };
        let mut slot = cell.lock().await;

        let case = match slot.case.take() {
            Some(case) if case.id == fire.case_id => case,
            other => {
                slot.case = other;
                debug!("Ignoring stale timer for {} (case {})", fire.subject, fire.case_id);
                return observe(Transition::Ignored);
            }
        };

        let sample = self.latest_sample(&case).await;
        let profile = self.resolver.resolve(&case.subject).await;
        let conditions = evaluate(&sample, &profile);

        let transition = if conditions.is_empty() {
            info!("Grace period for {} ended with conditions cleared", case.subject);
            self.close(
                case.id,
                &case.subject,
                Phase::Suppressed,
                Cause::Cleared,
                &conditions,
                Some(case.warned_at),
            );
            Transition::Suppressed { case_id: case.id }
        } else {
            let (title, body) = if conditions.is_sos() {
                message::sos(&sample)
            } else {
                message::escalation(&conditions, &sample, &profile)
            };
            let severity = if conditions.is_sos() {
                Severity::Critical
            } else {
                Severity::Alert
            };
            warn!(
                "Grace period for {} expired with {}, alerting group",
                case.subject, conditions
            );
            self.notify(Notification {
                case_id: case.id,
                subject: case.subject.clone(),
                destination: Destination::Group,
                severity,
                title,
                body,
            })
            .await;
            self.close(
                case.id,
                &case.subject,
                Phase::Escalated,
                Cause::GraceExpired,
                &conditions,
                Some(case.warned_at),
            );
            Transition::Escalated {
                case_id: case.id,
                cause: Cause::GraceExpired,
            }
        };

        observe(transition)
    }

    /// Consume timer fires until the channel closes.
    ///
    /// Each fire is handled on its own task so one slow notification does
    /// not hold up other subjects.
    pub async fn run(self: Arc<Self>, mut fires: mpsc::UnboundedReceiver<TimerFired>) {
        info!("Escalation coordinator started");
        while let Some(fire) = fires.recv().await {
            let coordinator = Arc::clone(&self);
            tokio::spawn(async move {
                coordinator.on_timer(fire).await;
            });
        }
        info!("Escalation coordinator stopped");
    }

    /// Snapshot of every open case
    pub async fn active_cases(&self) -> Vec<CaseSnapshot> {
        let cells: Vec<_> = {
            let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.values().cloned().collect()
        };

        let mut cases = Vec::new();
        for cell in cells {
            if let Some(case) = cell.lock().await.case.as_ref() {
                cases.push(CaseSnapshot::from(case));
            }
        }
        cases.sort_by(|a, b| a.warned_at.cmp(&b.warned_at));
        cases
    }

    /// Open case for one subject, if any
    pub async fn case_for(&self, subject: &SubjectId) -> Option<CaseSnapshot> {
        let cell = self.existing_slot(subject)?;
        let slot = cell.lock().await;
        slot.case.as_ref().map(CaseSnapshot::from)
    }

    /// Most recently closed cases, newest first
    pub fn history(&self, limit: usize) -> Vec<EscalationRecord> {
        let history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.iter().rev().take(limit).cloned().collect()
    }

    async fn open_case(
        &self,
        sample: &TelemetrySample,
        profile: &ThresholdProfile,
        conditions: &ConditionSet,
    ) -> EscalationCase {
        let case_id = Uuid::new_v4();
        let grace = profile.grace_period();
        let warned_at = Utc::now();
        let deadline = chrono::Duration::from_std(grace)
            .ok()
            .and_then(|d| warned_at.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        info!(
            "Opening case {} for {} with {}; escalating at {}",
            case_id, sample.subject, conditions, deadline
        );

        let (title, body) = message::warning(conditions, sample, profile);
        self.notify(Notification {
            case_id,
            subject: sample.subject.clone(),
            destination: Destination::Subject,
            severity: Severity::Warning,
            title,
            body,
        })
        .await;

        let timer = self.timer.schedule(
            grace,
            TimerFired {
                subject: sample.subject.clone(),
                case_id,
            },
        );

        EscalationCase {
            id: case_id,
            subject: sample.subject.clone(),
            conditions: conditions.clone(),
            phase: Phase::Warned,
            warned_at,
            deadline,
            last_sample: sample.clone(),
            timer,
        }
    }

    async fn escalate_sos(
        &self,
        case_id: Uuid,
        sample: &TelemetrySample,
        conditions: &ConditionSet,
        warned_at: Option<DateTime<Utc>>,
    ) -> Transition {
        warn!("SOS from {}, alerting group immediately", sample.subject);
        let (title, body) = message::sos(sample);
        self.notify(Notification {
            case_id,
            subject: sample.subject.clone(),
            destination: Destination::Group,
            severity: Severity::Critical,
            title,
            body,
        })
        .await;
        self.close(
            case_id,
            &sample.subject,
            Phase::Escalated,
            Cause::Sos,
            conditions,
            warned_at,
        );
        Transition::Escalated {
            case_id,
            cause: Cause::Sos,
        }
    }

    /// Prefer the stored latest sample; fall back to the case's own copy
    async fn latest_sample(&self, case: &EscalationCase) -> TelemetrySample {
        match self.telemetry.get_latest(&case.subject).await {
            Ok(Some(latest)) if latest.timestamp >= case.last_sample.timestamp => latest,
            Ok(_) => case.last_sample.clone(),
            Err(e) => {
                warn!(
                    "Could not read latest sample for {}, re-checking the case's last sample: {}",
                    case.subject, e
                );
                case.last_sample.clone()
            }
        }
    }

    /// Send under a deadline; the caller holds the subject's lock
    async fn notify(&self, notification: Notification) {
        let destination = notification.destination.as_str();
        let limit = self.config.notify_timeout();
        let sent = tokio::time::timeout(limit, self.notifier.send(&notification))
            .await
            .unwrap_or(Err(NotifyError::TimedOut(limit)));
        match sent {
            Ok(()) => {
                debug!(
                    "Sent {} notification for {} to {}",
                    notification.severity, notification.subject, destination
                );
                metrics::counter!(
                    "safety_notifications_total",
                    "destination" => destination,
                    "outcome" => "sent"
                )
                .increment(1);
            }
            Err(e) => {
                error!(
                    "Failed to send {} notification for {} to {}: {}",
                    notification.severity, notification.subject, destination, e
                );
                metrics::counter!(
                    "safety_notifications_total",
                    "destination" => destination,
                    "outcome" => "failed"
                )
                .increment(1);
            }
        }
    }

    fn close(
        &self,
        case_id: Uuid,
        subject: &SubjectId,
        phase: Phase,
        cause: Cause,
        conditions: &ConditionSet,
        warned_at: Option<DateTime<Utc>>,
    ) {
        let capacity = self.config.history_capacity;
        if capacity == 0 {
            return;
        }

        let record = EscalationRecord {
            case_id,
            subject: subject.clone(),
            phase,
            cause,
            conditions: conditions.clone(),
            warned_at,
            closed_at: Utc::now(),
        };

        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        // Enforce retention
        while history.len() >= capacity {
            history.pop_front();
        }
        history.push_back(record);
    }
}

fn observe(transition: Transition) -> Transition {
    metrics::counter!(
        "safety_escalation_transitions_total",
        "transition" => transition.label()
    )
    .increment(1);
    transition
}

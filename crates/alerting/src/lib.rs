//! Alerting and Escalation Engine
//!
//! Resolves per-subject thresholds, evaluates alert rules, and runs the
//! two-phase warning/escalation workflow.

mod coordinator;
mod engine;
mod message;
mod notifier;
mod profile;
pub mod rules;
pub mod timer;

pub use coordinator::{
    CaseSnapshot, Cause, EscalationConfig, EscalationCoordinator, EscalationRecord, Phase,
    Transition,
};
pub use engine::{AlertEngine, IngestError, IngestReport};
pub use notifier::{Destination, Notification, Notifier, NotifyError, Severity};
pub use profile::{PreferenceResolver, ThresholdProfile};
pub use rules::{AlertCondition, ConditionSet};
pub use timer::{Timer, TimerFired, TimerHandle, TokioTimer};

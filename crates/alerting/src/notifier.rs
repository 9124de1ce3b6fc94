//! Notification contract consumed by the escalation coordinator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use telemetry::SubjectId;
use thiserror::Error;
use uuid::Uuid;

/// Notifier error types
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Transport failed: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Notifier not connected")]
    NotConnected,

    #[error("Send timed out after {0:?}")]
    TimedOut(Duration),
}

/// Who receives a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// The monitored subject only
    Subject,
    /// Every other member of the subject's group
    Group,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::Group => "group",
        }
    }
}

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// First-phase heads-up to the subject
    Warning,
    /// Escalation after the grace period
    Alert,
    /// SOS
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Warning => "warning",
            Self::Alert => "alert",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A formatted message bound for one destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub case_id: Uuid,
    pub subject: SubjectId,
    pub destination: Destination,
    pub severity: Severity,
    pub title: String,
    pub body: String,
}

/// Outbound notification transport.
///
/// Delivery is best effort. The coordinator logs a failed send and keeps
/// advancing the case.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

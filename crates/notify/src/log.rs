//! Log-only notification sink

use alerting::{Notification, Notifier, NotifyError, Severity};
use async_trait::async_trait;
use tracing::{info, warn};

/// Writes notifications to the tracing output instead of a transport
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, n: &Notification) -> Result<(), NotifyError> {
        match n.severity {
            Severity::Warning => info!(
                case_id = %n.case_id,
                subject = %n.subject,
                destination = n.destination.as_str(),
                severity = %n.severity,
                "{}: {}", n.title, n.body
            ),
            Severity::Alert | Severity::Critical => warn!(
                case_id = %n.case_id,
                subject = %n.subject,
                destination = n.destination.as_str(),
                severity = %n.severity,
                "{}: {}", n.title, n.body
            ),
        }
        Ok(())
    }
}

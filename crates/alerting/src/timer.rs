//! Deferred re-check scheduling

use std::time::Duration;
use telemetry::SubjectId;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::debug;
use uuid::Uuid;

/// Delivered when a grace period elapses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub subject: SubjectId,
    /// Case the timer was armed for; a fire for any other case is stale
    pub case_id: Uuid,
}

/// Cancellation handle for a scheduled fire
#[derive(Debug, Default)]
pub struct TimerHandle {
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    pub fn new(abort: AbortHandle) -> Self {
        Self { abort: Some(abort) }
    }

    /// Handle with nothing to cancel
    pub fn detached() -> Self {
        Self::default()
    }

    /// Cancel the pending fire. A fire already delivered is unaffected.
    pub fn cancel(self) {
        if let Some(abort) = self.abort {
            abort.abort();
        }
    }
}

/// Schedules a [`TimerFired`] after a delay
pub trait Timer: Send + Sync {
    fn schedule(&self, delay: Duration, fire: TimerFired) -> TimerHandle;
}

/// Timer backed by tokio tasks, delivering fires on an mpsc channel
#[derive(Clone)]
pub struct TokioTimer {
    tx: mpsc::UnboundedSender<TimerFired>,
}

impl TokioTimer {
    /// Create a timer and the receiver its fires arrive on
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Timer for TokioTimer {
    fn schedule(&self, delay: Duration, fire: TimerFired) -> TimerHandle {
        debug!("Scheduling re-check for {} in {:?}", fire.subject, delay);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(fire).is_err() {
                debug!("Timer receiver dropped before fire");
            }
        });
        TimerHandle::new(task.abort_handle())
    }
}

//! Notification Transports
//!
//! Implementations of [`alerting::Notifier`]:
//! - structured log sink for development and dry runs
//! - MQTT publisher giving per-subject direct and group topics

mod log;
mod mqtt;

pub use log::LogNotifier;
pub use mqtt::{MqttConfig, MqttNotifier, NotificationEnvelope};

use alerting::{Notifier, NotifyError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Which transport to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    #[default]
    Log,
    Mqtt,
}

/// Notifier configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    pub mqtt: MqttConfig,
}

/// Build (and connect, where needed) the configured notifier
pub async fn build(config: &NotifierConfig) -> Result<Arc<dyn Notifier>, NotifyError> {
    info!("Using {:?} notifier", config.kind);
    match config.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier::new())),
        NotifierKind::Mqtt => {
            let mut notifier = MqttNotifier::new(config.mqtt.clone());
            notifier.connect().await?;
            Ok(Arc::new(notifier))
        }
    }
}

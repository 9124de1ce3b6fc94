//! MQTT notification transport
//!
//! Publishes each notification as a JSON envelope. Group members subscribe
//! to `{prefix}/{subject}/group`; the subject's own devices subscribe to
//! `{prefix}/{subject}/direct`.

use alerting::{Destination, Notification, Notifier, NotifyError, Severity};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use telemetry::SubjectId;
use tracing::{debug, error, info};
use uuid::Uuid;

/// MQTT transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// MQTT broker host
    pub broker_host: String,
    /// MQTT port
    pub broker_port: u16,
    pub client_id: String,
    /// Root of every published topic
    pub topic_prefix: String,
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "safety-monitor".to_string(),
            topic_prefix: "friends".to_string(),
            keep_alive_secs: 30,
        }
    }
}

/// Message published to the broker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub id: Uuid,
    pub case_id: Uuid,
    pub subject: SubjectId,
    pub destination: Destination,
    pub severity: Severity,
    pub title: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl From<&Notification> for NotificationEnvelope {
    fn from(n: &Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            case_id: n.case_id,
            subject: n.subject.clone(),
            destination: n.destination,
            severity: n.severity,
            title: n.title.clone(),
            body: n.body.clone(),
            sent_at: Utc::now(),
        }
    }
}

/// Notifier publishing to an MQTT broker
pub struct MqttNotifier {
    config: MqttConfig,
    client: Option<AsyncClient>,
}

impl MqttNotifier {
    /// Create an unconnected notifier
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Connect to the MQTT broker
    pub async fn connect(&mut self) -> Result<(), NotifyError> {
        let mut options = MqttOptions::new(
            self.config.client_id.clone(),
            &self.config.broker_host,
            self.config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(self.config.keep_alive_secs.max(5)));

        let (client, mut eventloop) = AsyncClient::new(options, 64);

        // Spawn event loop handler
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(incoming)) => {
                        debug!("MQTT incoming: {:?}", incoming);
                    }
                    Err(e) => {
                        error!("MQTT error: {}", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    _ => {}
                }
            }
        });

        self.client = Some(client);
        info!(
            "Connected to MQTT broker {}:{}",
            self.config.broker_host, self.config.broker_port
        );
        Ok(())
    }

    /// Topic a notification is published on
    pub fn topic(&self, notification: &Notification) -> String {
        let leaf = match notification.destination {
            Destination::Subject => "direct",
            Destination::Group => "group",
        };
        format!(
            "{}/{}/{}",
            self.config.topic_prefix, notification.subject, leaf
        )
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let client = self.client.as_ref().ok_or(NotifyError::NotConnected)?;

        let payload = serde_json::to_vec(&NotificationEnvelope::from(notification))
            .map_err(|e| NotifyError::Serialization(e.to_string()))?;
        let topic = self.topic(notification);

        // Fails fast when the request queue is full instead of waiting on a
        // broker that may never come back
        client
            .try_publish(&topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        debug!("Published {} notification to {}", notification.severity, topic);
        Ok(())
    }
}

//! Mock implementations for testing
//!
//! Provides a recording [`Transport`] and [`CloudRelay`] so the hub can be
//! exercised without a broker or an upload endpoint.

use crate::cloud::{CloudRelay, RelayError, TelemetryBatch};
use crate::config::Credentials;
use crate::protocol::QosLevel;
use crate::transport::mqtt::MqttError;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QosLevel,
    pub retain: bool,
}

impl PublishedMessage {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

/// Mock transport for testing
///
/// Clones share their recorders. When built with [`MockTransport::with_events`]
/// every successful connect immediately reports a `ConnectResult` with the
/// configured code, standing in for the broker's CONNACK.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    subscriptions: Arc<Mutex<Vec<(String, QosLevel)>>>,
    credentials: Arc<Mutex<Vec<Credentials>>>,
    connects: Arc<Mutex<usize>>,
    disconnects: Arc<Mutex<usize>>,
    connect_failure: Arc<Mutex<bool>>,
    publish_failure: Arc<Mutex<bool>>,
    subscribe_failure: Arc<Mutex<bool>>,
    connect_code: Arc<Mutex<u8>>,
    events: Option<mpsc::Sender<TransportEvent>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: mpsc::Sender<TransportEvent>) -> Self {
        Self {
            events: Some(events),
            ..Default::default()
        }
    }

    pub async fn set_connect_failure(&self, fail: bool) {
        *self.connect_failure.lock().await = fail;
    }

    pub async fn set_publish_failure(&self, fail: bool) {
        *self.publish_failure.lock().await = fail;
    }

    pub async fn set_subscribe_failure(&self, fail: bool) {
        *self.subscribe_failure.lock().await = fail;
    }

    /// Return code reported for the next connects (0 accepts)
    pub async fn set_connect_code(&self, code: u8) {
        *self.connect_code.lock().await = code;
    }

    pub async fn get_published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn published_on(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    pub async fn get_subscriptions(&self) -> Vec<(String, QosLevel)> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn get_credentials(&self) -> Vec<Credentials> {
        self.credentials.lock().await.clone()
    }

    pub async fn connect_count(&self) -> usize {
        *self.connects.lock().await
    }

    pub async fn disconnect_count(&self) -> usize {
        *self.disconnects.lock().await
    }

    pub async fn clear_history(&self) {
        self.published.lock().await.clear();
        self.subscriptions.lock().await.clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MqttError;

    async fn connect(&mut self, credentials: &Credentials) -> Result<(), Self::Error> {
        if *self.connect_failure.lock().await {
            return Err(MqttError::ConnectionFailed("Mock connection failure".into()));
        }

        *self.connects.lock().await += 1;
        self.credentials.lock().await.push(credentials.clone());

        if let Some(events) = &self.events {
            let code = *self.connect_code.lock().await;
            let reason = if code == 0 { "accepted" } else { "refused" };
            let _ = events.try_send(TransportEvent::ConnectResult {
                code,
                reason: reason.to_string(),
            });
        }

        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        *self.disconnects.lock().await += 1;
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error> {
        if *self.publish_failure.lock().await {
            return Err(MqttError::PublishFailed("Mock publish failure".into()));
        }

        self.published.lock().await.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
        });
        Ok(())
    }

    async fn subscribe(&self, topics: &[String], qos: QosLevel) -> Result<(), Self::Error> {
        if *self.subscribe_failure.lock().await {
            return Err(MqttError::SubscriptionFailed("Mock subscribe failure".into()));
        }

        let mut subscriptions = self.subscriptions.lock().await;
        subscriptions.extend(topics.iter().map(|topic| (topic.clone(), qos)));
        Ok(())
    }
}

/// Mock cloud relay recording every uploaded batch
#[derive(Debug, Clone, Default)]
pub struct MockCloudRelay {
    uploads: Arc<Mutex<Vec<TelemetryBatch>>>,
    should_fail: bool,
}

impl MockCloudRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub async fn get_uploads(&self) -> Vec<TelemetryBatch> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl CloudRelay for MockCloudRelay {
    fn name(&self) -> &str {
        "mock"
    }

    async fn upload(&self, batch: &TelemetryBatch) -> Result<(), RelayError> {
        if self.should_fail {
            return Err(RelayError::Rejected { status: 503 });
        }

        self.uploads.lock().await.push(batch.clone());
        Ok(())
    }
}

//! Impure I/O operations for the MQTT client
//!
//! This module owns the rumqttc client and its event loop task. Every connect
//! attempt builds a fresh client and event loop; the loop task runs until its
//! first error and never reconnects by itself, so reconnection policy stays
//! with the gateway session.

use super::connection::{configure_mqtt_options, parse_broker_url, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::{BrokerSection, Credentials};
use crate::protocol::QosLevel;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Capacity of the request channel between the client handle and its event loop
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Time allowed for the event loop to flush DISCONNECT before it is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// MQTT v5 transport client for the hub
pub struct MqttClient {
    client_id: String,
    presence_topic: String,
    config: BrokerSection,
    events: mpsc::Sender<TransportEvent>,
    client: Option<AsyncClient>,
    event_loop_handle: Option<JoinHandle<()>>,
    shutdown_tx: Option<watch::Sender<bool>>,
}

impl MqttClient {
    /// Create a client reporting connection events on `events`
    ///
    /// No network activity happens until [`Transport::connect`] is called.
    pub fn new(
        client_id: &str,
        presence_topic: &str,
        config: BrokerSection,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<Self, MqttError> {
        parse_broker_url(&config.url)?;

        Ok(MqttClient {
            client_id: client_id.to_string(),
            presence_topic: presence_topic.to_string(),
            config,
            events,
            client: None,
            event_loop_handle: None,
            shutdown_tx: None,
        })
    }

    /// Whether an event loop task is currently running
    pub fn is_running(&self) -> bool {
        self.event_loop_handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Abort any event loop left over from a previous attempt
    fn stop_event_loop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
        self.client = None;
    }

    /// Poll the event loop until its first error, forwarding transport events
    async fn run_event_loop(
        mut event_loop: EventLoop,
        events: mpsc::Sender<TransportEvent>,
        shutdown_rx: watch::Receiver<bool>,
        client_id: String,
    ) {
        info!(client_id = %client_id, "Starting MQTT event loop");
        let mut acknowledged = false;

        loop {
            match event_loop.poll().await {
                Ok(event) => {
                    let route = MessageHandler::route_mqtt_event(&event);
                    let terminal = matches!(route, EventRoute::Disconnected { .. })
                        || matches!(route, EventRoute::ConnectionAcknowledged { code } if code != 0);
                    acknowledged |= route.is_acknowledgement();

                    match &route {
                        EventRoute::SubscriptionConfirmed { packet_id } => {
                            debug!(target: "mqtt_transport", packet_id, "Subscription confirmed");
                        }
                        EventRoute::InfrastructureEvent(event_str) => {
                            debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                        }
                        _ => {}
                    }

                    if let Some(transport_event) = MessageHandler::transport_event(route) {
                        if events.send(transport_event).await.is_err() {
                            debug!("Transport event receiver dropped, stopping event loop");
                            break;
                        }
                    }

                    if terminal {
                        break;
                    }
                }
                Err(e) => {
                    if *shutdown_rx.borrow() {
                        debug!("MQTT event loop closed after disconnect request: {}", e);
                    } else {
                        error!(client_id = %client_id, "MQTT event loop error: {}", e);
                        let _ = events
                            .send(MessageHandler::error_event(&e, acknowledged))
                            .await;
                    }
                    break;
                }
            }
        }

        info!(client_id = %client_id, "MQTT event loop stopped");
    }
}

/// Implementation of Transport trait for MqttClient
#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self, credentials: &Credentials) -> Result<(), Self::Error> {
        self.stop_event_loop();

        let mqtt_options = configure_mqtt_options(
            &self.client_id,
            &self.presence_topic,
            &self.config,
            credentials,
        )?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let span = crate::mqtt_span!(operation = "event_loop", client_id = %self.client_id);
        let handle = tokio::spawn(
            Self::run_event_loop(
                event_loop,
                self.events.clone(),
                shutdown_rx,
                self.client_id.clone(),
            )
            .instrument(span),
        );

        self.client = Some(client);
        self.shutdown_tx = Some(shutdown_tx);
        self.event_loop_handle = Some(handle);

        info!(broker = %self.config.url, client_id = %self.client_id, "MQTT connect attempt started");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        if let Some(shutdown_tx) = &self.shutdown_tx {
            let _ = shutdown_tx.send(true);
        }

        if let Some(client) = self.client.take() {
            if let Err(e) = client.disconnect().await {
                debug!("DISCONNECT not queued, event loop already stopped: {}", e);
            }
        }

        if let Some(mut handle) = self.event_loop_handle.take() {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
                Ok(Ok(())) => {
                    info!("Event loop task shut down gracefully");
                }
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("Event loop task ended with error: {}", e);
                }
                Err(_) => {
                    warn!("Event loop task didn't shut down gracefully, forcing abort");
                    handle.abort();
                }
                _ => {}
            }
        }

        self.shutdown_tx = None;
        info!("MQTT client disconnected");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error> {
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;

        client
            .try_publish(topic, MessageHandler::to_rumqttc_qos(qos), retain, payload)
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))?;

        debug!(target: "mqtt_transport", topic, retain, "Publish queued");
        Ok(())
    }

    async fn subscribe(&self, topics: &[String], qos: QosLevel) -> Result<(), Self::Error> {
        let client = self.client.as_ref().ok_or(MqttError::NotConnected)?;

        for topic in topics {
            client
                .try_subscribe(topic.as_str(), MessageHandler::to_rumqttc_qos(qos))
                .map_err(|e| {
                    MqttError::SubscriptionFailed(
                        format!("Failed to subscribe to {topic}: {e}").into(),
                    )
                })?;
            debug!(target: "mqtt_transport", topic = %topic, "Subscription requested");
        }

        Ok(())
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // Async disconnect is impossible here; only background tasks are cleaned up
        self.stop_event_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_broker(url: &str) -> BrokerSection {
        BrokerSection {
            url: url.to_string(),
            client_id: None,
            username: None,
            username_env: None,
            password: None,
            password_env: None,
            keep_alive_secs: 60,
            connect_timeout_secs: 30,
        }
    }

    #[test]
    fn test_new_rejects_invalid_url() {
        let (tx, _rx) = mpsc::channel(8);
        let result = MqttClient::new("hub", "server/iot/lwt", test_broker("not a url"), tx);
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[tokio::test]
    async fn test_publish_fails_without_connection() {
        let (tx, _rx) = mpsc::channel(8);
        let client =
            MqttClient::new("hub", "server/iot/lwt", test_broker("mqtt://localhost:1883"), tx)
                .unwrap();

        assert!(!client.is_running());
        assert!(matches!(
            client
                .publish("server/iot/lwt", b"Online".to_vec(), QosLevel::AtLeastOnce, true)
                .await,
            Err(MqttError::NotConnected)
        ));
        assert!(matches!(
            client
                .subscribe(&["server/fan/lwt".to_string()], QosLevel::AtMostOnce)
                .await,
            Err(MqttError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_without_connection() {
        let (tx, _rx) = mpsc::channel(8);
        let mut client =
            MqttClient::new("hub", "server/iot/lwt", test_broker("mqtt://localhost:1883"), tx)
                .unwrap();

        assert!(
            client.disconnect().await.is_ok(),
            "Disconnect should not fail even if not connected"
        );
    }
}

//! Test helpers and utilities for integration tests

use iothub::cloud::CloudRelay;
use iothub::config::GatewayConfig;
use iothub::gateway::Gateway;
use iothub::protocol::InboundMessage;
use iothub::testing::mocks::MockTransport;
use iothub::transport::TransportEvent;
use iothub::GatewayResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Minimal configuration with default topics and timers
#[allow(dead_code)]
pub fn test_config() -> GatewayConfig {
    GatewayConfig::from_toml_str(
        r#"
[gateway]
id = "test-hub"

[broker]
url = "mqtt://localhost:1883"
client_id = "test-hub-client"
"#,
    )
    .expect("Test config should parse")
}

/// Configuration with a cloud relay section using the default field map
#[allow(dead_code)]
pub fn test_config_with_cloud() -> GatewayConfig {
    GatewayConfig::from_toml_str(
        r#"
[gateway]
id = "test-hub"

[broker]
url = "mqtt://localhost:1883"
client_id = "test-hub-client"

[cloud]
url = "http://localhost:9/update.json"
api_key = "WRITE_KEY"
"#,
    )
    .expect("Test config should parse")
}

/// A gateway running on a mock transport in a background task
#[allow(dead_code)]
pub struct Harness {
    pub transport: MockTransport,
    pub events: mpsc::Sender<TransportEvent>,
    pub shutdown: watch::Sender<bool>,
    pub handle: JoinHandle<(Gateway<MockTransport>, GatewayResult<()>)>,
}

#[allow(dead_code)]
impl Harness {
    /// Inject a message as if it had arrived from the broker
    pub async fn deliver(&self, topic: &str, payload: &str) {
        self.events
            .send(TransportEvent::Message(InboundMessage::new(topic, payload)))
            .await
            .expect("Gateway should be receiving events");
        settle().await;
    }

    /// Signal shutdown and wait for the gateway to stop
    pub async fn stop(self) -> (Gateway<MockTransport>, GatewayResult<()>) {
        let _ = self.shutdown.send(true);
        self.handle.await.expect("Gateway task should not panic")
    }
}

/// Spawn a gateway whose mock transport reports a CONNACK on every connect
#[allow(dead_code)]
pub fn spawn_gateway(
    config: &GatewayConfig,
    relay: Option<Arc<dyn CloudRelay>>,
    service_mode: bool,
) -> Harness {
    let (events_tx, events_rx) = mpsc::channel(32);
    let transport = MockTransport::with_events(events_tx.clone());
    spawn_with_transport(config, transport, events_tx, events_rx, relay, service_mode)
}

#[allow(dead_code)]
pub fn spawn_with_transport(
    config: &GatewayConfig,
    transport: MockTransport,
    events_tx: mpsc::Sender<TransportEvent>,
    events_rx: mpsc::Receiver<TransportEvent>,
    relay: Option<Arc<dyn CloudRelay>>,
    service_mode: bool,
) -> Harness {
    let mut gateway = Gateway::new(config, transport.clone(), events_rx, relay, service_mode)
        .expect("Gateway should build from a valid config");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let result = gateway.run(shutdown_rx).await;
        (gateway, result)
    });

    Harness {
        transport,
        events: events_tx,
        shutdown: shutdown_tx,
        handle,
    }
}

/// Let the gateway task drain its queues
#[allow(dead_code)]
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

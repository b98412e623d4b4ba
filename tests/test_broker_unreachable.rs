//! MQTT client behavior when the broker cannot be reached
//!
//! A failed attempt must be reported once as a non-zero `ConnectResult` and
//! must not be retried by the client itself.

use iothub::config::{BrokerSection, Credentials};
use iothub::transport::mqtt::MqttClient;
use iothub::transport::{Transport, TransportEvent};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

fn unreachable_broker() -> BrokerSection {
    BrokerSection {
        url: "mqtt://127.0.0.1:1".to_string(),
        client_id: None,
        username: None,
        username_env: None,
        password: None,
        password_env: None,
        keep_alive_secs: 60,
        connect_timeout_secs: 5,
    }
}

#[tokio::test]
async fn test_unreachable_broker_reports_failed_connect_result() {
    let (events_tx, mut events_rx) = mpsc::channel(8);
    let mut client = MqttClient::new("hub-test", "server/iot/lwt", unreachable_broker(), events_tx)
        .expect("Client creation should succeed even if broker is down");

    client
        .connect(&Credentials::default())
        .await
        .expect("Starting a connect attempt should not fail");

    let event = timeout(Duration::from_secs(10), events_rx.recv())
        .await
        .expect("Connect outcome should be reported")
        .expect("Event channel should stay open");

    match event {
        TransportEvent::ConnectResult { code, reason } => {
            assert_ne!(code, 0);
            assert!(!reason.is_empty());
        }
        other => panic!("Expected ConnectResult, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!client.is_running(), "Event loop must stop after its first error");
    assert!(events_rx.try_recv().is_err(), "Failed attempt must not be retried");

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_invalid_broker_url_is_rejected_at_construction() {
    let (events_tx, _events_rx) = mpsc::channel(8);
    let mut broker = unreachable_broker();
    broker.url = "not a url".to_string();

    assert!(MqttClient::new("hub-test", "server/iot/lwt", broker, events_tx).is_err());
}

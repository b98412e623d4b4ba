//! End-to-end tests of the gateway loop on a mock transport
//!
//! Time is paused, so periodic ticks fire as soon as the runtime is idle and
//! the tests run instantly.

mod test_helpers;

use iothub::gateway::SessionState;
use iothub::protocol::QosLevel;
use iothub::testing::mocks::{MockCloudRelay, MockTransport};
use iothub::transport::TransportEvent;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{settle, spawn_gateway, spawn_with_transport, test_config, test_config_with_cloud};
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn test_startup_announces_presence_and_requests_fan_status() {
    let harness = spawn_gateway(&test_config(), None, false);
    settle().await;

    let transport = harness.transport.clone();
    let subscriptions = transport.get_subscriptions().await;
    assert_eq!(subscriptions.len(), 9);
    assert!(subscriptions
        .iter()
        .all(|(_, qos)| *qos == QosLevel::AtMostOnce));
    assert!(subscriptions
        .iter()
        .any(|(topic, _)| topic == "server/iot/command/control"));

    let published = transport.get_published().await;
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].topic, "server/iot/lwt");
    assert_eq!(published[0].payload_str(), "Online");
    assert!(published[0].retain);
    assert_eq!(published[1].topic, "server/fan/command/control");
    assert_eq!(published[1].payload_str(), "STATUS");

    let (gateway, result) = harness.stop().await;
    assert!(result.is_ok());
    assert_eq!(gateway.session().state(), SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_publishes_offline_before_closing() {
    let harness = spawn_gateway(&test_config(), None, false);
    settle().await;

    let transport = harness.transport.clone();
    let (_, result) = harness.stop().await;
    assert!(result.is_ok());

    let presence = transport.published_on("server/iot/lwt").await;
    assert_eq!(presence.len(), 2);
    assert_eq!(presence[1].payload_str(), "Offline");
    assert!(presence[1].retain);
    assert_eq!(transport.disconnect_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_readings_update_store_and_sampling_publishes_them() {
    let harness = spawn_gateway(&test_config(), None, false);
    settle().await;
    harness.transport.clear_history().await;

    harness.deliver("server/system/temp/value", "41.0").await;
    harness.deliver("server/fan/status/tempmax", "82.0").await;
    harness.deliver("server/fan/lwt", "Online").await;
    harness.deliver("server/fan/status/control", "Running").await;

    tokio::time::sleep(Duration::from_secs(31)).await;

    let transport = harness.transport.clone();
    let temperature = transport.published_on("server/iot/data/temperature").await;
    assert_eq!(temperature.len(), 1);
    assert_eq!(temperature[0].payload_str(), "41.0");
    assert!(!temperature[0].retain);

    let percentage = transport.published_on("server/iot/data/percentage").await;
    assert_eq!(percentage[0].payload_str(), "50.0");

    let (gateway, _) = harness.stop().await;
    let snapshot = gateway.store().snapshot();
    assert_eq!(snapshot.temperature, Some(41.0));
    assert_eq!(snapshot.ceiling, Some(82.0));
    assert!(snapshot.fan.presence.is_some());
    assert!(snapshot.fan.activity.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_payloads_leave_store_untouched() {
    let harness = spawn_gateway(&test_config(), None, false);
    settle().await;

    harness.deliver("server/system/temp/value", "40.0").await;
    harness.deliver("server/system/temp/value", "hot").await;
    harness.deliver("server/system/temp/value", "999").await;
    harness.deliver("server/fan/lwt", "online").await;
    harness.deliver("unknown/topic", "1.0").await;

    let (gateway, result) = harness.stop().await;
    assert!(result.is_ok());
    assert_eq!(gateway.store().current_temperature(), Some(40.0));
    assert!(gateway.store().fan().presence.is_none());
    assert_eq!(gateway.dispatch().unmatched_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exit_command_stops_gateway() {
    let harness = spawn_gateway(&test_config(), None, false);
    settle().await;

    harness.deliver("server/iot/command/control", "EXIT").await;

    let transport = harness.transport.clone();
    let (gateway, result) = tokio::time::timeout(Duration::from_secs(5), harness.handle)
        .await
        .expect("Gateway should stop after EXIT")
        .unwrap();

    assert!(result.is_ok());
    assert!(!gateway.commands().is_running());
    let presence = transport.published_on("server/iot/lwt").await;
    assert_eq!(presence.last().unwrap().payload_str(), "Offline");
}

#[tokio::test(start_paused = true)]
async fn test_exit_command_ignored_in_service_mode() {
    let harness = spawn_gateway(&test_config(), None, true);
    settle().await;

    harness.deliver("server/iot/command/control", "EXIT").await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!harness.handle.is_finished());

    let (gateway, result) = harness.stop().await;
    assert!(result.is_ok());
    assert!(gateway.commands().service_mode());
}

#[tokio::test(start_paused = true)]
async fn test_refused_connect_is_retried_by_reconnect_task() {
    let (events_tx, events_rx) = mpsc::channel(32);
    let transport = MockTransport::with_events(events_tx.clone());
    transport.set_connect_code(5).await;

    let harness =
        spawn_with_transport(&test_config(), transport, events_tx, events_rx, None, false);
    settle().await;

    let transport = harness.transport.clone();
    assert_eq!(transport.connect_count().await, 1);
    assert!(transport.get_subscriptions().await.is_empty());
    assert!(transport.get_published().await.is_empty());

    transport.set_connect_code(0).await;
    tokio::time::sleep(Duration::from_secs(16)).await;

    assert_eq!(transport.connect_count().await, 2);
    assert_eq!(transport.get_subscriptions().await.len(), 9);
    let presence = transport.published_on("server/iot/lwt").await;
    assert_eq!(presence[0].payload_str(), "Online");

    let (_, result) = harness.stop().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_lost_connection_waits_for_reconnect_tick() {
    let harness = spawn_gateway(&test_config(), None, false);
    settle().await;

    harness
        .events
        .send(TransportEvent::Disconnected {
            code: 0x8D,
            reason: "keep alive timeout".to_string(),
        })
        .await
        .unwrap();
    settle().await;

    let transport = harness.transport.clone();
    assert_eq!(transport.connect_count().await, 1);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(transport.connect_count().await, 2);
    assert_eq!(transport.get_subscriptions().await.len(), 18);

    let (_, result) = harness.stop().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_cloud_relay_receives_batched_telemetry() {
    let relay = MockCloudRelay::new();
    let harness = spawn_gateway(&test_config_with_cloud(), Some(Arc::new(relay.clone())), false);
    settle().await;

    harness.deliver("server/system/temp/value", "40.0").await;
    harness.deliver("server/fan/status/tempmax", "80.0").await;

    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    let uploads = relay.get_uploads().await;
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].fields["field1"], 40.0);
    assert_eq!(uploads[0].fields["field2"], 50.0);
    assert!(!uploads[0].fields.contains_key("ceiling"));

    let (_, result) = harness.stop().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_cloud_upload_does_not_need_broker() {
    let (events_tx, events_rx) = mpsc::channel(32);
    let transport = MockTransport::with_events(events_tx.clone());
    transport.set_connect_code(5).await;
    let relay = MockCloudRelay::new();

    let harness = spawn_with_transport(
        &test_config_with_cloud(),
        transport,
        events_tx,
        events_rx,
        Some(Arc::new(relay.clone())),
        false,
    );
    settle().await;

    harness.deliver("server/system/temp/value", "35.0").await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    assert!(harness.transport.get_published().await.is_empty());
    assert_eq!(relay.get_uploads().await[0].fields["field1"], 35.0);

    let (_, result) = harness.stop().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_failing_transport_is_never_fatal() {
    let (events_tx, events_rx) = mpsc::channel(32);
    let transport = MockTransport::with_events(events_tx.clone());
    transport.set_subscribe_failure(true).await;
    transport.set_publish_failure(true).await;
    let relay = MockCloudRelay::new();

    let harness = spawn_with_transport(
        &test_config_with_cloud(),
        transport,
        events_tx,
        events_rx,
        Some(Arc::new(relay.clone())),
        false,
    );
    settle().await;

    harness.deliver("server/system/temp/value", "36.0").await;
    tokio::time::sleep(Duration::from_secs(61)).await;
    settle().await;

    assert!(!harness.handle.is_finished());
    assert_eq!(relay.get_uploads().await[0].fields["field1"], 36.0);

    let transport = harness.transport.clone();
    let (gateway, result) = harness.stop().await;
    assert!(result.is_ok());
    assert_eq!(gateway.session().state(), SessionState::Disconnected);
    assert!(transport.get_published().await.is_empty());
    assert_eq!(transport.disconnect_count().await, 1);
}

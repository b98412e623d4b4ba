//! HTTP cloud relay tests against a mock endpoint

use iothub::cloud::{CloudRelay, HttpCloudRelay, HttpRelayConfig, RelayError, TelemetryBatch};
use iothub::config::GatewayConfig;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn batch() -> TelemetryBatch {
    let mut batch = TelemetryBatch::new();
    batch.record("field1", 41.5);
    batch.record("field2", 51.9);
    batch
}

fn relay(url: String, timeout_ms: u64, retry_attempts: usize) -> HttpCloudRelay {
    HttpCloudRelay::new(HttpRelayConfig {
        url,
        api_key: Some("WRITE_KEY".to_string()),
        timeout_ms,
        retry_attempts,
    })
}

#[tokio::test]
async fn test_upload_posts_api_key_and_fields() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/update.json"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "api_key": "WRITE_KEY",
            "field1": 41.5,
            "field2": 51.9
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("42"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let relay = relay(format!("{}/update.json", mock_server.uri()), 2000, 0);
    assert!(relay.upload(&batch()).await.is_ok());
}

#[tokio::test]
async fn test_relay_built_from_config_section() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/update.json"))
        .and(body_partial_json(json!({ "api_key": "CONFIG_KEY" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = GatewayConfig::from_toml_str(&format!(
        r#"
[gateway]
id = "hub-01"

[broker]
url = "mqtt://localhost:1883"

[cloud]
url = "{}/update.json"
api_key = "CONFIG_KEY"
"#,
        mock_server.uri()
    ))
    .unwrap();

    let section = config.cloud.as_ref().unwrap();
    let relay = HttpCloudRelay::new(HttpRelayConfig::from_section(
        section,
        config.cloud_api_key().unwrap(),
    ));
    assert!(relay.upload(&batch()).await.is_ok());
}

#[tokio::test]
async fn test_transient_server_error_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/update.json"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/update.json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let relay = relay(format!("{}/update.json", mock_server.uri()), 2000, 2);
    assert!(relay.upload(&batch()).await.is_ok());
}

#[tokio::test]
async fn test_slow_endpoint_times_out_without_retry() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/update.json"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let relay = relay(format!("{}/update.json", mock_server.uri()), 100, 3);
    assert!(matches!(
        relay.upload(&batch()).await,
        Err(RelayError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let relay = relay("http://127.0.0.1:1/update.json".to_string(), 1000, 1);
    assert!(matches!(
        relay.upload(&batch()).await,
        Err(RelayError::Network(_))
    ));
}

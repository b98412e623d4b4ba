//! Pure connection configuration for the MQTT client
//!
//! This module builds rumqttc options from configuration and defines the
//! transport error type.

use crate::config::{BrokerSection, Credentials};
use crate::protocol::Presence;
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected")]
    NotConnected,
}

/// Split a broker URL into host, port and TLS flag
pub fn parse_broker_url(broker_url: &str) -> Result<(String, u16, bool), MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let tls = url.scheme() == "mqtts";
    let port = url.port().unwrap_or(if tls { 8883 } else { 1883 });

    Ok((host.to_string(), port, tls))
}

/// Build MQTT options for one connection attempt
///
/// The presence topic receives a retained `Offline` last will so peers learn
/// about an unclean disconnect from the broker.
pub fn configure_mqtt_options(
    client_id: &str,
    presence_topic: &str,
    broker: &BrokerSection,
    credentials: &Credentials,
) -> Result<MqttOptions, MqttError> {
    let (host, port, tls) = parse_broker_url(&broker.url)?;
    let mut mqtt_options = MqttOptions::new(client_id, host, port);

    if tls {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    if let Some(username) = &credentials.username {
        let password = credentials.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));

    // MQTT v5 LastWill takes 5 parameters: topic, payload, qos, retain, properties
    let lwt = LastWill::new(
        presence_topic,
        Presence::Offline.as_str(),
        QoS::AtLeastOnce,
        true,
        None,
    );
    mqtt_options.set_last_will(lwt);

    Ok(mqtt_options)
}

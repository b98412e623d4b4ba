//! MQTT v5 transport for the IoT hub
//!
//! The module separates pure functions from I/O operations:
//!
//! - [`connection`] - Pure option building and transport errors
//! - [`message_handler`] - Pure mapping of rumqttc events to transport events
//! - [`client`] - Impure I/O operations and event loop ownership
//!
//! # Usage
//!
//! ```rust,no_run
//! use iothub::config::{BrokerSection, Credentials};
//! use iothub::transport::{mqtt::MqttClient, Transport};
//!
//! # tokio_test::block_on(async {
//! let broker = BrokerSection {
//!     url: "mqtt://localhost:1883".to_string(),
//!     client_id: Some("hub-01".to_string()),
//!     username: None,
//!     username_env: None,
//!     password: None,
//!     password_env: None,
//!     keep_alive_secs: 60,
//!     connect_timeout_secs: 30,
//! };
//!
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(64);
//! let mut client = MqttClient::new("hub-01", "server/iot/lwt", broker, events_tx)?;
//! client.connect(&Credentials::default()).await?;
//! let first_event = events_rx.recv().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, MqttError};
pub use message_handler::{EventRoute, MessageHandler};

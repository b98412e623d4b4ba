//! Transport layer for broker communication
//!
//! This module provides the transport abstraction used by the gateway session
//! and its MQTT implementation.

use crate::protocol::{InboundMessage, QosLevel};

pub use crate::config::Credentials;

pub mod mqtt;

/// Transport trait for broker communication
///
/// Connection outcomes and inbound messages are not returned from these calls.
/// They arrive asynchronously as [`TransportEvent`]s on the channel the
/// transport was created with.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start a connection attempt; the outcome is reported as `ConnectResult`
    async fn connect(&mut self, credentials: &Credentials) -> Result<(), Self::Error>;

    /// Close the connection and stop the event loop
    async fn disconnect(&mut self) -> Result<(), Self::Error>;

    /// Queue a message for publication without waiting for the broker
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), Self::Error>;

    /// Subscribe to each topic with the given QoS
    async fn subscribe(&self, topics: &[String], qos: QosLevel) -> Result<(), Self::Error>;
}

/// Events reported by a transport to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Outcome of a connect attempt; `code == 0` means success
    ConnectResult { code: u8, reason: String },
    /// An established connection was lost
    Disconnected { code: u8, reason: String },
    /// Message received on a subscribed topic
    Message(InboundMessage),
}

//! Broker session state machine
//!
//! The session owns the transport and is the only place where connection side
//! effects happen: subscriptions and the `Online` announcement on every
//! successful connect, the `Offline` announcement on graceful disconnect.
//! Connection outcomes arrive later as transport events and are fed back in
//! through [`Session::on_connect_result`] and [`Session::on_disconnect`].

use crate::config::Credentials;
use crate::observability::metrics;
use crate::protocol::{Presence, QosLevel, TopicKey, TopicRegistry, STATUS_COMMAND};
use crate::transport::Transport;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Connect attempt started, waiting for the broker's answer
    Connecting,
    Connected,
    /// Graceful disconnect in progress
    Disconnecting,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// What a reconnect tick should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectionDecision {
    AlreadyConnected,
    /// An attempt is in flight and still within its timeout
    AttemptPending,
    /// A graceful disconnect is in progress
    ShuttingDown,
    /// Start a new connect attempt
    Proceed,
    /// The in-flight attempt exceeded its timeout and is abandoned
    AttemptTimedOut,
}

/// Decide the action of a reconnect tick (pure function)
pub fn decide_reconnection(
    state: SessionState,
    attempt_age: Option<Duration>,
    connect_timeout: Duration,
) -> ReconnectionDecision {
    match state {
        SessionState::Connected => ReconnectionDecision::AlreadyConnected,
        SessionState::Disconnecting => ReconnectionDecision::ShuttingDown,
        SessionState::Connecting => match attempt_age {
            Some(age) if age >= connect_timeout => ReconnectionDecision::AttemptTimedOut,
            _ => ReconnectionDecision::AttemptPending,
        },
        SessionState::Disconnected => ReconnectionDecision::Proceed,
    }
}

pub struct Session<T: Transport> {
    transport: T,
    state: SessionState,
    presence_topic: String,
    status_request_topic: String,
    subscriptions: Vec<String>,
    attempt_started: Option<Instant>,
    connect_timeout: Duration,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, registry: &TopicRegistry, connect_timeout: Duration) -> Self {
        Self {
            transport,
            state: SessionState::Disconnected,
            presence_topic: registry.resolve(TopicKey::IotLwt),
            status_request_topic: registry.resolve(TopicKey::FanCommandControl),
            subscriptions: Vec::new(),
            attempt_started: None,
            connect_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Topics subscribed on every successful connect
    pub fn set_subscriptions(&mut self, topics: Vec<String>) {
        self.subscriptions = topics;
    }

    pub fn subscriptions(&self) -> &[String] {
        &self.subscriptions
    }

    /// Start a connect attempt
    ///
    /// Returns `true` when an attempt was started. A no-op unless the session
    /// is disconnected; a failure to start is logged and not retried here.
    pub async fn connect(&mut self, credentials: &Credentials) -> bool {
        if self.state != SessionState::Disconnected {
            debug!(state = %self.state, "Connect ignored, session not disconnected");
            return false;
        }

        self.state = SessionState::Connecting;
        self.attempt_started = Some(Instant::now());
        metrics().mqtt_connection_attempt();

        match self.transport.connect(credentials).await {
            Ok(()) => {
                debug!("Connect attempt in flight");
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to start broker connection");
                self.state = SessionState::Disconnected;
                self.attempt_started = None;
                metrics().mqtt_connection_failed();
                false
            }
        }
    }

    /// Apply the outcome of a connect attempt
    pub async fn on_connect_result(&mut self, code: u8, reason: &str) {
        if self.state != SessionState::Connecting {
            debug!(state = %self.state, code, "Stale connect result ignored");
            return;
        }
        self.attempt_started = None;

        if code != 0 {
            self.state = SessionState::Disconnected;
            metrics().mqtt_connection_failed();
            error!(code, reason, "Broker connection refused");
            return;
        }

        self.state = SessionState::Connected;
        metrics().mqtt_connection_established();
        info!("Connected to broker");

        if let Err(e) = self
            .transport
            .subscribe(&self.subscriptions, QosLevel::AtMostOnce)
            .await
        {
            error!(error = %e, "Failed to subscribe");
        } else {
            info!(count = self.subscriptions.len(), "Subscriptions requested");
        }

        let presence_topic = self.presence_topic.clone();
        self.publish(
            &presence_topic,
            Presence::Online.as_str().as_bytes().to_vec(),
            QosLevel::AtLeastOnce,
            true,
        )
        .await;

        let status_request_topic = self.status_request_topic.clone();
        self.publish(
            &status_request_topic,
            STATUS_COMMAND.as_bytes().to_vec(),
            QosLevel::AtLeastOnce,
            false,
        )
        .await;
    }

    /// Apply a lost connection; reconnecting is left to the reconnect task
    pub fn on_disconnect(&mut self, code: u8, reason: &str) {
        match self.state {
            SessionState::Disconnected | SessionState::Disconnecting => {
                debug!(state = %self.state, code, "Disconnect event ignored");
            }
            SessionState::Connecting | SessionState::Connected => {
                self.state = SessionState::Disconnected;
                self.attempt_started = None;
                metrics().mqtt_connection_lost();
                warn!(code, reason, "Broker connection lost");
            }
        }
    }

    /// Gracefully close the session, announcing `Offline` first when connected
    pub async fn disconnect(&mut self) {
        if self.state == SessionState::Connected {
            let presence_topic = self.presence_topic.clone();
            self.publish(
                &presence_topic,
                Presence::Offline.as_str().as_bytes().to_vec(),
                QosLevel::AtLeastOnce,
                true,
            )
            .await;
        }

        self.state = SessionState::Disconnecting;
        if let Err(e) = self.transport.disconnect().await {
            warn!(error = %e, "Error while closing broker connection");
        }

        self.state = SessionState::Disconnected;
        self.attempt_started = None;
        metrics().mqtt_disconnected();
        info!("Session closed");
    }

    /// Publish if connected; returns whether the message was handed to the transport
    pub async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QosLevel,
        retain: bool,
    ) -> bool {
        if self.state != SessionState::Connected {
            debug!(topic, state = %self.state, "Publish skipped, not connected");
            return false;
        }

        match self.transport.publish(topic, payload, qos, retain).await {
            Ok(()) => {
                metrics().mqtt_message_published();
                true
            }
            Err(e) => {
                metrics().mqtt_publish_failed();
                warn!(topic, error = %e, "Publish failed");
                false
            }
        }
    }

    /// Periodic reconnect check
    pub async fn reconnect_tick(&mut self, credentials: &Credentials) -> ReconnectionDecision {
        let attempt_age = self.attempt_started.map(|started| started.elapsed());
        let decision = decide_reconnection(self.state, attempt_age, self.connect_timeout);

        match decision {
            ReconnectionDecision::Proceed => {
                info!("Not connected, attempting to reconnect");
                if !self.connect(credentials).await {
                    warn!("Reconnect attempt could not be started");
                }
            }
            ReconnectionDecision::AttemptTimedOut => {
                warn!(
                    timeout_secs = self.connect_timeout.as_secs(),
                    "Connect attempt timed out, abandoning it"
                );
                if let Err(e) = self.transport.disconnect().await {
                    debug!(error = %e, "Error while closing timed out attempt");
                }
                self.state = SessionState::Disconnected;
                self.attempt_started = None;
                metrics().mqtt_connection_failed();
            }
            ReconnectionDecision::AttemptPending => {
                debug!("Connect attempt still pending, tick skipped");
            }
            ReconnectionDecision::ShuttingDown => {
                debug!("Session shutting down, tick skipped");
            }
            ReconnectionDecision::AlreadyConnected => {}
        }

        decision
    }
}

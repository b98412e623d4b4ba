//! Topic dispatch table
//!
//! Inbound messages are routed by exact topic equality to exactly one typed
//! handler. Messages on topics without a binding fall through to the default
//! handler, which logs and counts them without touching any state.

use super::commands::{CommandAction, CommandMapper};
use super::store::{DeviceStore, Measurement};
use crate::observability::metrics;
use crate::protocol::{
    decode_text, parse_bounded_float, validate_topic, FanActivity, InboundMessage, PayloadError,
    Presence, TopicError, TopicKey, TopicRegistry,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Status tokens tracked for the fan controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChannel {
    /// `Online` / `Offline` on the fan's last-will topic
    FanPresence,
    /// `Running` / `Idle` on the fan's control status topic
    FanActivity,
}

/// Payload format a handler expects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Float,
    StatusToken,
    CommandToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Measurement(Measurement),
    Status(StatusChannel),
    Command,
}

impl Handler {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Handler::Measurement(_) => PayloadKind::Float,
            Handler::Status(_) => PayloadKind::StatusToken,
            Handler::Command => PayloadKind::CommandToken,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub topic: String,
    pub handler: Handler,
}

/// Dispatch table setup errors
#[derive(Debug, Error, PartialEq)]
pub enum DispatchError {
    #[error("Topic '{0}' already has a handler")]
    DuplicateTopic(String),
    #[error("Invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),
}

/// State handlers are allowed to mutate
pub struct DispatchContext<'a> {
    pub store: &'a mut DeviceStore,
    pub commands: &'a mut CommandMapper,
}

#[derive(Debug, Default)]
pub struct DispatchTable {
    bindings: Vec<Binding>,
    unmatched: u64,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with every inbound topic the hub handles
    pub fn standard(registry: &TopicRegistry) -> Result<Self, DispatchError> {
        let mut table = Self::new();

        for (key, handler) in [
            (
                TopicKey::SystemTempValue,
                Handler::Measurement(Measurement::Temperature),
            ),
            (
                TopicKey::FanStatusTempMax,
                Handler::Measurement(Measurement::TemperatureCeiling),
            ),
            (
                TopicKey::FanStatusPercOn,
                Handler::Measurement(Measurement::FanPercentOn),
            ),
            (
                TopicKey::FanStatusPercOff,
                Handler::Measurement(Measurement::FanPercentOff),
            ),
            (
                TopicKey::FanStatusTempOn,
                Handler::Measurement(Measurement::FanTemperatureOn),
            ),
            (
                TopicKey::FanStatusTempOff,
                Handler::Measurement(Measurement::FanTemperatureOff),
            ),
            (TopicKey::FanLwt, Handler::Status(StatusChannel::FanPresence)),
            (
                TopicKey::FanStatusControl,
                Handler::Status(StatusChannel::FanActivity),
            ),
            (TopicKey::IotCommandControl, Handler::Command),
        ] {
            table.register(registry.resolve(key), handler)?;
        }

        Ok(table)
    }

    /// Bind a handler to a topic; each topic accepts one handler
    pub fn register(
        &mut self,
        topic: impl Into<String>,
        handler: Handler,
    ) -> Result<(), DispatchError> {
        let topic = topic.into();
        validate_topic(&topic)?;

        if self.bindings.iter().any(|b| b.topic == topic) {
            return Err(DispatchError::DuplicateTopic(topic));
        }

        debug!(topic = %topic, kind = ?handler.kind(), "Registered topic handler");
        self.bindings.push(Binding { topic, handler });
        Ok(())
    }

    /// Topics to subscribe to, in registration order
    pub fn topics(&self) -> Vec<String> {
        self.bindings.iter().map(|b| b.topic.clone()).collect()
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn handler_for(&self, topic: &str) -> Option<Handler> {
        self.bindings
            .iter()
            .find(|b| b.topic == topic)
            .map(|b| b.handler)
    }

    /// Number of messages that reached the default handler
    pub fn unmatched_count(&self) -> u64 {
        self.unmatched
    }

    /// Route a message to its handler
    ///
    /// Returns `false` when no binding matched and the default handler ran.
    /// Payload errors are logged and never propagated.
    pub fn route(&mut self, message: &InboundMessage, ctx: &mut DispatchContext<'_>) -> bool {
        let Some(handler) = self.handler_for(&message.topic) else {
            self.unmatched += 1;
            metrics().message_unmatched();
            debug!(
                topic = %message.topic,
                payload = %message.payload_display(),
                "No handler for topic, message discarded"
            );
            return false;
        };

        metrics().message_routed();

        let Some(payload) = message.payload.as_deref() else {
            debug!(topic = %message.topic, "Message without payload ignored");
            return true;
        };

        if let Err(e) = Self::handle(handler, payload, ctx) {
            metrics().payload_rejected();
            warn!(
                topic = %message.topic,
                payload = %message.payload_display(),
                error = %e,
                "Rejected payload"
            );
        }

        true
    }

    fn handle(
        handler: Handler,
        payload: &[u8],
        ctx: &mut DispatchContext<'_>,
    ) -> Result<(), PayloadError> {
        match handler {
            Handler::Measurement(measurement) => {
                let (min, max) = measurement.bounds();
                let value = parse_bounded_float(payload, min, max)?;
                ctx.store.set(measurement, value);
                debug!(measurement = %measurement, value, "Reading updated");
            }
            Handler::Status(StatusChannel::FanPresence) => {
                let presence: Presence = decode_text(payload)?.parse()?;
                ctx.store.set_fan_presence(presence);
                debug!(presence = %presence, "Fan presence updated");
            }
            Handler::Status(StatusChannel::FanActivity) => {
                let activity: FanActivity = decode_text(payload)?.parse()?;
                ctx.store.set_fan_activity(activity);
                debug!(activity = %activity, "Fan activity updated");
            }
            Handler::Command => {
                let action = CommandAction::from_token(decode_text(payload)?)?;
                ctx.commands.execute(action);
            }
        }

        Ok(())
    }
}

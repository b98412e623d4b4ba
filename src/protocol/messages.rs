//! Wire-level message types exchanged with the broker
//!
//! All payloads on the hub's topics are plain UTF-8 text: presence tokens,
//! command tokens, status tokens and decimal measurements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Delivery guarantee requested for a publish or subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QosLevel {
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QosLevel {
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(QosLevel::AtMostOnce),
            1 => Some(QosLevel::AtLeastOnce),
            2 => Some(QosLevel::ExactlyOnce),
            _ => None,
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            QosLevel::AtMostOnce => 0,
            QosLevel::AtLeastOnce => 1,
            QosLevel::ExactlyOnce => 2,
        }
    }
}

/// Message delivered by the broker on a subscribed topic
///
/// An empty broker payload (e.g. a cleared retained message) is represented as
/// `payload: None`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Option<Vec<u8>>,
    pub qos: QosLevel,
    pub retain: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        let payload = payload.into();
        Self {
            topic: topic.into(),
            payload: if payload.is_empty() {
                None
            } else {
                Some(payload)
            },
            qos: QosLevel::AtMostOnce,
            retain: false,
        }
    }

    /// Message carrying no payload at all
    pub fn empty(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: None,
            qos: QosLevel::AtMostOnce,
            retain: false,
        }
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// Payload rendered for logging
    pub fn payload_display(&self) -> String {
        match &self.payload {
            Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            None => "None".to_string(),
        }
    }
}

/// Payload decoding failures
#[derive(Debug, Error, PartialEq)]
pub enum PayloadError {
    #[error("Payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("Payload '{0}' is not a number")]
    NotANumber(String),
    #[error("Value {value} outside accepted range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("Unknown token '{0}'")]
    UnknownToken(String),
}

/// Decode a payload as trimmed UTF-8 text
pub fn decode_text(payload: &[u8]) -> Result<&str, PayloadError> {
    std::str::from_utf8(payload)
        .map(str::trim)
        .map_err(|_| PayloadError::InvalidUtf8)
}

/// Parse a payload as a finite number within `[min, max]`
pub fn parse_bounded_float(payload: &[u8], min: f64, max: f64) -> Result<f64, PayloadError> {
    let text = decode_text(payload)?;
    let value: f64 = text
        .parse()
        .map_err(|_| PayloadError::NotANumber(text.to_string()))?;

    if !value.is_finite() {
        return Err(PayloadError::NotANumber(text.to_string()));
    }
    if value < min || value > max {
        return Err(PayloadError::OutOfRange { value, min, max });
    }

    Ok(value)
}

/// Telemetry wire format: plain decimal with one decimal place
pub fn format_reading(value: f64) -> String {
    format!("{value:.1}")
}

/// Presence tokens carried on last-will topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    Online,
    Offline,
}

impl Presence {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Presence::Online => "Online",
            Presence::Offline => "Offline",
        }
    }
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Presence {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(Presence::Online),
            "Offline" => Ok(Presence::Offline),
            other => Err(PayloadError::UnknownToken(other.to_string())),
        }
    }
}

/// Working state reported by the cooling fan controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FanActivity {
    Running,
    Idle,
}

impl FanActivity {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FanActivity::Running => "Running",
            FanActivity::Idle => "Idle",
        }
    }
}

impl fmt::Display for FanActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FanActivity {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Running" => Ok(FanActivity::Running),
            "Idle" => Ok(FanActivity::Idle),
            other => Err(PayloadError::UnknownToken(other.to_string())),
        }
    }
}

/// Command token asking a peer to report its parameters
pub const STATUS_COMMAND: &str = "STATUS";

//! Topic registry and topic canonicalization for the IoT hub
//!
//! Logical topic keys are resolved to wire-level MQTT topics using a fixed
//! naming convention: the snake_case key is split on `_` into path segments and
//! prefixed with the configured group prefix, e.g. with prefix `server` the key
//! `fan_status_tempmax` resolves to `server/fan/status/tempmax`. Individual keys
//! can be overridden from configuration.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Symbolic names of every topic the hub publishes to or subscribes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TopicKey {
    /// Presence (last will) of the hub itself
    IotLwt,
    /// Commands addressed to the hub
    IotCommandControl,
    /// Republished current system temperature
    IotDataTemperature,
    /// Republished temperature ceiling
    IotDataCeiling,
    /// Republished derived temperature percentage
    IotDataPercentage,
    /// System (SoC) temperature reported by the sensor peer
    SystemTempValue,
    /// Presence (last will) of the cooling fan controller
    FanLwt,
    /// Commands addressed to the cooling fan controller
    FanCommandControl,
    /// Fan activity changes (running / idle)
    FanStatusControl,
    FanStatusPercOn,
    FanStatusPercOff,
    FanStatusTempOn,
    FanStatusTempOff,
    FanStatusTempMax,
}

impl TopicKey {
    pub const ALL: [TopicKey; 14] = [
        TopicKey::IotLwt,
        TopicKey::IotCommandControl,
        TopicKey::IotDataTemperature,
        TopicKey::IotDataCeiling,
        TopicKey::IotDataPercentage,
        TopicKey::SystemTempValue,
        TopicKey::FanLwt,
        TopicKey::FanCommandControl,
        TopicKey::FanStatusControl,
        TopicKey::FanStatusPercOn,
        TopicKey::FanStatusPercOff,
        TopicKey::FanStatusTempOn,
        TopicKey::FanStatusTempOff,
        TopicKey::FanStatusTempMax,
    ];

    /// Configuration name of the key
    pub const fn as_str(&self) -> &'static str {
        match self {
            TopicKey::IotLwt => "iot_lwt",
            TopicKey::IotCommandControl => "iot_command_control",
            TopicKey::IotDataTemperature => "iot_data_temperature",
            TopicKey::IotDataCeiling => "iot_data_ceiling",
            TopicKey::IotDataPercentage => "iot_data_percentage",
            TopicKey::SystemTempValue => "system_temp_value",
            TopicKey::FanLwt => "fan_lwt",
            TopicKey::FanCommandControl => "fan_command_control",
            TopicKey::FanStatusControl => "fan_status_control",
            TopicKey::FanStatusPercOn => "fan_status_percon",
            TopicKey::FanStatusPercOff => "fan_status_percoff",
            TopicKey::FanStatusTempOn => "fan_status_tempon",
            TopicKey::FanStatusTempOff => "fan_status_tempoff",
            TopicKey::FanStatusTempMax => "fan_status_tempmax",
        }
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicKey {
    type Err = TopicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TopicKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| TopicError::UnknownKey(s.to_string()))
    }
}

/// Normalize an MQTT topic: no leading or trailing slashes, no empty levels
pub fn canonicalize_topic(topic: &str) -> String {
    topic
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Reject topics that cannot be published to or matched exactly
pub fn validate_topic(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::EmptyTopic);
    }

    if let Some(ch) = topic.chars().find(|c| matches!(c, '+' | '#' | '\0')) {
        return Err(TopicError::InvalidTopicChar {
            topic: topic.to_string(),
            ch,
        });
    }

    Ok(())
}

/// Resolves topic keys to wire topics for one process
#[derive(Debug, Clone, PartialEq)]
pub struct TopicRegistry {
    prefix: String,
    overrides: HashMap<TopicKey, String>,
}

impl TopicRegistry {
    /// Build a registry from a group prefix and raw `key = topic` overrides
    pub fn new(prefix: &str, overrides: &HashMap<String, String>) -> Result<Self, TopicError> {
        let prefix = canonicalize_topic(prefix);
        if !prefix.is_empty() {
            validate_topic(&prefix)?;
        }

        let mut resolved = HashMap::new();
        for (name, topic) in overrides {
            let key: TopicKey = name.parse()?;
            let topic = canonicalize_topic(topic);
            validate_topic(&topic)?;
            resolved.insert(key, topic);
        }

        Ok(Self {
            prefix,
            overrides: resolved,
        })
    }

    /// Group prefix every conventional topic starts with
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve a key to its wire topic
    pub fn resolve(&self, key: TopicKey) -> String {
        if let Some(topic) = self.overrides.get(&key) {
            return topic.clone();
        }

        let path = key.as_str().replace('_', "/");
        if self.prefix.is_empty() {
            path
        } else {
            format!("{}/{}", self.prefix, path)
        }
    }
}

/// Topic resolution and validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Unknown topic key: {0}")]
    UnknownKey(String),
    #[error("Topic cannot be empty")]
    EmptyTopic,
    #[error("Topic '{topic}' contains invalid character: '{ch}'")]
    InvalidTopicChar { topic: String, ch: char },
}

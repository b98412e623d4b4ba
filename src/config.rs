//! Configuration system for the IoT hub
//!
//! The hub is configured from a single TOML file. Every section except
//! `[gateway]` and `[broker]` is optional and falls back to defaults.

use crate::protocol::TopicRegistry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Main hub configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    pub gateway: GatewaySection,
    pub broker: BrokerSection,
    #[serde(default)]
    pub topics: TopicsSection,
    #[serde(default)]
    pub timers: TimersSection,
    /// External cloud telemetry relay (optional)
    pub cloud: Option<CloudSection>,
}

/// Gateway identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    /// Gateway identifier (must match [a-zA-Z0-9._-]+)
    pub id: String,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// MQTT broker URL with protocol and port
    pub url: String,
    /// MQTT client identifier; defaults to `<gateway id>-<random suffix>`
    pub client_id: Option<String>,
    /// Literal username
    pub username: Option<String>,
    /// Environment variable containing username (wins over `username`)
    pub username_env: Option<String>,
    /// Literal password
    pub password: Option<String>,
    /// Environment variable containing password (wins over `password`)
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// How long a connect attempt may stay pending before it is abandoned
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

/// Topic naming: group prefix plus per-key overrides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    #[serde(default = "default_topic_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub overrides: HashMap<String, String>,
}

fn default_topic_prefix() -> String {
    "server".to_string()
}

impl Default for TopicsSection {
    fn default() -> Self {
        Self {
            prefix: default_topic_prefix(),
            overrides: HashMap::new(),
        }
    }
}

/// Requested timer periods in seconds; clamped to each task's bounds at startup
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimersSection {
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: f64,
    #[serde(default = "default_sampling_secs")]
    pub sampling_secs: f64,
    #[serde(default = "default_cloud_secs")]
    pub cloud_secs: f64,
}

fn default_reconnect_secs() -> f64 {
    15.0
}

fn default_sampling_secs() -> f64 {
    30.0
}

fn default_cloud_secs() -> f64 {
    60.0
}

impl Default for TimersSection {
    fn default() -> Self {
        Self {
            reconnect_secs: default_reconnect_secs(),
            sampling_secs: default_sampling_secs(),
            cloud_secs: default_cloud_secs(),
        }
    }
}

/// Cloud relay endpoint and field mapping
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloudSection {
    /// Full URL of the upload endpoint
    pub url: String,
    pub api_key: Option<String>,
    /// Environment variable containing the write API key (wins over `api_key`)
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: usize,
    /// Telemetry name (`temperature`, `ceiling`, `percentage`) to upload field name
    #[serde(default = "default_cloud_fields")]
    pub fields: BTreeMap<String, String>,
}

/// Upper bound of `cloud.retry_attempts`
pub const MAX_RETRY_ATTEMPTS: usize = 10;

fn default_timeout_ms() -> u64 {
    5000
}

fn default_retry_attempts() -> usize {
    2
}

fn default_cloud_fields() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("temperature".to_string(), "field1".to_string()),
        ("percentage".to_string(), "field2".to_string()),
    ])
}

/// Broker credentials resolved at startup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid gateway ID format: {0}")]
    InvalidGatewayId(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid topic configuration: {0}")]
    InvalidTopics(#[from] crate::protocol::TopicError),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl GatewayConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate fields that serde cannot check on its own
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_gateway_id(&self.gateway.id)?;
        validate_broker_url(&self.broker.url)?;
        self.topic_registry()?;

        if self.broker.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.keep_alive_secs must be greater than 0".to_string(),
            ));
        }

        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        for (name, secs) in [
            ("reconnect_secs", self.timers.reconnect_secs),
            ("sampling_secs", self.timers.sampling_secs),
            ("cloud_secs", self.timers.cloud_secs),
        ] {
            if !secs.is_finite() {
                return Err(ConfigError::InvalidConfig(format!(
                    "timers.{name} must be a finite number of seconds"
                )));
            }
        }

        if let Some(cloud) = &self.cloud {
            Url::parse(&cloud.url).map_err(|e| {
                ConfigError::InvalidConfig(format!("cloud.url '{}' is invalid: {e}", cloud.url))
            })?;
            if cloud.timeout_ms == 0 {
                return Err(ConfigError::InvalidConfig(
                    "cloud.timeout_ms must be greater than 0".to_string(),
                ));
            }
            if cloud.retry_attempts > MAX_RETRY_ATTEMPTS {
                return Err(ConfigError::InvalidConfig(format!(
                    "cloud.retry_attempts must be at most {MAX_RETRY_ATTEMPTS}"
                )));
            }
            for name in cloud.fields.keys() {
                if !["temperature", "ceiling", "percentage"].contains(&name.as_str()) {
                    return Err(ConfigError::InvalidConfig(format!(
                        "cloud.fields contains unknown telemetry name '{name}'"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Build the topic registry described by the `[topics]` section
    pub fn topic_registry(&self) -> Result<TopicRegistry, ConfigError> {
        Ok(TopicRegistry::new(
            &self.topics.prefix,
            &self.topics.overrides,
        )?)
    }

    /// Resolve broker credentials, environment variables taking precedence
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: Self::get_env_var_optional(self.broker.username_env.as_ref())
                .or_else(|| self.broker.username.clone()),
            password: Self::get_env_var_optional(self.broker.password_env.as_ref())
                .or_else(|| self.broker.password.clone()),
        }
    }

    /// Resolve the cloud write API key
    pub fn cloud_api_key(&self) -> Result<Option<String>, ConfigError> {
        let Some(cloud) = &self.cloud else {
            return Ok(None);
        };

        match &cloud.api_key_env {
            Some(env_name) => Self::get_env_var_required(env_name).map(Some),
            None => Ok(cloud.api_key.clone()),
        }
    }

    /// MQTT client identifier for this process
    pub fn client_id(&self) -> String {
        self.broker.client_id.clone().unwrap_or_else(|| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("{}-{}", self.gateway.id, &suffix[..8])
        })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.broker.connect_timeout_secs)
    }

    fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
        env_var_name.and_then(|name| std::env::var(name).ok())
    }

    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[gateway]
id = "test-hub"

[broker]
url = "mqtt://localhost:1883"
client_id = "test-hub-client"

[topics]
prefix = "server"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn validate_gateway_id(gateway_id: &str) -> Result<(), ConfigError> {
    let valid_chars = gateway_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if gateway_id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidGatewayId(format!(
            "Gateway ID '{gateway_id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

fn validate_broker_url(broker_url: &str) -> Result<(), ConfigError> {
    let url =
        Url::parse(broker_url).map_err(|_| ConfigError::InvalidBrokerUrl(broker_url.to_string()))?;

    if !matches!(url.scheme(), "mqtt" | "mqtts" | "tcp") || url.host_str().is_none() {
        return Err(ConfigError::InvalidBrokerUrl(broker_url.to_string()));
    }

    Ok(())
}

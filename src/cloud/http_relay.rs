//! HTTP cloud relay
//!
//! Uploads a telemetry batch as a single JSON POST:
//!
//! ```json
//! {
//!   "api_key": "WRITE_KEY",
//!   "created_at": "2024-05-01T12:00:00Z",
//!   "field1": 41.5,
//!   "field2": 51.9
//! }
//! ```
//!
//! Server errors and network failures are retried with exponential backoff;
//! client errors and timeouts fail immediately.

use super::{CloudRelay, RelayError, TelemetryBatch};
use crate::config::{CloudSection, MAX_RETRY_ATTEMPTS};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct HttpRelayConfig {
    /// Full URL of the upload endpoint
    pub url: String,
    pub api_key: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Number of retry attempts for transient failures (5xx errors)
    pub retry_attempts: usize,
}

impl HttpRelayConfig {
    pub fn from_section(section: &CloudSection, api_key: Option<String>) -> Self {
        Self {
            url: section.url.clone(),
            api_key,
            timeout_ms: section.timeout_ms,
            retry_attempts: section.retry_attempts,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub struct HttpCloudRelay {
    config: HttpRelayConfig,
    client: reqwest::Client,
}

impl HttpCloudRelay {
    pub fn new(config: HttpRelayConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Build the JSON body for a batch (pure function)
    pub fn build_body(api_key: Option<&str>, batch: &TelemetryBatch) -> Value {
        let mut body = Map::new();

        if let Some(api_key) = api_key {
            body.insert("api_key".to_string(), Value::from(api_key));
        }
        if let Some(created_at) = batch.created_at {
            body.insert("created_at".to_string(), Value::from(created_at.to_rfc3339()));
        }
        for (field, value) in &batch.fields {
            body.insert(field.clone(), Value::from(*value));
        }

        Value::Object(body)
    }

    /// Exponential backoff from 100 ms, capped at `MAX_RETRY_ATTEMPTS` doublings
    fn backoff(attempt: usize) -> Duration {
        let exponent = attempt.min(MAX_RETRY_ATTEMPTS) as u32;
        Duration::from_millis(100 * 2_u64.pow(exponent))
    }
}

#[async_trait::async_trait]
impl CloudRelay for HttpCloudRelay {
    fn name(&self) -> &str {
        &self.config.url
    }

    async fn upload(&self, batch: &TelemetryBatch) -> Result<(), RelayError> {
        let body = Self::build_body(self.config.api_key.as_deref(), batch);
        let timeout = self.config.timeout();
        let retry_attempts = self.config.retry_attempts;
        let mut last_error = None;

        for attempt in 0..=retry_attempts {
            debug!(
                attempt = attempt + 1,
                max_attempts = retry_attempts + 1,
                url = %self.config.url,
                fields = batch.len(),
                "Uploading telemetry batch"
            );

            match self
                .client
                .post(&self.config.url)
                .json(&body)
                .timeout(timeout)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        info!(fields = batch.len(), "Telemetry batch uploaded");
                        return Ok(());
                    } else if status.is_server_error() {
                        last_error = Some(format!("Server error: {status}"));
                        if attempt < retry_attempts {
                            warn!(
                                status = %status,
                                attempt = attempt + 1,
                                "Cloud relay returned server error, retrying..."
                            );
                            tokio::time::sleep(Self::backoff(attempt)).await;
                        }
                        continue;
                    } else {
                        return Err(RelayError::Rejected {
                            status: status.as_u16(),
                        });
                    }
                }
                Err(e) if e.is_timeout() => {
                    return Err(RelayError::Timeout(timeout));
                }
                Err(e) if attempt < retry_attempts => {
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        "Cloud relay network error, retrying..."
                    );
                    tokio::time::sleep(Self::backoff(attempt)).await;
                    last_error = Some(format!("Network error: {e}"));
                    continue;
                }
                Err(e) => {
                    return Err(RelayError::Network(e.to_string()));
                }
            }
        }

        Err(RelayError::RetriesExhausted {
            attempts: retry_attempts + 1,
            last_error: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

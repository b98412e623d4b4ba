//! External cloud telemetry relay
//!
//! Telemetry samples are accumulated into a [`TelemetryBatch`] keyed by the
//! relay's field names and uploaded periodically through a [`CloudRelay`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub mod http_relay;

pub use http_relay::{HttpCloudRelay, HttpRelayConfig};

/// Latest value per relay field, with the time of the most recent sample
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetryBatch {
    pub fields: BTreeMap<String, f64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl TelemetryBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value; a later sample for the same field replaces the earlier one
    pub fn record(&mut self, field: impl Into<String>, value: f64) {
        self.fields.insert(field.into(), value);
        self.created_at = Some(Utc::now());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Cloud upload errors
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Relay rejected upload with status: {status}")]
    Rejected { status: u16 },
    #[error("Relay request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Relay request failed: {0}")]
    Network(String),
    #[error("Relay upload failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: usize, last_error: String },
}

/// Destination for batched telemetry
#[async_trait::async_trait]
pub trait CloudRelay: Send + Sync {
    /// Relay name used in logs
    fn name(&self) -> &str;

    /// Upload one batch
    async fn upload(&self, batch: &TelemetryBatch) -> Result<(), RelayError>;
}

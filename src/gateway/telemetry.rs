//! Telemetry sampling and cloud relay
//!
//! The sampling tick republishes the store's current values on the hub's data
//! topics and records them into the pending cloud batch. The cloud tick hands
//! the batch to the configured relay in a background task, independent of the
//! broker session.

use super::session::Session;
use super::store::{DeviceStore, TelemetrySnapshot};
use crate::cloud::{CloudRelay, TelemetryBatch};
use crate::observability::metrics;
use crate::protocol::{format_reading, QosLevel, TopicKey, TopicRegistry};
use crate::transport::Transport;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct TelemetryRelay {
    topics: BTreeMap<&'static str, String>,
    fields: BTreeMap<String, String>,
    batch: TelemetryBatch,
    relay: Option<Arc<dyn CloudRelay>>,
}

impl TelemetryRelay {
    /// `fields` maps telemetry names (`temperature`, `ceiling`, `percentage`)
    /// to the relay's field names; unmapped values are not uploaded.
    pub fn new(
        registry: &TopicRegistry,
        fields: BTreeMap<String, String>,
        relay: Option<Arc<dyn CloudRelay>>,
    ) -> Self {
        let topics = BTreeMap::from([
            ("temperature", registry.resolve(TopicKey::IotDataTemperature)),
            ("ceiling", registry.resolve(TopicKey::IotDataCeiling)),
            ("percentage", registry.resolve(TopicKey::IotDataPercentage)),
        ]);

        Self {
            topics,
            fields,
            batch: TelemetryBatch::new(),
            relay,
        }
    }

    pub fn pending_batch(&self) -> &TelemetryBatch {
        &self.batch
    }

    pub fn has_relay(&self) -> bool {
        self.relay.is_some()
    }

    /// Log, publish and batch the store's current values
    pub async fn sample_tick<T: Transport>(
        &mut self,
        store: &DeviceStore,
        session: &mut Session<T>,
    ) -> TelemetrySnapshot {
        let snapshot = store.snapshot();
        metrics().sample_taken();

        info!(
            temperature = ?snapshot.temperature,
            ceiling = ?snapshot.ceiling,
            percentage = ?snapshot.percentage,
            fan_presence = ?snapshot.fan.presence,
            fan_activity = ?snapshot.fan.activity,
            "Telemetry sample"
        );

        let connected = session.is_connected();
        if !connected {
            debug!("Not connected, telemetry not published");
        }

        for (name, value) in snapshot.named_values() {
            let Some(value) = value else {
                continue;
            };

            if connected {
                if let Some(topic) = self.topics.get(name) {
                    session
                        .publish(
                            topic,
                            format_reading(value).into_bytes(),
                            QosLevel::AtMostOnce,
                            false,
                        )
                        .await;
                }
            }

            if let Some(field) = self.fields.get(name) {
                self.batch.record(field.clone(), value);
            }
        }

        snapshot
    }

    /// Upload the pending batch in the background
    ///
    /// Returns the upload task handle, or `None` when there was nothing to do.
    pub fn cloud_tick(&mut self) -> Option<JoinHandle<()>> {
        if self.batch.is_empty() {
            debug!("No telemetry collected, cloud upload skipped");
            return None;
        }

        let batch = std::mem::take(&mut self.batch);
        let Some(relay) = self.relay.clone() else {
            debug!(fields = batch.len(), "No cloud relay configured, batch discarded");
            return None;
        };

        Some(tokio::spawn(async move {
            match relay.upload(&batch).await {
                Ok(()) => {
                    metrics().cloud_upload_succeeded();
                    debug!(relay = relay.name(), fields = batch.len(), "Cloud upload complete");
                }
                Err(e) => {
                    metrics().cloud_upload_failed();
                    warn!(relay = relay.name(), error = %e, "Cloud upload failed");
                }
            }
        }))
    }
}

//! Thread-safe metrics collection system
//!
//! Provides atomic counters for tracking operational statistics across the
//! broker session, topic dispatch and telemetry relay.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // MQTT session metrics
    mqtt_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connections_lost: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    connection_start_time: AtomicU64,

    // Dispatch metrics
    messages_routed: AtomicU64,
    messages_unmatched: AtomicU64,
    payloads_rejected: AtomicU64,

    // Telemetry metrics
    samples_taken: AtomicU64,
    cloud_uploads: AtomicU64,
    cloud_upload_failures: AtomicU64,
    ticks_dropped: AtomicU64,

    uptime_start: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            mqtt_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            messages_routed: AtomicU64::new(0),
            messages_unmatched: AtomicU64::new(0),
            payloads_rejected: AtomicU64::new(0),
            samples_taken: AtomicU64::new(0),
            cloud_uploads: AtomicU64::new(0),
            cloud_upload_failures: AtomicU64::new(0),
            ticks_dropped: AtomicU64::new(0),
            uptime_start: AtomicU64::new(current_timestamp()),
        }
    }

    // MQTT metrics
    pub fn mqtt_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn mqtt_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    /// Voluntary close; not counted as a lost connection
    pub fn mqtt_disconnected(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn mqtt_message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn mqtt_publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Dispatch metrics
    pub fn message_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_unmatched(&self) {
        self.messages_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payload_rejected(&self) {
        self.payloads_rejected.fetch_add(1, Ordering::Relaxed);
    }

    // Telemetry metrics
    pub fn sample_taken(&self) {
        self.samples_taken.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cloud_upload_succeeded(&self) {
        self.cloud_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cloud_upload_failed(&self) {
        self.cloud_upload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_dropped(&self) {
        self.ticks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.mqtt_connected.store(false, Ordering::Relaxed);
        for counter in [
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.connections_lost,
            &self.messages_published,
            &self.publish_failures,
            &self.connection_start_time,
            &self.messages_routed,
            &self.messages_unmatched,
            &self.payloads_rejected,
            &self.samples_taken,
            &self.cloud_uploads,
            &self.cloud_upload_failures,
            &self.ticks_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
    }

    /// Seconds since the current connection was established (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        let start = self.connection_start_time.load(Ordering::Relaxed);
        if self.mqtt_connected.load(Ordering::Relaxed) && start > 0 {
            now.saturating_sub(start)
        } else {
            0
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        MetricsSnapshot {
            mqtt: MqttMetrics {
                connected: self.mqtt_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            dispatch: DispatchMetrics {
                messages_routed: self.messages_routed.load(Ordering::Relaxed),
                messages_unmatched: self.messages_unmatched.load(Ordering::Relaxed),
                payloads_rejected: self.payloads_rejected.load(Ordering::Relaxed),
            },
            telemetry: TelemetryMetrics {
                samples_taken: self.samples_taken.load(Ordering::Relaxed),
                cloud_uploads: self.cloud_uploads.load(Ordering::Relaxed),
                cloud_upload_failures: self.cloud_upload_failures.load(Ordering::Relaxed),
                ticks_dropped: self.ticks_dropped.load(Ordering::Relaxed),
            },
            uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub mqtt: MqttMetrics,
    pub dispatch: DispatchMetrics,
    pub telemetry: TelemetryMetrics,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct MqttMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connections_lost: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct DispatchMetrics {
    pub messages_routed: u64,
    pub messages_unmatched: u64,
    pub payloads_rejected: u64,
}

#[derive(Debug, Serialize)]
pub struct TelemetryMetrics {
    pub samples_taken: u64,
    pub cloud_uploads: u64,
    pub cloud_upload_failures: u64,
    pub ticks_dropped: u64,
}

/// Get current timestamp in seconds since UNIX epoch
fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

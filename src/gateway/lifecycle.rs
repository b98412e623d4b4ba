//! Gateway coordinator
//!
//! One task owns all hub state and serializes every state change: transport
//! events, periodic ticks and the shutdown signal are all consumed by the
//! `select!` loop in [`Gateway::run`]. Handlers never block the loop on
//! network I/O; publishes are queued by the transport and cloud uploads run
//! in their own tasks.

use super::commands::CommandMapper;
use super::dispatch::{DispatchContext, DispatchTable};
use super::scheduler::{PeriodicTask, Scheduler, TaskKind};
use super::session::Session;
use super::store::DeviceStore;
use super::telemetry::TelemetryRelay;
use crate::cloud::{CloudRelay, HttpCloudRelay, HttpRelayConfig};
use crate::config::{Credentials, GatewayConfig, TimersSection};
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::protocol::TopicKey;
use crate::transport::mqtt::MqttClient;
use crate::transport::{Transport, TransportEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, Instrument};

/// Capacity of the transport event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the tick channel; one slot per task kind
const TICK_CHANNEL_CAPACITY: usize = TaskKind::ALL.len();

pub struct Gateway<T: Transport> {
    gateway_id: String,
    session: Session<T>,
    dispatch: DispatchTable,
    store: DeviceStore,
    commands: CommandMapper,
    scheduler: Scheduler,
    telemetry: TelemetryRelay,
    credentials: Credentials,
    timers: TimersSection,
    events: mpsc::Receiver<TransportEvent>,
    ticks: mpsc::Receiver<TaskKind>,
    uploads: Vec<JoinHandle<()>>,
}

impl Gateway<MqttClient> {
    /// Build a gateway talking to the configured MQTT broker and cloud relay
    pub fn from_config(config: &GatewayConfig, service_mode: bool) -> GatewayResult<Self> {
        let registry = config.topic_registry()?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let transport = MqttClient::new(
            &config.client_id(),
            &registry.resolve(TopicKey::IotLwt),
            config.broker.clone(),
            events_tx,
        )
        .map_err(GatewayError::transport)?;

        let relay = match &config.cloud {
            Some(cloud) => {
                let relay_config = HttpRelayConfig::from_section(cloud, config.cloud_api_key()?);
                Some(Arc::new(HttpCloudRelay::new(relay_config)) as Arc<dyn CloudRelay>)
            }
            None => None,
        };

        Self::new(config, transport, events_rx, relay, service_mode)
    }
}

impl<T: Transport> Gateway<T> {
    /// Assemble a gateway around an injected transport
    ///
    /// `events` must be the receiving end of the channel the transport reports
    /// its [`TransportEvent`]s on.
    pub fn new(
        config: &GatewayConfig,
        transport: T,
        events: mpsc::Receiver<TransportEvent>,
        relay: Option<Arc<dyn CloudRelay>>,
        service_mode: bool,
    ) -> GatewayResult<Self> {
        config.validate()?;
        let registry = config.topic_registry()?;
        let dispatch = DispatchTable::standard(&registry)?;

        let mut session = Session::new(transport, &registry, config.connect_timeout());
        session.set_subscriptions(dispatch.topics());

        let fields = config
            .cloud
            .as_ref()
            .map(|cloud| cloud.fields.clone())
            .unwrap_or_default();
        let telemetry = TelemetryRelay::new(&registry, fields, relay);

        let (ticks_tx, ticks_rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);

        Ok(Self {
            gateway_id: config.gateway.id.clone(),
            session,
            dispatch,
            store: DeviceStore::new(),
            commands: CommandMapper::new(service_mode),
            scheduler: Scheduler::new(ticks_tx),
            telemetry,
            credentials: config.credentials(),
            timers: config.timers.clone(),
            events,
            ticks: ticks_rx,
            uploads: Vec::new(),
        })
    }

    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    pub fn store(&self) -> &DeviceStore {
        &self.store
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn dispatch(&self) -> &DispatchTable {
        &self.dispatch
    }

    pub fn commands(&self) -> &CommandMapper {
        &self.commands
    }

    pub fn telemetry(&self) -> &TelemetryRelay {
        &self.telemetry
    }

    /// Run until the shutdown signal fires or an `EXIT` command is accepted
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> GatewayResult<()> {
        let span = crate::lifecycle_span!(phase = "run", gateway_id = %self.gateway_id);
        self.run_inner(&mut shutdown).instrument(span).await
    }

    async fn run_inner(&mut self, shutdown: &mut watch::Receiver<bool>) -> GatewayResult<()> {
        info!(gateway_id = %self.gateway_id, "Starting gateway");
        self.start_tasks();
        self.session.connect(&self.credentials).await;

        let mut result = Ok(());

        while self.commands.is_running() {
            if *shutdown.borrow_and_update() {
                info!("Shutdown requested");
                self.commands.request_stop();
                break;
            }

            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("Shutdown signal dropped, stopping gateway");
                        self.commands.request_stop();
                    }
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        error!("Transport event channel closed, stopping gateway");
                        self.commands.request_stop();
                        result = Err(GatewayError::internal_error("transport event channel closed"));
                    }
                },
                Some(kind) = self.ticks.recv() => {
                    self.scheduler.acknowledge(kind);
                    self.handle_tick(kind).await;
                }
            }
        }

        self.shutdown().await;
        result
    }

    fn start_tasks(&mut self) {
        self.scheduler
            .start(PeriodicTask::new(TaskKind::Reconnect, self.timers.reconnect_secs));
        self.scheduler
            .start(PeriodicTask::new(TaskKind::Sampling, self.timers.sampling_secs));
        if self.telemetry.has_relay() {
            self.scheduler
                .start(PeriodicTask::new(TaskKind::CloudRelay, self.timers.cloud_secs));
        } else {
            info!("No cloud relay configured, cloud task not started");
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectResult { code, reason } => {
                self.session.on_connect_result(code, &reason).await;
            }
            TransportEvent::Disconnected { code, reason } => {
                self.session.on_disconnect(code, &reason);
            }
            TransportEvent::Message(message) => {
                let mut ctx = DispatchContext {
                    store: &mut self.store,
                    commands: &mut self.commands,
                };
                self.dispatch.route(&message, &mut ctx);
            }
        }
    }

    async fn handle_tick(&mut self, kind: TaskKind) {
        debug!(task = %kind, "Periodic tick");

        match kind {
            TaskKind::Reconnect => {
                self.session.reconnect_tick(&self.credentials).await;
            }
            TaskKind::Sampling => {
                self.telemetry
                    .sample_tick(&self.store, &mut self.session)
                    .await;
            }
            TaskKind::CloudRelay => {
                self.uploads.retain(|handle| !handle.is_finished());
                if let Some(handle) = self.telemetry.cloud_tick() {
                    self.uploads.push(handle);
                }
            }
        }
    }

    /// Stop periodic work, then announce `Offline` and close the session
    async fn shutdown(&mut self) {
        info!(gateway_id = %self.gateway_id, "Shutting down gateway");

        self.scheduler.stop_all().await;
        self.session.disconnect().await;

        let pending = self
            .uploads
            .drain(..)
            .filter(|handle| !handle.is_finished())
            .map(|handle| handle.abort())
            .count();
        if pending > 0 {
            info!(pending, "Abandoned in-flight cloud uploads");
        }

        let snapshot = metrics().get_metrics();
        info!(
            uptime_seconds = snapshot.uptime_seconds,
            connections_established = snapshot.mqtt.connections_established,
            connections_lost = snapshot.mqtt.connections_lost,
            messages_routed = snapshot.dispatch.messages_routed,
            messages_unmatched = snapshot.dispatch.messages_unmatched,
            payloads_rejected = snapshot.dispatch.payloads_rejected,
            samples_taken = snapshot.telemetry.samples_taken,
            cloud_uploads = snapshot.telemetry.cloud_uploads,
            "Gateway stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::SessionState;
    use crate::protocol::InboundMessage;
    use crate::testing::mocks::MockTransport;

    fn gateway(transport: MockTransport, service_mode: bool) -> Gateway<MockTransport> {
        let config = GatewayConfig::test_config();
        let (_events_tx, events_rx) = mpsc::channel(8);
        Gateway::new(&config, transport, events_rx, None, service_mode).unwrap()
    }

    async fn connect(gateway: &mut Gateway<MockTransport>) {
        gateway.session.connect(&Credentials::default()).await;
        gateway
            .handle_event(TransportEvent::ConnectResult {
                code: 0,
                reason: "accepted".to_string(),
            })
            .await;
    }

    #[test]
    fn test_subscriptions_follow_dispatch_table() {
        let gateway = gateway(MockTransport::new(), false);
        assert_eq!(gateway.session().subscriptions().len(), 9);
        assert_eq!(gateway.session().subscriptions(), gateway.dispatch().topics());
    }

    #[tokio::test]
    async fn test_connect_result_event_subscribes() {
        let transport = MockTransport::new();
        let mut gateway = gateway(transport.clone(), false);

        connect(&mut gateway).await;

        assert_eq!(gateway.session().state(), SessionState::Connected);
        assert_eq!(transport.get_subscriptions().await.len(), 9);
    }

    #[tokio::test]
    async fn test_message_event_updates_store() {
        let mut gateway = gateway(MockTransport::new(), false);

        gateway
            .handle_event(TransportEvent::Message(InboundMessage::new(
                "server/system/temp/value",
                "41.5",
            )))
            .await;
        gateway
            .handle_event(TransportEvent::Message(InboundMessage::new(
                "server/fan/status/tempmax",
                "83.0",
            )))
            .await;

        assert_eq!(gateway.store().current_temperature(), Some(41.5));
        assert_eq!(gateway.store().temperature_ceiling(), Some(83.0));
        assert_eq!(gateway.store().percentage(), Some(50.0));
    }

    #[tokio::test]
    async fn test_exit_command_respects_service_mode() {
        let mut foreground = gateway(MockTransport::new(), false);
        foreground
            .handle_event(TransportEvent::Message(InboundMessage::new(
                "server/iot/command/control",
                "EXIT",
            )))
            .await;
        assert!(!foreground.commands().is_running());

        let mut service = gateway(MockTransport::new(), true);
        service
            .handle_event(TransportEvent::Message(InboundMessage::new(
                "server/iot/command/control",
                "EXIT",
            )))
            .await;
        assert!(service.commands().is_running());
    }

    #[tokio::test]
    async fn test_sampling_tick_publishes_when_connected() {
        let transport = MockTransport::new();
        let mut gateway = gateway(transport.clone(), false);
        connect(&mut gateway).await;
        transport.clear_history().await;

        gateway
            .handle_event(TransportEvent::Message(InboundMessage::new(
                "server/system/temp/value",
                "40.0",
            )))
            .await;
        gateway.handle_tick(TaskKind::Sampling).await;

        let published = transport.get_published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "server/iot/data/temperature");
        assert_eq!(published[0].payload, b"40.0");
    }

    #[tokio::test]
    async fn test_disconnect_event_leaves_reconnect_to_tick() {
        let transport = MockTransport::new();
        let mut gateway = gateway(transport.clone(), false);
        connect(&mut gateway).await;

        gateway
            .handle_event(TransportEvent::Disconnected {
                code: 0x80,
                reason: "keep alive timeout".to_string(),
            })
            .await;
        assert_eq!(gateway.session().state(), SessionState::Disconnected);
        assert_eq!(transport.connect_count().await, 1);

        gateway.handle_tick(TaskKind::Reconnect).await;
        assert_eq!(gateway.session().state(), SessionState::Connecting);
        assert_eq!(transport.connect_count().await, 2);
    }
}

//! Hub core: device state, topic dispatch, broker session and periodic work
//!
//! [`Gateway`] ties the pieces together and is the only owner of mutable hub
//! state while running.

pub mod commands;
pub mod dispatch;
pub mod lifecycle;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod telemetry;

pub use commands::{ActionOutcome, CommandAction, CommandMapper};
pub use dispatch::{Binding, DispatchContext, DispatchError, DispatchTable, Handler, StatusChannel};
pub use lifecycle::{Gateway, EVENT_CHANNEL_CAPACITY};
pub use scheduler::{clamp_period, PeriodicTask, Scheduler, TaskKind};
pub use session::{decide_reconnection, ReconnectionDecision, Session, SessionState};
pub use store::{derive_percentage, DeviceStore, FanState, Measurement, TelemetrySnapshot};
pub use telemetry::TelemetryRelay;

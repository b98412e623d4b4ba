//! IoT hub gateway
//!
//! Bridges an MQTT broker, two embedded peers (a temperature sensor and a fan
//! controller) and an external cloud telemetry relay.
//!
//! # Overview
//!
//! - [`protocol`]: topic registry and payload formats
//! - [`transport`]: broker transport abstraction and its MQTT v5 implementation
//! - [`gateway`]: device store, topic dispatch, broker session, periodic tasks
//! - [`cloud`]: batched telemetry upload over HTTP
//! - [`observability`]: structured logging and metrics
//!
//! # Quick Start
//!
//! ```no_run
//! use iothub::config::GatewayConfig;
//! use iothub::gateway::Gateway;
//! use std::path::Path;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::load_from_file(Path::new("iothub.toml"))?;
//! let mut gateway = Gateway::from_config(&config, false)?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! gateway.run(shutdown_rx).await?;
//! # Ok(())
//! # }
//! ```

pub mod cloud;
pub mod config;
pub mod error;
pub mod gateway;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::Gateway;
pub use protocol::*;
pub use transport::mqtt::MqttClient;

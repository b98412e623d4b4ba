//! Testing utilities and mock implementations
//!
//! Mocks for exercising the hub without an MQTT broker or a cloud endpoint.

pub mod mocks;

pub use mocks::*;

//! Last-known device readings and fan state
//!
//! The store is owned by the gateway coordinator and mutated only from its
//! task. Readings are never deleted; the last accepted write wins.

use crate::protocol::{FanActivity, Presence};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// Numeric quantities tracked by the hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Measurement {
    /// Current system temperature in °C
    Temperature,
    /// Maximum temperature reported by the fan controller in °C
    TemperatureCeiling,
    /// Percentage at which the fan switches on
    FanPercentOn,
    /// Percentage at which the fan switches off
    FanPercentOff,
    FanTemperatureOn,
    FanTemperatureOff,
}

impl Measurement {
    pub const ALL: [Measurement; 6] = [
        Measurement::Temperature,
        Measurement::TemperatureCeiling,
        Measurement::FanPercentOn,
        Measurement::FanPercentOff,
        Measurement::FanTemperatureOn,
        Measurement::FanTemperatureOff,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Measurement::Temperature => "temperature",
            Measurement::TemperatureCeiling => "temperature_ceiling",
            Measurement::FanPercentOn => "fan_percent_on",
            Measurement::FanPercentOff => "fan_percent_off",
            Measurement::FanTemperatureOn => "fan_temperature_on",
            Measurement::FanTemperatureOff => "fan_temperature_off",
        }
    }

    /// Inclusive range of accepted values
    pub const fn bounds(&self) -> (f64, f64) {
        match self {
            Measurement::Temperature
            | Measurement::TemperatureCeiling
            | Measurement::FanTemperatureOn
            | Measurement::FanTemperatureOff => (-50.0, 150.0),
            Measurement::FanPercentOn | Measurement::FanPercentOff => (0.0, 100.0),
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceReading {
    pub measurement: Measurement,
    pub value: Option<f64>,
    pub updated_at: Option<Instant>,
}

impl DeviceReading {
    fn unknown(measurement: Measurement) -> Self {
        Self {
            measurement,
            value: None,
            updated_at: None,
        }
    }
}

/// Presence and activity of the cooling fan controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanState {
    pub presence: Option<Presence>,
    pub activity: Option<FanActivity>,
}

/// Point-in-time copy of the values republished as telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub temperature: Option<f64>,
    pub ceiling: Option<f64>,
    pub percentage: Option<f64>,
    pub fan: FanState,
}

impl TelemetrySnapshot {
    /// Telemetry values keyed by their relay name
    pub fn named_values(&self) -> [(&'static str, Option<f64>); 3] {
        [
            ("temperature", self.temperature),
            ("ceiling", self.ceiling),
            ("percentage", self.percentage),
        ]
    }
}

/// Percentage of the ceiling reached by the current temperature
///
/// Defined only when both values are known and the ceiling is positive; the
/// result is clamped to `[0, 100]`.
pub fn derive_percentage(current: Option<f64>, ceiling: Option<f64>) -> Option<f64> {
    match (current, ceiling) {
        (Some(current), Some(ceiling)) if ceiling > 0.0 => {
            Some((current / ceiling * 100.0).clamp(0.0, 100.0))
        }
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct DeviceStore {
    readings: BTreeMap<Measurement, DeviceReading>,
    fan: FanState,
}

impl DeviceStore {
    pub fn new() -> Self {
        Self {
            readings: Measurement::ALL
                .iter()
                .map(|&m| (m, DeviceReading::unknown(m)))
                .collect(),
            fan: FanState::default(),
        }
    }

    pub fn set(&mut self, measurement: Measurement, value: f64) {
        self.readings.insert(
            measurement,
            DeviceReading {
                measurement,
                value: Some(value),
                updated_at: Some(Instant::now()),
            },
        );
    }

    pub fn get(&self, measurement: Measurement) -> Option<f64> {
        self.reading(measurement).value
    }

    pub fn reading(&self, measurement: Measurement) -> DeviceReading {
        self.readings
            .get(&measurement)
            .copied()
            .unwrap_or_else(|| DeviceReading::unknown(measurement))
    }

    pub fn set_current_temperature(&mut self, value: f64) {
        self.set(Measurement::Temperature, value);
    }

    pub fn set_temperature_ceiling(&mut self, value: f64) {
        self.set(Measurement::TemperatureCeiling, value);
    }

    pub fn current_temperature(&self) -> Option<f64> {
        self.get(Measurement::Temperature)
    }

    pub fn temperature_ceiling(&self) -> Option<f64> {
        self.get(Measurement::TemperatureCeiling)
    }

    pub fn percentage(&self) -> Option<f64> {
        derive_percentage(self.current_temperature(), self.temperature_ceiling())
    }

    pub fn set_fan_presence(&mut self, presence: Presence) {
        self.fan.presence = Some(presence);
    }

    pub fn set_fan_activity(&mut self, activity: FanActivity) {
        self.fan.activity = Some(activity);
    }

    pub fn fan(&self) -> FanState {
        self.fan
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            temperature: self.current_temperature(),
            ceiling: self.temperature_ceiling(),
            percentage: self.percentage(),
            fan: self.fan,
        }
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new()
    }
}

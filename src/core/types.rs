//! Core data types for seat readings.
//!
//! - [`Distance`]: Ranger measurement or an explicit "unavailable" marker
//! - [`PressureReading`]: Denoised values for the eight named pressure keys
//! - [`ADC_MAX`]: Full-scale raw value of a pressure channel

use serde::{Deserialize, Serialize};

/// Full-scale raw value of a 10-bit ADC channel
pub const ADC_MAX: u16 = 1023;

/// Pressure keys in wire order. Index `i` is the `i`-th configured ADC input.
pub const PRESSURE_KEYS: [&str; 8] = [
    "seat_front",
    "seat_back",
    "seat_left",
    "seat_right",
    "back_front",
    "back_back",
    "back_left",
    "back_right",
];

/// Raw samples of all eight pressure channels, in [`PRESSURE_KEYS`] order
pub type RawChannels = [u16; 8];

/// Distance sample from the proximity sensor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Distance {
    /// Valid measurement in centimeters
    Centimeters(f64),
    /// Sensor absent, read failed, or measurement invalid
    Unavailable,
}

impl Distance {
    /// Convert a ranger measurement in meters.
    ///
    /// Non-finite and negative measurements are invalid. Values beyond
    /// `max_m` are clamped, matching how the ranger reports "nothing in range".
    pub fn from_meters(meters: f64, max_m: f64) -> Self {
        if !meters.is_finite() || meters < 0.0 {
            return Distance::Unavailable;
        }
        Distance::Centimeters(meters.min(max_m) * 100.0)
    }

    pub fn centimeters(&self) -> Option<f64> {
        match self {
            Distance::Centimeters(cm) => Some(*cm),
            Distance::Unavailable => None,
        }
    }
}

/// Denoised pressure values keyed by seat position.
///
/// Field order is the wire order; serde keeps it when serializing to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PressureReading {
    pub seat_front: u16,
    pub seat_back: u16,
    pub seat_left: u16,
    pub seat_right: u16,
    pub back_front: u16,
    pub back_back: u16,
    pub back_left: u16,
    pub back_right: u16,
}

impl PressureReading {
    /// Map channel values onto the keys in [`PRESSURE_KEYS`] order
    pub fn from_channels(values: RawChannels) -> Self {
        let [
            seat_front,
            seat_back,
            seat_left,
            seat_right,
            back_front,
            back_back,
            back_left,
            back_right,
        ] = values;
        Self {
            seat_front,
            seat_back,
            seat_left,
            seat_right,
            back_front,
            back_back,
            back_left,
            back_right,
        }
    }

    /// Values in [`PRESSURE_KEYS`] order
    pub fn to_channels(&self) -> RawChannels {
        [
            self.seat_front,
            self.seat_back,
            self.seat_left,
            self.seat_right,
            self.back_front,
            self.back_back,
            self.back_left,
            self.back_right,
        ]
    }
}

//! Fault-isolated sensor acquisition
//!
//! Every sample is read independently. A failing pressure channel reads as 0
//! and a failing or missing ranger reads as [`Distance::Unavailable`]; neither
//! is ever returned as an error. There are no retries: the next poll simply
//! reads fresh hardware state.

use crate::core::sensor::{AnalogInput, RangeSensor, SensorHandles};
use crate::core::types::{Distance, RawChannels, ADC_MAX, PRESSURE_KEYS};
use crate::error::{Error, Result};

/// Consecutive failures between repeated warnings for one channel
const FAILURE_LOG_EVERY: u32 = 60;

struct Channel {
    input: Box<dyn AnalogInput>,
    key: &'static str,
    consecutive_failures: u32,
}

/// Owns the seat's hardware handles for the lifetime of the process
pub struct SensorAcquisition {
    channels: Vec<Channel>,
    ranger: Option<Box<dyn RangeSensor>>,
    max_distance_m: f64,
    ranger_failures: u32,
}

impl SensorAcquisition {
    /// Take ownership of opened handles. Exactly eight channels are required.
    pub fn new(handles: SensorHandles, max_distance_m: f64) -> Result<Self> {
        if handles.channels.len() != PRESSURE_KEYS.len() {
            return Err(Error::InvalidParameter(format!(
                "expected {} pressure channels, got {}",
                PRESSURE_KEYS.len(),
                handles.channels.len()
            )));
        }

        let channels = handles
            .channels
            .into_iter()
            .zip(PRESSURE_KEYS)
            .map(|(input, key)| Channel {
                input,
                key,
                consecutive_failures: 0,
            })
            .collect();

        Ok(Self {
            channels,
            ranger: handles.ranger,
            max_distance_m,
            ranger_failures: 0,
        })
    }

    /// Read all eight channels as raw counts in [0, 1023]
    pub fn read_pressure_channels(&mut self) -> RawChannels {
        let mut raw = [0u16; 8];
        for (slot, channel) in raw.iter_mut().zip(self.channels.iter_mut()) {
            *slot = match channel.input.read_normalized() {
                Ok(level) => {
                    if channel.consecutive_failures > 0 {
                        log::info!(
                            "Pressure channel {} recovered after {} failed reads",
                            channel.key,
                            channel.consecutive_failures
                        );
                        channel.consecutive_failures = 0;
                    }
                    scale_to_counts(level)
                }
                Err(e) => {
                    channel.consecutive_failures = channel.consecutive_failures.saturating_add(1);
                    if channel.consecutive_failures % FAILURE_LOG_EVERY == 1 {
                        log::warn!(
                            "Pressure channel {} read failed ({} in a row), reporting 0: {}",
                            channel.key,
                            channel.consecutive_failures,
                            e
                        );
                    }
                    0
                }
            };
        }
        raw
    }

    /// Read the ranger, `Unavailable` on absence, error or missing echo
    pub fn read_distance(&mut self) -> Distance {
        let Some(ranger) = self.ranger.as_mut() else {
            return Distance::Unavailable;
        };

        match ranger.read_meters() {
            Ok(Some(meters)) => {
                self.ranger_failures = 0;
                Distance::from_meters(meters, self.max_distance_m)
            }
            Ok(None) => {
                log::debug!("Ranger returned no echo");
                Distance::Unavailable
            }
            Err(e) => {
                self.ranger_failures = self.ranger_failures.saturating_add(1);
                if self.ranger_failures % FAILURE_LOG_EVERY == 1 {
                    log::warn!(
                        "Ranger read failed ({} in a row), reporting unavailable: {}",
                        self.ranger_failures,
                        e
                    );
                }
                Distance::Unavailable
            }
        }
    }

    /// Whether a ranger was found at startup
    pub fn has_ranger(&self) -> bool {
        self.ranger.is_some()
    }

    /// Channels whose most recent reads failed, with the failure streak
    pub fn channel_failures(&self) -> Vec<(&'static str, u32)> {
        self.channels
            .iter()
            .filter(|c| c.consecutive_failures > 0)
            .map(|c| (c.key, c.consecutive_failures))
            .collect()
    }
}

/// Absorbs float error when a level is exactly `counts / ADC_MAX`
const SCALE_EPSILON: f64 = 1e-6;

/// Scale a normalized level to ADC counts by truncation, clamping
/// out-of-range input
fn scale_to_counts(level: f64) -> u16 {
    if level.is_nan() {
        return 0;
    }
    (level.clamp(0.0, 1.0) * f64::from(ADC_MAX) + SCALE_EPSILON).floor() as u16
}

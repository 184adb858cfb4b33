//! Mock sensor backend for hardware-free runs and tests
//!
//! Two kinds of handles live here:
//!
//! - [`open`] builds a **simulated seat**: someone sits down for
//!   `occupied_cycles` polls, leaves for `vacant_cycles` polls, and so on.
//!   Pressure follows a per-position load profile with Gaussian noise, the
//!   ranger reports a close target while seated and an empty seat otherwise.
//! - [`FixedInput`], [`FailingInput`], [`FixedRanger`] and [`FailingRanger`]
//!   return scripted values so acquisition and streaming can be tested with
//!   exact expectations.
//!
//! Example configuration:
//!
//! ```toml
//! [device]
//! type = "mock"
//!
//! [device.simulation]
//! random_seed = 42      # 0 = random each run
//! occupied_cycles = 6
//! vacant_cycles = 3
//! pressure_stddev = 4.0
//! failing_channels = [5]
//! ```

mod noise;

use crate::config::{DeviceConfig, SimulationConfig};
use crate::core::sensor::{AnalogInput, RangeSensor, SensorHandles};
use crate::core::types::ADC_MAX;
use crate::error::{Error, Result};
use noise::SeatNoise;
use parking_lot::Mutex;
use std::sync::Arc;

/// Mean load per position while seated (raw counts, key order)
const SEATED_PROFILE: [f32; 8] = [640.0, 710.0, 560.0, 590.0, 240.0, 310.0, 180.0, 205.0];

/// Mean level of an unloaded sensor (raw counts). Below the default noise floor.
const IDLE_LEVEL: f32 = 6.0;

/// Ranger target distance while seated (cm)
const SEATED_DISTANCE_CM: f32 = 12.0;

/// Ranger target distance for an empty seat (cm)
const VACANT_DISTANCE_CM: f32 = 85.0;

/// Shared simulation state; all channel handles of one seat point at it
struct SeatSimulation {
    config: SimulationConfig,
    noise: SeatNoise,
    poll: u64,
}

impl SeatSimulation {
    fn occupied(&self) -> bool {
        let period = u64::from(self.config.occupied_cycles + self.config.vacant_cycles);
        if period == 0 {
            return false;
        }
        (self.poll.saturating_sub(1) % period) < u64::from(self.config.occupied_cycles)
    }
}

/// One simulated pressure input
struct SimulatedInput {
    seat: Arc<Mutex<SeatSimulation>>,
    index: usize,
    adc_channel: u8,
}

impl AnalogInput for SimulatedInput {
    fn read_normalized(&mut self) -> Result<f64> {
        let mut seat = self.seat.lock();

        // First channel marks the start of a new poll
        if self.index == 0 {
            seat.poll += 1;
        }

        if seat.config.failing_channels.contains(&self.adc_channel) {
            return Err(Error::Sensor(format!(
                "simulated fault on ADC input {}",
                self.adc_channel
            )));
        }

        let mean = if seat.occupied() {
            SEATED_PROFILE[self.index]
        } else {
            IDLE_LEVEL
        };
        let stddev = seat.config.pressure_stddev;
        let counts = seat.noise.adc_counts(mean, stddev);
        Ok(f64::from(counts) / f64::from(ADC_MAX))
    }
}

/// Simulated ultrasonic ranger
struct SimulatedRanger {
    seat: Arc<Mutex<SeatSimulation>>,
}

impl RangeSensor for SimulatedRanger {
    fn read_meters(&mut self) -> Result<Option<f64>> {
        let mut seat = self.seat.lock();

        // Occasional missed echo, like the real sensor on soft fabric
        if seat.noise.dropout(0.02) {
            return Ok(None);
        }

        let target = if seat.occupied() {
            SEATED_DISTANCE_CM
        } else {
            VACANT_DISTANCE_CM
        };
        let stddev = seat.config.distance_stddev_cm;
        let cm = (target + seat.noise.gaussian(stddev)).max(0.0);
        Ok(Some(f64::from(cm) / 100.0))
    }
}

/// Build a simulated seat from device configuration
pub fn open(config: &DeviceConfig) -> Result<SensorHandles> {
    let sim = config.simulation.clone().unwrap_or_default();
    log::info!(
        "Simulated seat: {} polls seated / {} polls vacant, seed {}",
        sim.occupied_cycles,
        sim.vacant_cycles,
        sim.random_seed
    );

    let distance_absent = sim.distance_absent;
    let seat = Arc::new(Mutex::new(SeatSimulation {
        noise: SeatNoise::new(sim.random_seed),
        config: sim,
        poll: 0,
    }));

    let channels = config
        .channels
        .iter()
        .enumerate()
        .map(|(index, &adc_channel)| {
            Box::new(SimulatedInput {
                seat: Arc::clone(&seat),
                index,
                adc_channel,
            }) as Box<dyn AnalogInput>
        })
        .collect();

    let ranger = if distance_absent {
        log::warn!("Simulated ranger disabled (distance_absent = true)");
        None
    } else {
        Some(Box::new(SimulatedRanger { seat }) as Box<dyn RangeSensor>)
    };

    Ok(SensorHandles { channels, ranger })
}

/// Analog input that always returns the same level
pub struct FixedInput {
    level: f64,
}

impl FixedInput {
    /// Input reading `counts` raw ADC counts
    pub fn counts(counts: u16) -> Self {
        Self {
            level: f64::from(counts) / f64::from(ADC_MAX),
        }
    }

    pub fn normalized(level: f64) -> Self {
        Self { level }
    }
}

impl AnalogInput for FixedInput {
    fn read_normalized(&mut self) -> Result<f64> {
        Ok(self.level)
    }
}

/// Analog input whose every read fails
pub struct FailingInput;

impl AnalogInput for FailingInput {
    fn read_normalized(&mut self) -> Result<f64> {
        Err(Error::Sensor("input not responding".to_string()))
    }
}

/// Ranger that always reports the same measurement
pub struct FixedRanger {
    meters: Option<f64>,
}

impl FixedRanger {
    pub fn meters(meters: f64) -> Self {
        Self {
            meters: Some(meters),
        }
    }

    /// Ranger that answers without an echo
    pub fn no_echo() -> Self {
        Self { meters: None }
    }
}

impl RangeSensor for FixedRanger {
    fn read_meters(&mut self) -> Result<Option<f64>> {
        Ok(self.meters)
    }
}

/// Ranger whose every read fails
pub struct FailingRanger;

impl RangeSensor for FailingRanger {
    fn read_meters(&mut self) -> Result<Option<f64>> {
        Err(Error::Sensor("echo timeout".to_string()))
    }
}

/// Handles for eight fixed channels reading the given raw counts
pub fn fixed_handles(counts: [u16; 8], ranger: Option<Box<dyn RangeSensor>>) -> SensorHandles {
    SensorHandles {
        channels: counts
            .into_iter()
            .map(|c| Box::new(FixedInput::counts(c)) as Box<dyn AnalogInput>)
            .collect(),
        ranger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sim_device(sim: SimulationConfig) -> DeviceConfig {
        DeviceConfig {
            device_type: "mock".to_string(),
            simulation: Some(sim),
            ..DeviceConfig::default()
        }
    }

    fn poll_counts(handles: &mut SensorHandles) -> Vec<Result<u16>> {
        handles
            .channels
            .iter_mut()
            .map(|ch| ch.read_normalized().map(|v| (v * 1023.0).round() as u16))
            .collect()
    }

    #[test]
    fn test_seated_then_vacant_pattern() {
        let mut handles = open(&sim_device(SimulationConfig {
            occupied_cycles: 2,
            vacant_cycles: 1,
            pressure_stddev: 0.0,
            distance_stddev_cm: 0.0,
            ..SimulationConfig::default()
        }))
        .unwrap();

        // Poll 1 and 2 seated, poll 3 vacant
        let first = poll_counts(&mut handles);
        assert_eq!(*first[1].as_ref().unwrap(), 710);
        let _second = poll_counts(&mut handles);
        let third = poll_counts(&mut handles);
        assert!(third.iter().all(|r| *r.as_ref().unwrap() == 6));
    }

    #[test]
    fn test_failing_channel_and_absent_ranger() {
        let mut handles = open(&sim_device(SimulationConfig {
            failing_channels: vec![5],
            distance_absent: true,
            ..SimulationConfig::default()
        }))
        .unwrap();

        assert!(handles.ranger.is_none());
        let counts = poll_counts(&mut handles);
        assert!(counts[5].is_err());
        assert!(counts[4].is_ok());
    }

    #[test]
    fn test_fixed_handles() {
        let mut handles = fixed_handles(
            [0, 1023, 0, 0, 0, 0, 0, 0],
            Some(Box::new(FixedRanger::meters(0.18))),
        );
        assert_eq!(handles.channels[1].read_normalized().unwrap(), 1.0);
        let ranger = handles.ranger.as_mut().unwrap();
        assert_eq!(ranger.read_meters().unwrap(), Some(0.18));
        assert!(FailingRanger.read_meters().is_err());
        assert!(FailingInput.read_normalized().is_err());
    }
}

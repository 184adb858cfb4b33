//! Sensor backend implementations

pub mod iio;
#[cfg(feature = "mock")]
pub mod mock;

use crate::config::DeviceConfig;
use crate::core::sensor::SensorHandles;
use crate::error::{Error, Result};

/// Open the sensor handles for the configured backend.
///
/// Handles are acquired once here and owned by the caller until shutdown.
pub fn open_sensors(config: &DeviceConfig) -> Result<SensorHandles> {
    match config.device_type.as_str() {
        "iio" => iio::open(config),
        #[cfg(feature = "mock")]
        "mock" => mock::open(config),
        other => Err(Error::Config(format!("unknown device type '{}'", other))),
    }
}

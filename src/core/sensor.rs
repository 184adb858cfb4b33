//! Sensor traits implemented by device backends

use crate::error::Result;

/// One analog pressure input
pub trait AnalogInput: Send {
    /// Read the current level normalized to [0.0, 1.0]
    fn read_normalized(&mut self) -> Result<f64>;
}

/// Ultrasonic (or any time-of-flight) ranger
pub trait RangeSensor: Send {
    /// Read the distance to the nearest object in meters.
    ///
    /// `Ok(None)` means the sensor answered without a valid echo.
    fn read_meters(&mut self) -> Result<Option<f64>>;
}

/// Hardware handles opened by a device backend at startup
pub struct SensorHandles {
    /// Pressure inputs in key order
    pub channels: Vec<Box<dyn AnalogInput>>,
    /// `None` when the ranger could not be opened
    pub ranger: Option<Box<dyn RangeSensor>>,
}

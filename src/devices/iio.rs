//! Linux Industrial I/O (IIO) sysfs backend
//!
//! Both seat sensors have mainline kernel drivers that publish their readings
//! through sysfs, so no SPI or GPIO bit-banging is needed in user space:
//!
//! | Sensor | Kernel driver | Attribute | Unit |
//! |--------|---------------|-----------|------|
//! | MCP3008 ADC | `mcp320x` | `in_voltage<N>_raw` | 10-bit counts |
//! | HC-SR04 ranger | `srf04` | `in_distance_raw` | millimeters |
//!
//! Enable both with device tree overlays, for example on a Raspberry Pi:
//!
//! ```text
//! dtoverlay=mcp3008:spi0-0-present
//! dtoverlay=hcsr04,trig-gpio=16,echo-gpio=18
//! ```

use crate::config::DeviceConfig;
use crate::core::sensor::{AnalogInput, RangeSensor, SensorHandles};
use crate::core::types::ADC_MAX;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One MCP3008 input read through `in_voltage<N>_raw`
pub struct IioAdcChannel {
    path: PathBuf,
}

impl IioAdcChannel {
    pub fn new(adc_dir: &Path, channel: u8) -> Self {
        Self {
            path: adc_dir.join(format!("in_voltage{}_raw", channel)),
        }
    }
}

impl AnalogInput for IioAdcChannel {
    fn read_normalized(&mut self) -> Result<f64> {
        let raw = read_attribute(&self.path)?
            .ok_or_else(|| Error::Sensor(format!("{}: empty reading", self.path.display())))?;
        let counts: u16 = raw.parse().map_err(|_| {
            Error::Sensor(format!("{}: invalid value '{}'", self.path.display(), raw))
        })?;
        Ok(f64::from(counts.min(ADC_MAX)) / f64::from(ADC_MAX))
    }
}

/// Ultrasonic ranger read through `in_distance_raw`
pub struct IioRanger {
    path: PathBuf,
}

impl IioRanger {
    /// Open the ranger, or `None` when its device directory is missing
    pub fn open(distance_dir: &Path) -> Option<Self> {
        let path = distance_dir.join("in_distance_raw");
        if path.exists() {
            Some(Self { path })
        } else {
            None
        }
    }
}

impl RangeSensor for IioRanger {
    fn read_meters(&mut self) -> Result<Option<f64>> {
        let Some(raw) = read_attribute(&self.path)? else {
            return Ok(None);
        };
        let millimeters: f64 = raw.parse().map_err(|_| {
            Error::Sensor(format!("{}: invalid value '{}'", self.path.display(), raw))
        })?;
        Ok(Some(millimeters / 1000.0))
    }
}

/// Read a sysfs attribute, `None` when it is empty
fn read_attribute(path: &Path) -> Result<Option<String>> {
    let contents = fs::read_to_string(path)?;
    let value = contents.trim();
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(value.to_string()))
    }
}

/// Open all seat sensors from their IIO directories
pub fn open(config: &DeviceConfig) -> Result<SensorHandles> {
    let adc_dir = Path::new(&config.adc_dir);
    if !adc_dir.is_dir() {
        // Channels still get created; each read fails and reports 0
        log::warn!(
            "ADC directory {} not found, pressure channels will read 0",
            adc_dir.display()
        );
    }

    let channels: Vec<Box<dyn AnalogInput>> = config
        .channels
        .iter()
        .map(|&ch| Box::new(IioAdcChannel::new(adc_dir, ch)) as Box<dyn AnalogInput>)
        .collect();

    let ranger = IioRanger::open(Path::new(&config.distance_dir));
    match &ranger {
        Some(_) => log::info!("Ultrasonic ranger found at {}", config.distance_dir),
        None => log::warn!(
            "Ultrasonic ranger not found at {}, occupancy will report not seated",
            config.distance_dir
        ),
    }

    Ok(SensorHandles {
        channels,
        ranger: ranger.map(|r| Box::new(r) as Box<dyn RangeSensor>),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tempfile::TempDir;

    #[test]
    fn test_adc_channel_normalizes_raw_counts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("in_voltage3_raw"), "1023\n").unwrap();
        fs::write(dir.path().join("in_voltage4_raw"), "0\n").unwrap();

        let mut full = IioAdcChannel::new(dir.path(), 3);
        assert_relative_eq!(full.read_normalized().unwrap(), 1.0);

        let mut empty = IioAdcChannel::new(dir.path(), 4);
        assert_relative_eq!(empty.read_normalized().unwrap(), 0.0);
    }

    #[test]
    fn test_adc_channel_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("in_voltage0_raw"), "garbage").unwrap();

        let mut bad = IioAdcChannel::new(dir.path(), 0);
        assert!(matches!(bad.read_normalized(), Err(Error::Sensor(_))));

        let mut missing = IioAdcChannel::new(dir.path(), 7);
        assert!(matches!(missing.read_normalized(), Err(Error::Io(_))));
    }

    #[test]
    fn test_ranger_reads_millimeters() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("in_distance_raw"), "180\n").unwrap();

        let mut ranger = IioRanger::open(dir.path()).unwrap();
        assert_relative_eq!(ranger.read_meters().unwrap().unwrap(), 0.18, epsilon = 1e-12);

        fs::write(dir.path().join("in_distance_raw"), "\n").unwrap();
        assert_eq!(ranger.read_meters().unwrap(), None);
    }

    #[test]
    fn test_missing_ranger_is_absent() {
        let dir = TempDir::new().unwrap();
        assert!(IioRanger::open(&dir.path().join("iio:device9")).is_none());
    }

    #[test]
    fn test_open_builds_eight_channels() {
        let dir = TempDir::new().unwrap();
        let config = DeviceConfig {
            adc_dir: dir.path().to_string_lossy().into_owned(),
            distance_dir: dir.path().join("nope").to_string_lossy().into_owned(),
            ..DeviceConfig::default()
        };
        let handles = open(&config).unwrap();
        assert_eq!(handles.channels.len(), 8);
        assert!(handles.ranger.is_none());
    }
}

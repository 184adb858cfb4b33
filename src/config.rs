//! Configuration for AasanaIO
//!
//! Loads configuration from a TOML file. Every section has defaults, so a
//! partial file (or no file at all) yields a working setup that streams to a
//! collector on localhost.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Number of pressure channels on the seat (MCP3008 has exactly 8 inputs)
pub const PRESSURE_CHANNEL_COUNT: usize = 8;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub collector: CollectorConfig,
    pub streaming: StreamingConfig,
    pub thresholds: ThresholdConfig,
    pub device: DeviceConfig,
    pub logging: LoggingConfig,
}

/// Collector endpoint and reconnect policy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// WebSocket URL of the collector (e.g. `ws://10.0.20.179:8080`)
    pub url: String,

    /// Fixed delay between a lost connection and the next connect attempt.
    ///
    /// Retry is unbounded and the delay never grows. There is no circuit
    /// breaker: the device keeps trying until it is shut down.
    pub reconnect_delay_ms: u64,

    /// Upper bound on how long the supervisor blocks waiting for a
    /// connection event before re-checking loop and shutdown state
    pub poll_interval_ms: u64,
}

impl CollectorConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080".to_string(),
            reconnect_delay_ms: 3000,
            poll_interval_ms: 200,
        }
    }
}

/// Streaming loop cadence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Time between the starts of two consecutive cycles
    pub cycle_interval_ms: u64,
    /// Pause between the occupancy and the pressure send of one cycle
    pub inter_send_delay_ms: u64,
}

impl StreamingConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn inter_send_delay(&self) -> Duration {
        Duration::from_millis(self.inter_send_delay_ms)
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 5000,
            inter_send_delay_ms: 50,
        }
    }
}

/// Denoising and occupancy thresholds
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Raw pressure values strictly below this are reported as 0
    pub noise_floor: u16,
    /// Distances strictly below this (cm) count as seated
    pub seat_threshold_cm: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            noise_floor: 20,
            seat_threshold_cm: 20.0,
        }
    }
}

/// Sensor hardware configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Backend: `iio` (Linux Industrial I/O sysfs) or `mock`
    #[serde(rename = "type")]
    pub device_type: String,

    /// IIO device directory of the MCP3008 ADC
    pub adc_dir: String,

    /// IIO device directory of the ultrasonic ranger (srf04 driver).
    /// A missing directory means the sensor is absent.
    pub distance_dir: String,

    /// ADC input index for each pressure key, in key order
    pub channels: Vec<u8>,

    /// Ranger maximum; longer measurements are clamped to this
    pub max_distance_m: f64,

    /// Simulation parameters (only read when `type = "mock"`)
    pub simulation: Option<SimulationConfig>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_type: "iio".to_string(),
            adc_dir: "/sys/bus/iio/devices/iio:device0".to_string(),
            distance_dir: "/sys/bus/iio/devices/iio:device1".to_string(),
            channels: (0..PRESSURE_CHANNEL_COUNT as u8).collect(),
            max_distance_m: 2.0,
            simulation: None,
        }
    }
}

/// Mock seat simulation parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// 0 = random each run
    pub random_seed: u64,
    /// Consecutive polls with someone seated
    pub occupied_cycles: u32,
    /// Consecutive polls with the seat empty
    pub vacant_cycles: u32,
    /// Gaussian noise on every pressure channel (raw ADC counts)
    pub pressure_stddev: f32,
    /// Gaussian noise on the distance reading (cm)
    pub distance_stddev_cm: f32,
    /// Simulate a missing ranger
    pub distance_absent: bool,
    /// ADC inputs that always fail to read
    pub failing_channels: Vec<u8>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            random_seed: 42,
            occupied_cycles: 6,
            vacant_cycles: 3,
            pressure_stddev: 4.0,
            distance_stddev_cm: 0.5,
            distance_absent: false,
            failing_channels: Vec::new(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the client cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.collector.url.starts_with("ws://") {
            return Err(Error::Config(format!(
                "collector.url must be a ws:// URL, got '{}'",
                self.collector.url
            )));
        }
        if self.collector.poll_interval_ms == 0 {
            return Err(Error::Config(
                "collector.poll_interval_ms must be > 0".to_string(),
            ));
        }
        if self.streaming.cycle_interval_ms == 0 {
            return Err(Error::Config(
                "streaming.cycle_interval_ms must be > 0".to_string(),
            ));
        }
        if self.device.channels.len() != PRESSURE_CHANNEL_COUNT {
            return Err(Error::Config(format!(
                "device.channels must list exactly {} ADC inputs, got {}",
                PRESSURE_CHANNEL_COUNT,
                self.device.channels.len()
            )));
        }
        if self.device.max_distance_m.is_nan() || self.device.max_distance_m <= 0.0 {
            return Err(Error::Config(
                "device.max_distance_m must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.collector.url, "ws://127.0.0.1:8080");
        assert_eq!(config.collector.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.streaming.cycle_interval(), Duration::from_secs(5));
        assert_eq!(config.streaming.inter_send_delay(), Duration::from_millis(50));
        assert_eq!(config.thresholds.noise_floor, 20);
        assert_eq!(config.thresholds.seat_threshold_cm, 20.0);
        assert_eq!(config.device.channels, vec![0, 1, 2, 3, 4, 5, 6, 7]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[collector]
url = "ws://10.0.20.179:8080"

[device]
type = "mock"

[device.simulation]
random_seed = 7
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.collector.url, "ws://10.0.20.179:8080");
        assert_eq!(config.collector.reconnect_delay_ms, 3000);
        assert_eq!(config.streaming.cycle_interval_ms, 5000);
        assert_eq!(config.device.device_type, "mock");
        let sim = config.device.simulation.unwrap();
        assert_eq!(sim.random_seed, 7);
        assert_eq!(sim.occupied_cycles, 6);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_serialization() {
        let config = Config::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[collector]"));
        assert!(toml_string.contains("[streaming]"));
        assert!(toml_string.contains("[thresholds]"));
        assert!(toml_string.contains("[device]"));
        assert!(toml_string.contains("[logging]"));
        assert!(toml_string.contains("reconnect_delay_ms = 3000"));
        assert!(toml_string.contains("type = \"iio\""));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("aasana.toml");

        let mut config = Config::default();
        config.collector.url = "ws://192.168.1.20:9000".to_string();
        config.streaming.cycle_interval_ms = 1000;
        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.collector.url, "ws://192.168.1.20:9000");
        assert_eq!(loaded.streaming.cycle_interval_ms, 1000);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.collector.url = "http://collector:8080".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.streaming.cycle_interval_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.device.channels = vec![0, 1, 2];
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.device.max_distance_m = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = Config::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}

//! AasanaIO - Seat telemetry client for single-board devices
//!
//! Polls eight analog pressure pads and one ultrasonic ranger, derives an
//! occupancy signal, and streams both to a collector over a WebSocket that is
//! re-established whenever it drops.
//!
//! ## Features
//!
//! - `mock`: Simulated seat and scripted sensor/connection doubles for
//!   hardware-free runs and testing

pub mod acquisition;
pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod processing;
pub mod streaming;
pub mod supervisor;

// Re-export commonly used types
pub use acquisition::SensorAcquisition;
pub use config::Config;
pub use error::{Error, Result};
pub use processing::ReadingProcessor;
pub use supervisor::{ConnectionSupervisor, SupervisorState, SupervisorStats};

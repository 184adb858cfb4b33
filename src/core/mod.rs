//! Core abstractions for sensor backends.
//!
//! - [`sensor::AnalogInput`] / [`sensor::RangeSensor`]: Traits to implement for new hardware
//! - [`types`]: Distance samples, pressure readings and key order

pub mod sensor;
pub mod types;

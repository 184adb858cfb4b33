//! Wire packets sent to the collector.
//!
//! Each cycle emits two JSON text messages sharing one timestamp:
//!
//! ```text
//! {"isSeated":true,"detectedAt":"2026-01-05T14:28:33.123Z"}
//! {"sensors":{"seat_front":0,...,"back_right":0},"timestamp":"2026-01-05T14:28:33.123Z"}
//! ```

use crate::core::types::PressureReading;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `YYYY-MM-DDTHH:MM:SS.mmmZ`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a UTC instant with millisecond precision and a literal `Z`
pub fn format_timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// Occupancy message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyPacket {
    pub is_seated: bool,
    pub detected_at: String,
}

/// Pressure message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressurePacket {
    pub sensors: PressureReading,
    pub timestamp: String,
}

impl OccupancyPacket {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl PressurePacket {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Build both packets of a cycle from one captured instant
pub fn build(
    now: DateTime<Utc>,
    reading: PressureReading,
    is_seated: bool,
) -> (OccupancyPacket, PressurePacket) {
    let stamp = format_timestamp(now);
    (
        OccupancyPacket {
            is_seated,
            detected_at: stamp.clone(),
        },
        PressurePacket {
            sensors: reading,
            timestamp: stamp,
        },
    )
}

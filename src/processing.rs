//! Denoising and occupancy derivation
//!
//! Both operations are total: every raw value and every distance sample maps
//! to a defined output, so a bad sample can never corrupt a packet.

use crate::config::ThresholdConfig;
use crate::core::types::{Distance, PressureReading, RawChannels};

/// Applies the noise floor and the seating threshold to raw samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadingProcessor {
    noise_floor: u16,
    seat_threshold_cm: f64,
}

impl ReadingProcessor {
    pub fn new(thresholds: ThresholdConfig) -> Self {
        Self {
            noise_floor: thresholds.noise_floor,
            seat_threshold_cm: thresholds.seat_threshold_cm,
        }
    }

    /// Clamp values strictly below the noise floor to 0
    #[inline]
    pub fn denoise(&self, raw: u16) -> u16 {
        if raw < self.noise_floor {
            0
        } else {
            raw
        }
    }

    /// Seated iff a distance is available and strictly below the threshold
    #[inline]
    pub fn is_occupied(&self, distance: Distance) -> bool {
        match distance {
            Distance::Centimeters(cm) => cm < self.seat_threshold_cm,
            Distance::Unavailable => false,
        }
    }

    /// Denoise all channels and map them onto the pressure keys
    pub fn process(&self, raw: RawChannels) -> PressureReading {
        PressureReading::from_channels(raw.map(|r| self.denoise(r)))
    }
}

impl Default for ReadingProcessor {
    fn default() -> Self {
        Self::new(ThresholdConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ADC_MAX;

    #[test]
    fn test_denoise_over_full_range() {
        let p = ReadingProcessor::default();
        for r in 0..=ADC_MAX {
            let d = p.denoise(r);
            if r < 20 {
                assert_eq!(d, 0, "raw {} should clamp", r);
            } else {
                assert_eq!(d, r, "raw {} should pass through", r);
            }
            assert!(d <= ADC_MAX);
        }
    }

    #[test]
    fn test_occupancy_thresholds() {
        let p = ReadingProcessor::default();
        assert!(!p.is_occupied(Distance::Unavailable));
        assert!(p.is_occupied(Distance::Centimeters(0.0)));
        assert!(p.is_occupied(Distance::Centimeters(19.999)));
        assert!(!p.is_occupied(Distance::Centimeters(20.0)));
        assert!(!p.is_occupied(Distance::Centimeters(150.0)));
    }

    #[test]
    fn test_occupancy_from_meters() {
        let p = ReadingProcessor::default();
        assert!(p.is_occupied(Distance::from_meters(0.18, 2.0)));
        assert!(!p.is_occupied(Distance::from_meters(0.25, 2.0)));
    }

    #[test]
    fn test_process_maps_keys_in_order() {
        let p = ReadingProcessor::default();
        let reading = p.process([5, 25, 0, 1023, 19, 20, 300, 7]);
        assert_eq!(reading.to_channels(), [0, 25, 0, 1023, 0, 20, 300, 0]);
        assert_eq!(reading.seat_front, 0);
        assert_eq!(reading.seat_back, 25);
        assert_eq!(reading.seat_right, 1023);
        assert_eq!(reading.back_back, 20);
        assert_eq!(reading.back_left, 300);
    }

    #[test]
    fn test_custom_thresholds() {
        let p = ReadingProcessor::new(ThresholdConfig {
            noise_floor: 50,
            seat_threshold_cm: 35.0,
        });
        assert_eq!(p.denoise(49), 0);
        assert_eq!(p.denoise(50), 50);
        assert!(p.is_occupied(Distance::Centimeters(30.0)));
    }
}

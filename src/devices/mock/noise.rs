//! Seeded noise for simulated seat sensors

use crate::core::types::ADC_MAX;
use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::{Normal, StandardNormal};

/// Noise source shared by all simulated channels of one seat.
///
/// Seed 0 draws from OS entropy; any other seed replays the same sequence.
pub struct SeatNoise {
    rng: SmallRng,
}

impl SeatNoise {
    pub fn new(seed: u64) -> Self {
        let rng = match seed {
            0 => SmallRng::from_entropy(),
            s => SmallRng::seed_from_u64(s),
        };
        Self { rng }
    }

    /// Zero-mean Gaussian sample
    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev <= 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// Noisy ADC level around `mean` counts, clipped to the converter range
    pub fn adc_counts(&mut self, mean: f32, stddev: f32) -> u16 {
        let level = match Normal::new(mean, stddev.max(0.0)) {
            Ok(dist) => dist.sample(&mut self.rng),
            Err(_) => mean,
        };
        level.round().clamp(0.0, f32::from(ADC_MAX)) as u16
    }

    /// Returns true with given probability (missed echoes, flaky wiring)
    #[inline]
    pub fn dropout(&mut self, probability: f32) -> bool {
        self.rng.gen::<f32>() < probability
    }
}

//! Energy-based PSS detection threshold
//!
//! threshold[n] = max(min_threshold, scale * sum_{k=0}^{N-1} |x[n-k]|^2)

use crate::config::SsbDetectorConfig;
use num_complex::Complex32;

/// Moving-sum energy estimator producing one threshold per sample
#[derive(Debug, Clone)]
pub struct EnergyThreshold {
    /// |x|^2 of the last `window_length` samples
    powers: Vec<f32>,
    pos: usize,
    sum: f64,
    scale: f32,
    min_threshold: f32,
}

impl EnergyThreshold {
    /// Create an estimator over `window_length` samples
    pub fn new(window_length: usize, scale: f32, min_threshold: f32) -> Self {
        Self {
            powers: vec![0.0; window_length.max(1)],
            pos: 0,
            sum: 0.0,
            scale,
            min_threshold,
        }
    }

    /// Estimator matching the detector configuration (window of one FFT)
    pub fn from_config(config: &SsbDetectorConfig) -> Self {
        Self::new(config.fft_size, config.threshold_scale(), config.min_threshold)
    }

    /// Consume one sample and return the threshold for it
    pub fn process(&mut self, sample: Complex32) -> f32 {
        self.process_power(sample.norm_sqr())
    }

    /// Consume one instantaneous power value and return the threshold for it
    pub fn process_power(&mut self, power: f32) -> f32 {
        let leaving = std::mem::replace(&mut self.powers[self.pos], power);
        self.sum += power as f64 - leaving as f64;
        self.pos += 1;

        if self.pos == self.powers.len() {
            self.pos = 0;
            // Re-anchor once per window so rounding cannot accumulate
            self.sum = self.powers.iter().map(|&p| p as f64).sum();
        }
        self.sum = self.sum.max(0.0);

        self.threshold()
    }

    /// Current window energy
    pub fn energy(&self) -> f32 {
        self.sum as f32
    }

    /// Threshold for the most recent sample
    pub fn threshold(&self) -> f32 {
        (self.energy() * self.scale).max(self.min_threshold)
    }

    /// Reset to an empty window
    pub fn reset(&mut self) {
        self.powers.fill(0.0);
        self.pos = 0;
        self.sum = 0.0;
    }
}

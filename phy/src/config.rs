//! SSB Detector Configuration
//!
//! Construction-time constants of the detection pipeline. Everything here is
//! validated once; components never correct a bad value silently.

use crate::resampler::design_halfband;
use crate::{PhyError, SSB_SUBCARRIERS, SSB_SYMBOLS};
use common::types::SubcarrierSpacing;
use common::utils::db_to_power;
use tracing::debug;

/// FFT sizes the demodulator supports
pub const SUPPORTED_FFT_SIZES: [usize; 4] = [256, 512, 1024, 2048];

/// Default halfband decimator length (4k + 3 taps)
pub const DEFAULT_HALFBAND_LENGTH: usize = 47;

/// Normal cyclic prefix length for an `fft_size`-point grid (144 of 2048)
pub fn normal_cp_length(fft_size: usize) -> usize {
    fft_size * 144 / 2048
}

/// Detector configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SsbDetectorConfig {
    /// SSB subcarrier spacing; 15 kHz input is decimated by two
    pub scs: SubcarrierSpacing,
    /// DFT size at the correlator rate
    pub fft_size: usize,
    /// Cyclic prefix length of the SSB symbols at the correlator rate
    pub cp_length: usize,
    /// Peak picker window length (odd)
    pub window_length: usize,
    /// PSS detection threshold relative to window energy, in dB
    pub threshold_db: f32,
    /// Lower bound of the detection threshold
    pub min_threshold: f32,
    /// Halfband decimator coefficients, used at 15 kHz only
    pub halfband_taps: Vec<f32>,
}

impl Default for SsbDetectorConfig {
    fn default() -> Self {
        Self {
            scs: SubcarrierSpacing::Scs30,
            fft_size: 256,
            cp_length: normal_cp_length(256),
            window_length: 11,
            threshold_db: -6.0,
            min_threshold: 1e-9,
            halfband_taps: design_halfband(DEFAULT_HALFBAND_LENGTH),
        }
    }
}

impl SsbDetectorConfig {
    /// Default configuration for the given subcarrier spacing
    pub fn for_scs(scs: SubcarrierSpacing) -> Self {
        Self {
            scs,
            ..Self::default()
        }
    }

    /// Reject parameters the pipeline cannot honour
    pub fn validate(&self) -> Result<(), PhyError> {
        if !SUPPORTED_FFT_SIZES.contains(&self.fft_size) {
            return Err(PhyError::InvalidConfiguration(format!(
                "FFT size {} not supported, expected one of {:?}",
                self.fft_size, SUPPORTED_FFT_SIZES
            )));
        }
        if self.fft_size < SSB_SUBCARRIERS {
            return Err(PhyError::InvalidConfiguration(format!(
                "FFT size {} cannot hold {} SSB subcarriers",
                self.fft_size, SSB_SUBCARRIERS
            )));
        }
        if self.cp_length == 0 || self.cp_length >= self.fft_size {
            return Err(PhyError::InvalidConfiguration(format!(
                "Cyclic prefix length {} out of range for FFT size {}",
                self.cp_length, self.fft_size
            )));
        }
        if self.window_length == 0 || self.window_length % 2 == 0 {
            return Err(PhyError::InvalidConfiguration(format!(
                "Peak window length must be odd, got {}",
                self.window_length
            )));
        }
        if !self.threshold_db.is_finite() || self.threshold_db > 0.0 {
            return Err(PhyError::InvalidConfiguration(format!(
                "PSS threshold must be a finite value <= 0 dB, got {}",
                self.threshold_db
            )));
        }
        if !self.min_threshold.is_finite() || self.min_threshold <= 0.0 {
            return Err(PhyError::InvalidConfiguration(format!(
                "Minimum threshold must be positive, got {}",
                self.min_threshold
            )));
        }
        if self.scs == SubcarrierSpacing::Scs15 {
            let taps = self.halfband_taps.len();
            if taps % 4 != 3 {
                return Err(PhyError::InvalidConfiguration(format!(
                    "Halfband filter needs 4k+3 taps, got {}",
                    taps
                )));
            }
            if self.halfband_taps.iter().any(|t| !t.is_finite()) {
                return Err(PhyError::InvalidConfiguration(
                    "Halfband filter has non-finite coefficients".to_string(),
                ));
            }
        }

        debug!("Validated detector config: scs={} kHz, nfft={}, cp={}, window={}, threshold={} dB",
               self.scs.khz(), self.fft_size, self.cp_length, self.window_length, self.threshold_db);
        Ok(())
    }

    /// Linear threshold scaling factor applied to the window energy
    pub fn threshold_scale(&self) -> f32 {
        db_to_power(self.threshold_db)
    }

    /// Samples in one OFDM symbol including the cyclic prefix
    pub fn symbol_length(&self) -> usize {
        self.fft_size + self.cp_length
    }

    /// Samples spanned by the four SSB symbols
    pub fn ssb_length(&self) -> usize {
        SSB_SYMBOLS * self.symbol_length()
    }

    /// Distance from the SSB start to the last sample of the PSS symbol
    pub fn peak_offset(&self) -> usize {
        self.symbol_length() - 1
    }

    /// Sample rate seen by the correlators
    pub fn correlator_sample_rate(&self) -> f64 {
        self.scs.sample_rate(self.fft_size)
    }

    /// Sample rate expected at the receiver input
    pub fn input_sample_rate(&self) -> f64 {
        match self.scs {
            SubcarrierSpacing::Scs15 => 2.0 * self.correlator_sample_rate(),
            SubcarrierSpacing::Scs30 => self.correlator_sample_rate(),
        }
    }

    /// Map a correlator-rate index back to the input stream.
    ///
    /// At 15 kHz the halfband decimator's group delay is removed and the
    /// index doubled; `None` inside that delay.
    pub fn input_index(&self, index: usize) -> Option<usize> {
        match self.scs {
            SubcarrierSpacing::Scs15 => {
                let delay = self.halfband_taps.len().saturating_sub(3) / 4;
                index.checked_sub(delay).map(|i| 2 * i)
            }
            SubcarrierSpacing::Scs30 => Some(index),
        }
    }
}

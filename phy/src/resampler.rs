//! Sample Rate Adapter for the SSB search
//!
//! The receiver front end always delivers 7.68 Msps. With 15 kHz SSB
//! subcarrier spacing the 256-point grid runs at 3.84 Msps, so the stream is
//! decimated by two with a halfband FIR. At 30 kHz the samples pass through.

use crate::config::SsbDetectorConfig;
use crate::correlator::DelayLine;
use crate::PhyError;
use common::types::SubcarrierSpacing;
use num_complex::Complex32;
use std::f32::consts::PI;
use tracing::{debug, info};

/// Design a halfband lowpass (cutoff at a quarter of the sample rate).
///
/// Windowed sinc with a Hamming window. `num_taps` should be of the form
/// 4k + 3 so that both end taps are non-zero. Every tap at an even, non-zero
/// distance from the centre is exactly zero and the DC gain is one.
pub fn design_halfband(num_taps: usize) -> Vec<f32> {
    if num_taps == 0 {
        return Vec::new();
    }

    let center = (num_taps - 1) / 2;
    let mut taps = vec![0.0f32; num_taps];

    for (i, tap) in taps.iter_mut().enumerate() {
        let n = i as isize - center as isize;

        let sinc = if n == 0 {
            0.5
        } else if n % 2 == 0 {
            0.0
        } else {
            (PI * n as f32 / 2.0).sin() / (PI * n as f32)
        };

        let window = if num_taps > 1 {
            0.54 - 0.46 * (2.0 * PI * i as f32 / (num_taps - 1) as f32).cos()
        } else {
            1.0
        };

        *tap = sinc * window;
    }

    // Normalize filter
    let sum: f32 = taps.iter().sum();
    for tap in &mut taps {
        *tap /= sum;
    }

    taps
}

/// Halfband FIR decimator by two
#[derive(Debug, Clone)]
pub struct HalfbandDecimator {
    taps: Vec<f32>,
    delay_line: DelayLine,
    /// True when the next input sample produces an output
    emit_next: bool,
}

impl HalfbandDecimator {
    /// Create a decimator from halfband coefficients (4k + 3 taps)
    pub fn new(taps: Vec<f32>) -> Result<Self, PhyError> {
        if taps.len() % 4 != 3 {
            return Err(PhyError::InvalidConfiguration(format!(
                "Halfband filter needs 4k+3 taps, got {}", taps.len()
            )));
        }

        debug!("Halfband decimator: {} taps, group delay {} output samples",
               taps.len(), (taps.len() - 3) / 4);

        Ok(Self {
            delay_line: DelayLine::new(taps.len()),
            taps,
            emit_next: false,
        })
    }

    /// Output delay of the decimated stream in output samples.
    ///
    /// Outputs are taken on odd input indices, which turns the odd input
    /// group delay of a 4k + 3 tap filter into a whole number of outputs.
    pub fn group_delay(&self) -> usize {
        (self.taps.len() - 3) / 4
    }

    /// Filter and decimate a block, appending to `output`
    pub fn process(&mut self, input: &[Complex32], output: &mut Vec<Complex32>) {
        output.reserve(input.len() / 2 + 1);

        for &sample in input {
            self.delay_line.push(sample);

            if self.emit_next {
                let window = self.delay_line.window();
                let mut acc = Complex32::new(0.0, 0.0);
                for (&tap, &x) in self.taps.iter().zip(window.iter().rev()) {
                    if tap != 0.0 {
                        acc += x * tap;
                    }
                }
                output.push(acc);
            }
            self.emit_next = !self.emit_next;
        }
    }

    /// Reset the filter state
    pub fn reset(&mut self) {
        self.delay_line.clear();
        self.emit_next = false;
    }
}

/// Input stage of the receiver, selected by the SSB subcarrier spacing
#[derive(Debug, Clone)]
pub enum SampleRateAdapter {
    /// 30 kHz: the input rate already matches the correlators
    Passthrough,
    /// 15 kHz: halfband decimation 7.68 -> 3.84 Msps
    Halfband(HalfbandDecimator),
}

impl SampleRateAdapter {
    /// Build the adapter for a validated configuration
    pub fn new(config: &SsbDetectorConfig) -> Result<Self, PhyError> {
        let adapter = match config.scs {
            SubcarrierSpacing::Scs15 => {
                Self::Halfband(HalfbandDecimator::new(config.halfband_taps.clone())?)
            }
            SubcarrierSpacing::Scs30 => Self::Passthrough,
        };

        info!("Sample rate adapter: {:.2} Msps -> {:.2} Msps",
              config.input_sample_rate() / 1e6, config.correlator_sample_rate() / 1e6);

        Ok(adapter)
    }

    /// Convert a block of input samples, appending to `output`
    pub fn process(&mut self, input: &[Complex32], output: &mut Vec<Complex32>) {
        match self {
            Self::Passthrough => output.extend_from_slice(input),
            Self::Halfband(decimator) => decimator.process(input, output),
        }
    }

    /// Delay introduced by the adapter in output samples
    pub fn group_delay(&self) -> usize {
        match self {
            Self::Passthrough => 0,
            Self::Halfband(decimator) => decimator.group_delay(),
        }
    }

    /// Map an output index back to the input stream, delay removed.
    ///
    /// `None` for outputs inside the decimator's start-up delay.
    pub fn input_index(&self, index: usize) -> Option<usize> {
        match self {
            Self::Passthrough => Some(index),
            Self::Halfband(decimator) => index.checked_sub(decimator.group_delay()).map(|i| 2 * i),
        }
    }

    /// Reset the adapter state
    pub fn reset(&mut self) {
        if let Self::Halfband(decimator) = self {
            decimator.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halfband_structure() {
        let taps = design_halfband(47);
        let center = 23;

        assert!((taps.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((taps[center] - 0.5).abs() < 0.01);
        for (i, &tap) in taps.iter().enumerate() {
            let offset = i as isize - center as isize;
            if offset != 0 && offset % 2 == 0 {
                assert_eq!(tap, 0.0, "tap {} should vanish", i);
            }
            // Linear phase
            assert!((tap - taps[taps.len() - 1 - i]).abs() < 1e-6);
        }
        assert!(taps[0] != 0.0);
    }

    #[test]
    fn test_decimator_rejects_bad_length() {
        assert!(HalfbandDecimator::new(vec![0.0; 45]).is_err());
        assert!(HalfbandDecimator::new(design_halfband(47)).is_ok());
    }

    #[test]
    fn test_decimator_output_length() {
        let mut decimator = HalfbandDecimator::new(design_halfband(23)).unwrap();
        let mut output = Vec::new();

        decimator.process(&vec![Complex32::new(1.0, 0.0); 101], &mut output);
        assert_eq!(output.len(), 50);

        // Phase carries across blocks
        decimator.process(&vec![Complex32::new(1.0, 0.0); 1], &mut output);
        assert_eq!(output.len(), 51);
    }

    #[test]
    fn test_decimator_dc_passthrough() {
        let mut decimator = HalfbandDecimator::new(design_halfband(47)).unwrap();
        let mut output = Vec::new();
        decimator.process(&vec![Complex32::new(1.0, -0.5); 512], &mut output);

        for sample in &output[30..] {
            assert!((sample.re - 1.0).abs() < 1e-4, "DC not preserved: {}", sample);
            assert!((sample.im + 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn test_decimator_rejects_upper_band() {
        let mut decimator = HalfbandDecimator::new(design_halfband(47)).unwrap();
        let tone: Vec<Complex32> = (0..2048)
            .map(|n| Complex32::from_polar(1.0, 2.0 * PI * 0.4 * n as f32))
            .collect();

        let mut output = Vec::new();
        decimator.process(&tone, &mut output);

        let settled = &output[50..];
        let power = settled.iter().map(|s| s.norm_sqr()).sum::<f32>() / settled.len() as f32;
        assert!(power < 1e-3, "stopband leakage {}", power);
    }

    #[test]
    fn test_decimator_delay() {
        let taps = design_halfband(47);
        let mut decimator = HalfbandDecimator::new(taps).unwrap();
        assert_eq!(decimator.group_delay(), 11);

        // A slow ramp comes out delayed by the group delay
        let input: Vec<Complex32> = (0..400).map(|n| Complex32::new(n as f32 * 0.01, 0.0)).collect();
        let mut output = Vec::new();
        decimator.process(&input, &mut output);

        for m in 40..output.len() {
            let expected = 2.0 * (m - 11) as f32 * 0.01;
            assert!((output[m].re - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn test_adapter_passthrough() {
        let config = SsbDetectorConfig::default();
        let mut adapter = SampleRateAdapter::new(&config).unwrap();
        let input = vec![Complex32::new(0.25, 0.75); 10];
        let mut output = Vec::new();
        adapter.process(&input, &mut output);

        assert_eq!(output, input);
        assert_eq!(adapter.group_delay(), 0);
        assert_eq!(adapter.input_index(7), Some(7));
    }

    #[test]
    fn test_adapter_input_index() {
        let config = SsbDetectorConfig::for_scs(SubcarrierSpacing::Scs15);
        let adapter = SampleRateAdapter::new(&config).unwrap();
        assert_eq!(adapter.group_delay(), 11);
        assert_eq!(adapter.input_index(511), Some(1000));
        assert_eq!(adapter.input_index(11), Some(0));
        assert_eq!(adapter.input_index(10), None);
    }

    #[test]
    fn test_reset_restores_phase() {
        let mut decimator = HalfbandDecimator::new(design_halfband(47)).unwrap();
        let input: Vec<Complex32> = (0..64).map(|n| Complex32::new(n as f32, 1.0)).collect();

        let mut first = Vec::new();
        decimator.process(&input, &mut first);
        decimator.process(&input[..3], &mut Vec::new());
        decimator.reset();

        let mut second = Vec::new();
        decimator.process(&input, &mut second);
        assert_eq!(first, second);
    }
}

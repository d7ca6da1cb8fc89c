//! PSS matched filter correlators
//!
//! Direct-form FIR correlation of the input stream against the three PSS
//! kernels: output[n] = sum_k kernel[k] * input[n - k], zero initial state.

use crate::pss::PssReference;
use common::types::Nid2;
use num_complex::Complex32;
use std::sync::Arc;

/// Tapped delay line holding the most recent samples.
///
/// Samples are stored twice so the current window is always one contiguous
/// slice, oldest sample first.
#[derive(Debug, Clone)]
pub(crate) struct DelayLine {
    buffer: Vec<Complex32>,
    pos: usize,
    len: usize,
}

impl DelayLine {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            buffer: vec![Complex32::new(0.0, 0.0); 2 * len],
            pos: 0,
            len,
        }
    }

    pub(crate) fn push(&mut self, sample: Complex32) {
        if self.len == 0 {
            return;
        }
        self.buffer[self.pos] = sample;
        self.buffer[self.pos + self.len] = sample;
        self.pos = (self.pos + 1) % self.len;
    }

    /// The last `len` samples, oldest first
    pub(crate) fn window(&self) -> &[Complex32] {
        &self.buffer[self.pos..self.pos + self.len]
    }

    pub(crate) fn clear(&mut self) {
        self.buffer.fill(Complex32::new(0.0, 0.0));
        self.pos = 0;
    }
}

/// FIR output for a window ordered oldest first
fn fir_output(taps: &[Complex32], window: &[Complex32]) -> Complex32 {
    taps.iter()
        .zip(window.iter().rev())
        .fold(Complex32::new(0.0, 0.0), |acc, (&h, &x)| acc + h * x)
}

/// One correlator output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationSample {
    /// Correlator lane
    pub nid2: Nid2,
    /// Complex correlation value
    pub value: Complex32,
    /// Sample index at the correlator rate
    pub index: usize,
}

impl CorrelationSample {
    /// Detection statistic |value|^2
    pub fn magnitude_sq(&self) -> f32 {
        self.value.norm_sqr()
    }
}

/// Three PSS matched filters sharing one delay line
#[derive(Debug, Clone)]
pub struct PssCorrelatorBank {
    reference: Arc<PssReference>,
    delay_line: DelayLine,
    next_index: usize,
}

impl PssCorrelatorBank {
    /// Create a bank for the given references
    pub fn new(reference: Arc<PssReference>) -> Self {
        let taps = reference.fft_size();
        Self {
            reference,
            delay_line: DelayLine::new(taps),
            next_index: 0,
        }
    }

    /// Consume one sample and produce the three correlation outputs
    pub fn process(&mut self, sample: Complex32) -> [CorrelationSample; 3] {
        self.delay_line.push(sample);
        let index = self.next_index;
        self.next_index += 1;

        let window = self.delay_line.window();
        Nid2::ALL.map(|nid2| CorrelationSample {
            nid2,
            value: fir_output(self.reference.kernel(nid2), window),
            index,
        })
    }

    /// Index the next sample will get
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Reset to zero history
    pub fn reset(&mut self) {
        self.delay_line.clear();
        self.next_index = 0;
    }
}

/// A single PSS matched filter with its own delay line
#[derive(Debug, Clone)]
pub struct MatchedFilter {
    nid2: Nid2,
    reference: Arc<PssReference>,
    delay_line: DelayLine,
    next_index: usize,
}

impl MatchedFilter {
    /// Create the matched filter for `nid2`
    pub fn new(reference: Arc<PssReference>, nid2: Nid2) -> Self {
        let taps = reference.fft_size();
        Self {
            nid2,
            reference,
            delay_line: DelayLine::new(taps),
            next_index: 0,
        }
    }

    /// Correlator lane
    pub fn nid2(&self) -> Nid2 {
        self.nid2
    }

    /// Consume one sample and produce the correlation output
    pub fn process(&mut self, sample: Complex32) -> CorrelationSample {
        self.delay_line.push(sample);
        let index = self.next_index;
        self.next_index += 1;

        CorrelationSample {
            nid2: self.nid2,
            value: fir_output(self.reference.kernel(self.nid2), self.delay_line.window()),
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NFFT: usize = 256;

    fn reference() -> Arc<PssReference> {
        Arc::new(PssReference::new(NFFT).unwrap())
    }

    #[test]
    fn test_delay_line_window() {
        let mut line = DelayLine::new(3);
        for n in 1..=5 {
            line.push(Complex32::new(n as f32, 0.0));
        }
        let values: Vec<f32> = line.window().iter().map(|s| s.re).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_zero_initial_state() {
        let reference = reference();
        let mut bank = PssCorrelatorBank::new(reference.clone());

        // An impulse reproduces the kernel: output[n] = kernel[n]
        let nid2 = Nid2::new(1).unwrap();
        let kernel = reference.kernel(nid2);
        let first = bank.process(Complex32::new(1.0, 0.0));
        assert_eq!(first[1].value, kernel[0]);
        for k in 1..10 {
            let out = bank.process(Complex32::new(0.0, 0.0));
            assert_eq!(out[1].index, k);
            assert!((out[1].value - kernel[k]).norm() < 1e-7);
        }
    }

    #[test]
    fn test_reference_pss_peaks_at_last_sample() {
        let reference = reference();
        let min_threshold = 1e-9;

        for nid2 in Nid2::ALL {
            let mut bank = PssCorrelatorBank::new(reference.clone());
            let mut input = vec![Complex32::new(0.0, 0.0); 100];
            input.extend_from_slice(reference.time_domain(nid2));
            input.extend(vec![Complex32::new(0.0, 0.0); 100]);

            let outputs: Vec<[CorrelationSample; 3]> =
                input.iter().map(|&s| bank.process(s)).collect();

            let lane = nid2.index();
            let peak_index = outputs
                .iter()
                .enumerate()
                .max_by(|a, b| a.1[lane].magnitude_sq().total_cmp(&b.1[lane].magnitude_sq()))
                .map(|(i, _)| i)
                .unwrap();

            assert_eq!(peak_index, 100 + NFFT - 1);
            let at_peak = &outputs[peak_index];
            assert!(at_peak[lane].magnitude_sq() > min_threshold);
            assert!((at_peak[lane].magnitude_sq() - 1.0).abs() < 1e-3);
            for other in Nid2::ALL.iter().filter(|&&n| n != nid2) {
                assert!(at_peak[lane].magnitude_sq() > at_peak[other.index()].magnitude_sq());
            }
        }
    }

    #[test]
    fn test_matched_filter_matches_bank() {
        let reference = reference();
        let mut bank = PssCorrelatorBank::new(reference.clone());
        let mut lanes: Vec<MatchedFilter> = Nid2::ALL
            .iter()
            .map(|&nid2| MatchedFilter::new(reference.clone(), nid2))
            .collect();

        for n in 0..600 {
            let sample = Complex32::new((n as f32 * 0.37).sin(), (n as f32 * 0.11).cos());
            let shared = bank.process(sample);
            for lane in lanes.iter_mut() {
                let single = lane.process(sample);
                assert_eq!(single, shared[lane.nid2().index()]);
            }
        }
    }
}

//! Correlation peak picking
//!
//! A correlator sample is a peak when it reaches the detection threshold and
//! is the maximum of a window of `window_length` samples centred on it. The
//! window needs (W - 1) / 2 samples of lookahead, so every decision lags the
//! newest input by that amount.

use crate::correlator::CorrelationSample;
use common::types::Nid2;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::trace;

/// A confirmed correlation peak
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakEvent {
    /// Sample index at the correlator rate
    pub index: usize,
    /// Correlator lane
    pub nid2: Nid2,
    /// Correlation magnitude squared
    pub magnitude_sq: f32,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    index: usize,
    magnitude_sq: f32,
    threshold: f32,
}

/// Sliding-window local maximum detector for one correlator lane
#[derive(Debug, Clone)]
pub struct PeakPicker {
    nid2: Nid2,
    window_length: usize,
    half: usize,
    /// The last `window_length` samples, oldest first
    recent: VecDeque<Entry>,
    /// Next sample index expected from the correlator
    next_index: usize,
    /// Next candidate awaiting a decision
    next_candidate: usize,
    last_peak: Option<usize>,
}

impl PeakPicker {
    /// Create a picker with an odd window length
    pub fn new(nid2: Nid2, window_length: usize) -> Self {
        debug_assert!(window_length % 2 == 1);
        Self {
            nid2,
            window_length,
            half: window_length / 2,
            recent: VecDeque::with_capacity(window_length + 1),
            next_index: 0,
            next_candidate: 0,
            last_peak: None,
        }
    }

    /// Correlator lane
    pub fn nid2(&self) -> Nid2 {
        self.nid2
    }

    /// Samples between a candidate and its decision
    pub fn latency(&self) -> usize {
        self.half
    }

    /// Push the next correlator output with its threshold.
    ///
    /// Returns the peak decided by this sample, if any. The decided candidate
    /// lies `latency()` samples before `sample.index`.
    pub fn push(&mut self, sample: &CorrelationSample, threshold: f32) -> Option<PeakEvent> {
        debug_assert_eq!(sample.index, self.next_index);

        self.recent.push_back(Entry {
            index: self.next_index,
            magnitude_sq: sample.magnitude_sq(),
            threshold,
        });
        if self.recent.len() > self.window_length {
            self.recent.pop_front();
        }
        self.next_index += 1;

        if self.next_candidate + self.half < self.next_index {
            let candidate = self.next_candidate;
            self.next_candidate += 1;
            self.evaluate(candidate)
        } else {
            None
        }
    }

    /// Decide the trailing candidates at end of stream with truncated windows
    pub fn finish(&mut self) -> Vec<PeakEvent> {
        let mut peaks = Vec::new();
        while self.next_candidate < self.next_index {
            let candidate = self.next_candidate;
            self.next_candidate += 1;
            if let Some(peak) = self.evaluate(candidate) {
                peaks.push(peak);
            }
        }
        peaks
    }

    fn evaluate(&mut self, candidate: usize) -> Option<PeakEvent> {
        let front = self.recent.front()?.index;
        let entry = *self.recent.get(candidate.checked_sub(front)?)?;

        if entry.magnitude_sq < entry.threshold {
            return None;
        }
        if let Some(last) = self.last_peak {
            if candidate - last < self.window_length {
                return None;
            }
        }

        let lo = candidate.saturating_sub(self.half);
        let hi = candidate + self.half;
        let is_max = self
            .recent
            .iter()
            .filter(|e| e.index >= lo && e.index <= hi && e.index != candidate)
            .all(|e| {
                if e.index < candidate {
                    entry.magnitude_sq > e.magnitude_sq
                } else {
                    entry.magnitude_sq >= e.magnitude_sq
                }
            });
        if !is_max {
            return None;
        }

        self.last_peak = Some(candidate);
        trace!("PSS peak: nid2={} index={} |c|^2={:.4e} threshold={:.4e}",
               self.nid2, candidate, entry.magnitude_sq, entry.threshold);

        Some(PeakEvent {
            index: candidate,
            nid2: self.nid2,
            magnitude_sq: entry.magnitude_sq,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex32;

    fn lane() -> Nid2 {
        Nid2::new(0).unwrap()
    }

    /// Run a picker over magnitudes with a constant threshold
    fn pick(magnitudes: &[f32], threshold: f32, window: usize) -> Vec<PeakEvent> {
        let mut picker = PeakPicker::new(lane(), window);
        let mut peaks = Vec::new();
        for (index, &m) in magnitudes.iter().enumerate() {
            let sample = CorrelationSample {
                nid2: lane(),
                value: Complex32::new(m.sqrt(), 0.0),
                index,
            };
            peaks.extend(picker.push(&sample, threshold));
        }
        peaks.extend(picker.finish());
        peaks
    }

    #[test]
    fn test_single_peak() {
        let mut magnitudes = vec![0.1; 40];
        magnitudes[19] = 0.5;
        magnitudes[20] = 1.0;
        magnitudes[21] = 0.5;

        let peaks = pick(&magnitudes, 0.25, 11);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 20);
        assert!((peaks[0].magnitude_sq - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_below_threshold_ignored() {
        let mut magnitudes = vec![0.0; 40];
        magnitudes[20] = 0.2;
        assert!(pick(&magnitudes, 0.25, 11).is_empty());
    }

    #[test]
    fn test_decision_latency() {
        let mut picker = PeakPicker::new(lane(), 11);
        let mut decided_at = None;
        for index in 0..40 {
            let m = if index == 10 { 4.0 } else { 0.0 };
            let sample = CorrelationSample {
                nid2: lane(),
                value: Complex32::new(m, 0.0),
                index,
            };
            if picker.push(&sample, 1.0).is_some() {
                decided_at = Some(index);
            }
        }
        assert_eq!(decided_at, Some(10 + picker.latency()));
    }

    #[test]
    fn test_tie_goes_to_earliest() {
        let mut magnitudes = vec![0.0; 40];
        magnitudes[15] = 1.0;
        magnitudes[18] = 1.0;

        let peaks = pick(&magnitudes, 0.5, 11);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 15);
    }

    #[test]
    fn test_larger_later_value_wins_window() {
        let mut magnitudes = vec![0.0; 40];
        magnitudes[15] = 1.0;
        magnitudes[19] = 2.0;

        let peaks = pick(&magnitudes, 0.5, 11);
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].index, 19);
    }

    #[test]
    fn test_peak_near_stream_edges() {
        let mut magnitudes = vec![0.0; 30];
        magnitudes[1] = 3.0;
        magnitudes[28] = 3.0;

        let peaks = pick(&magnitudes, 1.0, 11);
        let indices: Vec<usize> = peaks.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![1, 28]);
    }

    #[test]
    fn test_no_two_peaks_within_window() {
        let window = 11;
        // Alternating bumps every 7 samples with slowly growing height
        let magnitudes: Vec<f32> = (0..400)
            .map(|n| {
                let bump = if n % 7 == 0 { 1.0 + n as f32 * 1e-3 } else { 0.2 };
                bump + ((n as f32) * 1.3).sin().abs() * 0.1
            })
            .collect();

        let peaks = pick(&magnitudes, 0.5, window);
        assert!(!peaks.is_empty());
        for pair in peaks.windows(2) {
            assert!(pair[1].index - pair[0].index > window - 1,
                    "peaks at {} and {}", pair[0].index, pair[1].index);
        }
    }

    #[test]
    fn test_finish_is_idempotent() {
        let mut magnitudes = vec![0.0; 20];
        magnitudes[18] = 1.0;

        let mut picker = PeakPicker::new(lane(), 5);
        for (index, &m) in magnitudes.iter().enumerate() {
            let sample = CorrelationSample { nid2: lane(), value: Complex32::new(m, 0.0), index };
            assert!(picker.push(&sample, 0.5).is_none());
        }
        assert_eq!(picker.finish().len(), 1);
        assert!(picker.finish().is_empty());
    }
}

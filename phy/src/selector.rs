//! First-SSB detection selection
//!
//! Merges the peaks of the three correlator lanes by sample index and turns
//! the first usable one into the timing decision for OFDM demodulation.

use crate::peak_picker::PeakEvent;
use crate::PhyError;
use common::types::Nid2;
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info};

/// Timing decision for one SSB
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionResult {
    /// Index of the first sample of the SSB (CP of the PSS symbol)
    pub symbol_start: usize,
    /// Detected PSS identity
    pub nid2: Nid2,
    /// The peak the decision was made from
    pub peak: PeakEvent,
}

impl DetectionResult {
    /// Derive the symbol start from a peak at the last PSS sample.
    ///
    /// `peak_offset` is Nfft + CP - 1. Peaks with less lookback than one full
    /// symbol are rejected.
    pub fn from_peak(peak: PeakEvent, peak_offset: usize) -> Result<Self, PhyError> {
        let symbol_start = peak.index.checked_sub(peak_offset).ok_or(
            PhyError::InsufficientHistory {
                peak_index: peak.index,
                required: peak_offset + 1,
            },
        )?;

        Ok(Self {
            symbol_start,
            nid2: peak.nid2,
            peak,
        })
    }
}

/// Peak ordering: earliest index, then larger magnitude, then lower NID2
fn selection_order(a: &PeakEvent, b: &PeakEvent) -> Ordering {
    a.index
        .cmp(&b.index)
        .then_with(|| b.magnitude_sq.total_cmp(&a.magnitude_sq))
        .then_with(|| a.nid2.cmp(&b.nid2))
}

/// Single-shot selector over the three lanes' peaks
#[derive(Debug, Clone)]
pub struct DetectionSelector {
    peak_offset: usize,
    result: Option<DetectionResult>,
    dropped: usize,
}

impl DetectionSelector {
    /// Create a selector for peaks `peak_offset` samples after the SSB start
    pub fn new(peak_offset: usize) -> Self {
        Self {
            peak_offset,
            result: None,
            dropped: 0,
        }
    }

    /// Offer a batch of peaks.
    ///
    /// The batch must contain every peak any lane will report up to the
    /// largest index in it, so that merging by index is final. Returns the
    /// detection the first time one is made and `None` ever after.
    pub fn resolve(&mut self, peaks: &[PeakEvent]) -> Option<DetectionResult> {
        if self.result.is_some() || peaks.is_empty() {
            return None;
        }

        let mut ordered = peaks.to_vec();
        ordered.sort_by(selection_order);

        for peak in ordered {
            match DetectionResult::from_peak(peak, self.peak_offset) {
                Ok(detection) => {
                    info!("SSB detected: nid2={} peak={} symbol_start={} |c|^2={:.4e}",
                          detection.nid2, peak.index, detection.symbol_start, peak.magnitude_sq);
                    self.result = Some(detection);
                    return Some(detection);
                }
                Err(e) => {
                    debug!("Dropping PSS candidate (nid2={}): {}", peak.nid2, e);
                    self.dropped += 1;
                }
            }
        }

        None
    }

    /// True once a detection has been made
    pub fn is_done(&self) -> bool {
        self.result.is_some()
    }

    /// The detection, if one was made
    pub fn result(&self) -> Option<DetectionResult> {
        self.result
    }

    /// Candidates discarded for insufficient history
    pub fn dropped_candidates(&self) -> usize {
        self.dropped
    }
}

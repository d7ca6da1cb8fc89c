//! SSB receiver
//!
//! Wires the pipeline together: sample-rate adapter, the three PSS matched
//! filters with their shared energy threshold, one peak picker per lane, the
//! single-shot selector and the OFDM demodulator.
//!
//! Two entry points are provided. `SsbReceiver` is a streaming receiver fed
//! in arbitrary blocks. `SsbReceiver::search_parallel` runs the three lanes
//! over a complete block on scoped threads and merges their peaks afterwards,
//! which yields the same detection as streaming.

use crate::config::SsbDetectorConfig;
use crate::correlator::{MatchedFilter, PssCorrelatorBank};
use crate::ofdm::{DemodState, SsbDemodulator};
use crate::peak_picker::{PeakEvent, PeakPicker};
use crate::pss::PssReference;
use crate::resampler::SampleRateAdapter;
use crate::resource_grid::SsbGrid;
use crate::selector::{DetectionResult, DetectionSelector};
use crate::threshold::EnergyThreshold;
use crate::PhyError;
use common::types::Nid2;
use num_complex::Complex32;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Result of a completed search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// An SSB was detected and demodulated
    Found(SsbGrid),
    /// The stream ended without a usable PSS peak
    NotFound,
}

impl SearchOutcome {
    /// The grid, if one was found
    pub fn grid(&self) -> Option<&SsbGrid> {
        match self {
            SearchOutcome::Found(grid) => Some(grid),
            SearchOutcome::NotFound => None,
        }
    }
}

/// Streaming first-SSB receiver
#[derive(Debug)]
pub struct SsbReceiver {
    config: SsbDetectorConfig,
    adapter: SampleRateAdapter,
    correlators: PssCorrelatorBank,
    threshold: EnergyThreshold,
    pickers: [PeakPicker; 3],
    selector: DetectionSelector,
    demodulator: SsbDemodulator,
    /// Recent samples at the correlator rate, oldest first
    history: VecDeque<Complex32>,
    /// Index of the front of `history`
    history_start: usize,
    history_capacity: usize,
    /// Samples seen at the correlator rate
    processed: usize,
    /// Adapter output for the block in progress
    scratch: Vec<Complex32>,
    grid: Option<SsbGrid>,
}

impl SsbReceiver {
    /// Create a receiver; the configuration is validated first
    pub fn new(config: SsbDetectorConfig) -> Result<Self, PhyError> {
        config.validate()?;

        let reference = Arc::new(PssReference::new(config.fft_size)?);
        let adapter = SampleRateAdapter::new(&config)?;
        let pickers = Nid2::ALL.map(|nid2| PeakPicker::new(nid2, config.window_length));

        // Enough lookback to reach the symbol start of a peak decided late
        let history_capacity = config.symbol_length() + config.window_length;

        info!("SSB receiver: {} kHz, Nfft={}, CP={}, W={}, threshold {} dB, {:.2} Msps in",
              config.scs.khz(), config.fft_size, config.cp_length, config.window_length,
              config.threshold_db, config.input_sample_rate() / 1e6);

        Ok(Self {
            adapter,
            correlators: PssCorrelatorBank::new(reference),
            threshold: EnergyThreshold::from_config(&config),
            pickers,
            selector: DetectionSelector::new(config.peak_offset()),
            demodulator: SsbDemodulator::new(&config),
            history: VecDeque::with_capacity(history_capacity + 1),
            history_start: 0,
            history_capacity,
            processed: 0,
            scratch: Vec::new(),
            grid: None,
            config,
        })
    }

    /// Search a complete block with the streaming receiver
    pub fn search(config: SsbDetectorConfig, samples: &[Complex32]) -> Result<SearchOutcome, PhyError> {
        let mut receiver = Self::new(config)?;
        receiver.push(samples)?;
        receiver.finish()
    }

    /// Active configuration
    pub fn config(&self) -> &SsbDetectorConfig {
        &self.config
    }

    /// Samples processed at the correlator rate
    pub fn samples_processed(&self) -> usize {
        self.processed
    }

    /// The detection, once made
    pub fn detection(&self) -> Option<DetectionResult> {
        self.selector.result()
    }

    /// The demodulated grid, once complete
    pub fn grid(&self) -> Option<&SsbGrid> {
        self.grid.as_ref()
    }

    /// True once the grid is complete; further input is ignored
    pub fn is_done(&self) -> bool {
        self.grid.is_some()
    }

    /// Candidates discarded for insufficient history
    pub fn dropped_candidates(&self) -> usize {
        self.selector.dropped_candidates()
    }

    /// Map a correlator-rate index back to the input stream.
    ///
    /// Returns `None` for indices inside the decimator's start-up delay.
    pub fn input_index(&self, index: usize) -> Option<usize> {
        self.adapter.input_index(index)
    }

    /// Forget the stream and search again from sample zero
    pub fn reset(&mut self) {
        self.adapter.reset();
        self.correlators.reset();
        self.threshold.reset();
        self.pickers = Nid2::ALL.map(|nid2| PeakPicker::new(nid2, self.config.window_length));
        self.selector = DetectionSelector::new(self.config.peak_offset());
        self.demodulator = SsbDemodulator::new(&self.config);
        self.history.clear();
        self.history_start = 0;
        self.processed = 0;
        self.grid = None;
        debug!("SSB receiver reset");
    }

    /// Feed a block of input samples
    pub fn push(&mut self, input: &[Complex32]) -> Result<(), PhyError> {
        if self.is_done() || input.is_empty() {
            return Ok(());
        }

        let mut samples = std::mem::take(&mut self.scratch);
        samples.clear();
        self.adapter.process(input, &mut samples);

        let result = samples
            .iter()
            .try_for_each(|&sample| self.process_sample(sample));

        self.scratch = samples;
        result
    }

    /// End of stream: decide the trailing candidates and report the outcome
    pub fn finish(mut self) -> Result<SearchOutcome, PhyError> {
        if !self.selector.is_done() {
            let mut peaks = Vec::new();
            for picker in self.pickers.iter_mut() {
                peaks.extend(picker.finish());
            }
            if let Some(detection) = self.selector.resolve(&peaks) {
                self.start_demodulation(detection)?;
            }
        }

        if let Some(grid) = self.grid.take() {
            return Ok(SearchOutcome::Found(grid));
        }

        match self.demodulator.state() {
            DemodState::Demodulating { .. } => Err(self.demodulator.incomplete()),
            _ => {
                info!("No SSB found in {} samples ({} candidates dropped)",
                      self.processed, self.selector.dropped_candidates());
                Ok(SearchOutcome::NotFound)
            }
        }
    }

    fn process_sample(&mut self, sample: Complex32) -> Result<(), PhyError> {
        self.processed += 1;

        if self.selector.is_done() {
            if let Some(grid) = self.demodulator.push(&[sample])? {
                self.grid = Some(grid);
            }
            return Ok(());
        }

        self.history.push_back(sample);
        if self.history.len() > self.history_capacity {
            self.history.pop_front();
            self.history_start += 1;
        }

        let threshold = self.threshold.process(sample);
        let outputs = self.correlators.process(sample);

        let mut peaks = Vec::new();
        for (picker, output) in self.pickers.iter_mut().zip(outputs.iter()) {
            peaks.extend(picker.push(output, threshold));
        }
        if peaks.is_empty() {
            return Ok(());
        }

        if let Some(detection) = self.selector.resolve(&peaks) {
            self.start_demodulation(detection)?;
        }
        Ok(())
    }

    /// Arm the demodulator and replay the history from the symbol start
    fn start_demodulation(&mut self, detection: DetectionResult) -> Result<(), PhyError> {
        let offset = detection
            .symbol_start
            .checked_sub(self.history_start)
            .ok_or_else(|| PhyError::ProcessingError(format!(
                "Symbol start {} precedes retained history at {}",
                detection.symbol_start, self.history_start
            )))?;

        self.demodulator.arm(detection)?;

        let replay: Vec<Complex32> = self.history.iter().skip(offset).copied().collect();
        debug!("Replaying {} buffered samples into the demodulator", replay.len());
        self.history.clear();

        if let Some(grid) = self.demodulator.push(&replay)? {
            self.grid = Some(grid);
        }
        Ok(())
    }

    /// Search a complete block with the three lanes on scoped threads.
    ///
    /// The energy threshold is computed once and shared; each lane runs its
    /// own matched filter and peak picker over the whole block. Peaks are
    /// merged only after every lane has finished, so the detection matches
    /// streaming mode.
    pub fn search_parallel(
        config: SsbDetectorConfig,
        input: &[Complex32],
    ) -> Result<SearchOutcome, PhyError> {
        config.validate()?;

        let mut adapter = SampleRateAdapter::new(&config)?;
        let mut samples = Vec::with_capacity(input.len());
        adapter.process(input, &mut samples);

        let mut threshold = EnergyThreshold::from_config(&config);
        let thresholds: Vec<f32> = samples.iter().map(|&s| threshold.process(s)).collect();

        let reference = Arc::new(PssReference::new(config.fft_size)?);
        let window_length = config.window_length;

        let lanes: Vec<Vec<PeakEvent>> = thread::scope(|scope| {
            let handles: Vec<_> = Nid2::ALL
                .iter()
                .map(|&nid2| {
                    let reference = Arc::clone(&reference);
                    let samples = &samples;
                    let thresholds = &thresholds;
                    scope.spawn(move || {
                        run_lane(MatchedFilter::new(reference, nid2), window_length, samples, thresholds)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect::<Result<Vec<_>, _>>()
        })
        .map_err(|_| PhyError::ProcessingError("Correlator lane panicked".to_string()))?;

        let peaks: Vec<PeakEvent> = lanes.into_iter().flatten().collect();
        debug!("Parallel search: {} peaks over {} samples", peaks.len(), samples.len());

        let mut selector = DetectionSelector::new(config.peak_offset());
        match selector.resolve(&peaks) {
            Some(detection) => {
                let mut demodulator = SsbDemodulator::new(&config);
                let grid = demodulator.demodulate_block(&samples, detection)?;
                Ok(SearchOutcome::Found(grid))
            }
            None => {
                info!("No SSB found in {} samples ({} candidates dropped)",
                      samples.len(), selector.dropped_candidates());
                Ok(SearchOutcome::NotFound)
            }
        }
    }
}

/// One correlator lane over a whole block
fn run_lane(
    mut filter: MatchedFilter,
    window_length: usize,
    samples: &[Complex32],
    thresholds: &[f32],
) -> Vec<PeakEvent> {
    let mut picker = PeakPicker::new(filter.nid2(), window_length);
    let mut peaks = Vec::new();

    for (&sample, &threshold) in samples.iter().zip(thresholds) {
        let output = filter.process(sample);
        peaks.extend(picker.push(&output, threshold));
    }
    peaks.extend(picker.finish());

    debug!("Lane nid2={} found {} peaks", filter.nid2(), peaks.len());
    peaks
}

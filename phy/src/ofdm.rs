//! OFDM Modulation and Demodulation of the SSB
//!
//! Implements the SSB symbol layout of 3GPP TS 38.211: 240 subcarriers centred
//! on DC, one cyclic prefix per symbol. Both directions scale by 1/sqrt(N) so
//! a modulate/demodulate round trip is the identity.

use crate::config::SsbDetectorConfig;
use crate::pss::ssb_subcarrier_to_bin;
use crate::resource_grid::{GridAssembler, SsbGrid};
use crate::selector::DetectionResult;
use crate::{PhyError, SSB_SUBCARRIERS, SSB_SYMBOLS};
use common::types::SubcarrierSpacing;
use ndarray::Array2;
use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;
use tracing::{debug, warn};

/// CP lengths of the 14 symbols of a slot.
///
/// The first symbol of every half subframe carries the long CP: symbol 0 of
/// each slot at 30 kHz, symbols 0 and 7 at 15 kHz.
pub fn slot_cp_lengths(fft_size: usize, scs: SubcarrierSpacing) -> Vec<usize> {
    let base_cp = crate::config::normal_cp_length(fft_size);
    let long_cp = base_cp + scs.long_cp_extension(fft_size);

    (0..14)
        .map(|symbol| match (scs, symbol) {
            (_, 0) => long_cp,
            (SubcarrierSpacing::Scs15, 7) => long_cp,
            _ => base_cp,
        })
        .collect()
}

/// OFDM modulator for SSB test waveforms
#[derive(Clone)]
pub struct OfdmModulator {
    fft_size: usize,
    cp_length: usize,
    ifft: Arc<dyn Fft<f32>>,
}

impl std::fmt::Debug for OfdmModulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfdmModulator")
            .field("fft_size", &self.fft_size)
            .field("cp_length", &self.cp_length)
            .finish()
    }
}

impl OfdmModulator {
    /// Create a modulator
    pub fn new(fft_size: usize, cp_length: usize) -> Result<Self, PhyError> {
        if fft_size < SSB_SUBCARRIERS || cp_length >= fft_size {
            return Err(PhyError::InvalidConfiguration(format!(
                "Cannot modulate the SSB with FFT size {} and CP {}", fft_size, cp_length
            )));
        }

        let mut planner = FftPlanner::new();
        Ok(Self {
            fft_size,
            cp_length,
            ifft: planner.plan_fft_inverse(fft_size),
        })
    }

    /// Samples per symbol including the CP
    pub fn symbol_length(&self) -> usize {
        self.fft_size + self.cp_length
    }

    /// Modulate one 240-subcarrier symbol, CP first
    pub fn modulate_symbol(&self, column: &[Complex32]) -> Result<Vec<Complex32>, PhyError> {
        self.modulate_symbol_with_cp(column, self.cp_length)
    }

    /// Modulate one symbol with an explicit CP length, e.g. the long CP of
    /// the first symbol in a half subframe
    pub fn modulate_symbol_with_cp(
        &self,
        column: &[Complex32],
        cp_length: usize,
    ) -> Result<Vec<Complex32>, PhyError> {
        if cp_length >= self.fft_size {
            return Err(PhyError::InvalidConfiguration(format!(
                "CP {} does not fit FFT size {}", cp_length, self.fft_size
            )));
        }
        if column.len() != SSB_SUBCARRIERS {
            return Err(PhyError::ProcessingError(format!(
                "Expected {} subcarriers, got {}", SSB_SUBCARRIERS, column.len()
            )));
        }

        let mut buffer = vec![Complex32::new(0.0, 0.0); self.fft_size];
        for (k, &value) in column.iter().enumerate() {
            buffer[ssb_subcarrier_to_bin(k, self.fft_size)] = value;
        }
        self.ifft.process(&mut buffer);

        let scale = 1.0 / (self.fft_size as f32).sqrt();
        let mut output = Vec::with_capacity(self.fft_size + cp_length);
        output.extend(buffer[self.fft_size - cp_length..].iter().map(|&s| s * scale));
        output.extend(buffer.iter().map(|&s| s * scale));

        Ok(output)
    }

    /// Modulate a 240 x 4 grid into the four consecutive SSB symbols
    pub fn modulate_ssb(&self, grid: &Array2<Complex32>) -> Result<Vec<Complex32>, PhyError> {
        if grid.shape() != [SSB_SUBCARRIERS, SSB_SYMBOLS] {
            return Err(PhyError::ProcessingError(format!(
                "SSB grid shape {:?}, expected [240, 4]", grid.shape()
            )));
        }

        let mut output = Vec::with_capacity(SSB_SYMBOLS * self.symbol_length());
        for column in grid.columns() {
            output.extend(self.modulate_symbol(&column.to_vec())?);
        }
        Ok(output)
    }
}

/// Demodulator progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemodState {
    /// No timing decision yet
    WaitingForDetection,
    /// Collecting samples of SSB symbol `symbol`
    Demodulating { symbol: usize },
    /// Grid emitted
    Done,
}

/// Extracts the four SSB symbols from the detected start
pub struct SsbDemodulator {
    fft_size: usize,
    cp_length: usize,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex32>,
    state: DemodState,
    detection: Option<DetectionResult>,
    /// Samples of the symbol in progress, CP included
    symbol_buffer: Vec<Complex32>,
    iq_window: Vec<Complex32>,
    assembler: GridAssembler,
}

impl std::fmt::Debug for SsbDemodulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsbDemodulator")
            .field("fft_size", &self.fft_size)
            .field("cp_length", &self.cp_length)
            .field("state", &self.state)
            .field("samples", &self.iq_window.len())
            .finish()
    }
}

impl SsbDemodulator {
    /// Create a demodulator for the configured numerology
    pub fn new(config: &SsbDetectorConfig) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let scratch = vec![Complex32::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        Self {
            fft_size: config.fft_size,
            cp_length: config.cp_length,
            fft,
            scratch,
            state: DemodState::WaitingForDetection,
            detection: None,
            symbol_buffer: Vec::with_capacity(config.symbol_length()),
            iq_window: Vec::with_capacity(config.ssb_length()),
            assembler: GridAssembler::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> DemodState {
        self.state
    }

    /// Samples needed from the symbol start to finish the grid
    pub fn required_samples(&self) -> usize {
        SSB_SYMBOLS * (self.fft_size + self.cp_length)
    }

    /// Samples received since the symbol start
    pub fn received_samples(&self) -> usize {
        self.iq_window.len()
    }

    /// Start demodulating at `detection.symbol_start`
    pub fn arm(&mut self, detection: DetectionResult) -> Result<(), PhyError> {
        if self.state != DemodState::WaitingForDetection {
            return Err(PhyError::ProcessingError(format!(
                "Demodulator cannot accept a detection in state {:?}", self.state
            )));
        }

        debug!("Demodulating SSB from sample {}", detection.symbol_start);
        self.detection = Some(detection);
        self.state = DemodState::Demodulating { symbol: 0 };
        Ok(())
    }

    /// Feed samples that follow the symbol start.
    ///
    /// Returns the grid once the fourth symbol completes; samples past the end
    /// of the SSB are ignored.
    pub fn push(&mut self, samples: &[Complex32]) -> Result<Option<SsbGrid>, PhyError> {
        let symbol_length = self.fft_size + self.cp_length;

        for &sample in samples {
            let DemodState::Demodulating { symbol } = self.state else {
                break;
            };

            self.iq_window.push(sample);
            self.symbol_buffer.push(sample);
            if self.symbol_buffer.len() < symbol_length {
                continue;
            }

            let column = self.demodulate_symbol()?;
            self.symbol_buffer.clear();
            self.assembler.push_symbol(column)?;

            if symbol + 1 < SSB_SYMBOLS {
                self.state = DemodState::Demodulating { symbol: symbol + 1 };
                continue;
            }

            self.state = DemodState::Done;
            let detection = self.detection.ok_or_else(|| {
                PhyError::ProcessingError("Demodulation finished without a detection".to_string())
            })?;
            let assembler = std::mem::take(&mut self.assembler);
            let iq_window = std::mem::take(&mut self.iq_window);
            return assembler.assemble(&detection, iq_window).map(Some);
        }

        Ok(None)
    }

    /// Demodulate a whole block starting at `detection.symbol_start`
    pub fn demodulate_block(
        &mut self,
        samples: &[Complex32],
        detection: DetectionResult,
    ) -> Result<SsbGrid, PhyError> {
        self.arm(detection)?;
        let tail = samples.get(detection.symbol_start..).unwrap_or(&[]);
        match self.push(tail)? {
            Some(grid) => Ok(grid),
            None => Err(self.incomplete()),
        }
    }

    /// Error describing a stream that ended mid-SSB
    pub fn incomplete(&self) -> PhyError {
        warn!("Stream ended after {} of {} SSB samples",
              self.received_samples(), self.required_samples());
        PhyError::IncompleteSsb {
            available: self.received_samples(),
            required: self.required_samples(),
        }
    }

    /// Skip the CP, transform and keep the 240 SSB subcarriers
    fn demodulate_symbol(&mut self) -> Result<Vec<Complex32>, PhyError> {
        let mut buffer = self.symbol_buffer[self.cp_length..].to_vec();
        if buffer.len() != self.fft_size {
            return Err(PhyError::ProcessingError(format!(
                "Expected {} samples after CP removal, got {}", self.fft_size, buffer.len()
            )));
        }

        self.fft.process_with_scratch(&mut buffer, &mut self.scratch);

        let scale = 1.0 / (self.fft_size as f32).sqrt();
        Ok((0..SSB_SUBCARRIERS)
            .map(|k| buffer[ssb_subcarrier_to_bin(k, self.fft_size)] * scale)
            .collect())
    }
}

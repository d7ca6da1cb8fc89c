//! SSB resource grid
//!
//! The demodulated SSB as handed to MIB decoding: 240 subcarriers by 4 OFDM
//! symbols, tagged with the detected NID2 and the raw IQ it came from.

use crate::selector::DetectionResult;
use crate::{PhyError, SSB_SUBCARRIERS, SSB_SYMBOLS};
use common::types::Nid2;
use ndarray::{Array2, ArrayView1};
use num_complex::Complex32;
use tracing::debug;

/// Demodulated SSB, immutable once assembled
#[derive(Debug, Clone, PartialEq)]
pub struct SsbGrid {
    detection: DetectionResult,
    /// [subcarrier, symbol]
    grid: Array2<Complex32>,
    iq_window: Vec<Complex32>,
}

impl SsbGrid {
    /// Detected PSS identity
    pub fn nid2(&self) -> Nid2 {
        self.detection.nid2
    }

    /// Sample index of the SSB start at the correlator rate
    pub fn symbol_start(&self) -> usize {
        self.detection.symbol_start
    }

    /// The timing decision the grid was demodulated from
    pub fn detection(&self) -> &DetectionResult {
        &self.detection
    }

    /// The 240 x 4 grid, indexed [subcarrier, symbol]
    pub fn grid(&self) -> &Array2<Complex32> {
        &self.grid
    }

    /// Resource element at subcarrier `k` of symbol `l`
    pub fn get(&self, k: usize, l: usize) -> Option<Complex32> {
        self.grid.get((k, l)).copied()
    }

    /// One OFDM symbol (240 subcarriers)
    pub fn symbol(&self, l: usize) -> ArrayView1<'_, Complex32> {
        self.grid.column(l)
    }

    /// Raw samples of the four symbols, cyclic prefixes included
    pub fn iq_window(&self) -> &[Complex32] {
        &self.iq_window
    }

    /// Relative error against an expected grid in dB: 10 log10(|G - E|^2 / |E|^2)
    pub fn relative_mse_db(&self, expected: &Array2<Complex32>) -> f32 {
        let error: f32 = self
            .grid
            .iter()
            .zip(expected.iter())
            .map(|(g, e)| (g - e).norm_sqr())
            .sum();
        let reference: f32 = expected.iter().map(|e| e.norm_sqr()).sum();
        10.0 * (error / reference).log10()
    }
}

/// Collects demodulated symbols into an `SsbGrid`
#[derive(Debug, Clone, Default)]
pub struct GridAssembler {
    columns: Vec<Vec<Complex32>>,
}

impl GridAssembler {
    /// Create an empty assembler
    pub fn new() -> Self {
        Self {
            columns: Vec::with_capacity(SSB_SYMBOLS),
        }
    }

    /// Append the next symbol's 240 subcarriers
    pub fn push_symbol(&mut self, column: Vec<Complex32>) -> Result<(), PhyError> {
        if column.len() != SSB_SUBCARRIERS {
            return Err(PhyError::ProcessingError(format!(
                "SSB symbol has {} subcarriers, expected {}",
                column.len(), SSB_SUBCARRIERS
            )));
        }
        if self.columns.len() == SSB_SYMBOLS {
            return Err(PhyError::ProcessingError("SSB grid already complete".to_string()));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Symbols collected so far
    pub fn symbols(&self) -> usize {
        self.columns.len()
    }

    /// True once all four symbols are present
    pub fn is_complete(&self) -> bool {
        self.columns.len() == SSB_SYMBOLS
    }

    /// Build the grid for `detection`
    pub fn assemble(
        self,
        detection: &DetectionResult,
        iq_window: Vec<Complex32>,
    ) -> Result<SsbGrid, PhyError> {
        if !self.is_complete() {
            return Err(PhyError::ProcessingError(format!(
                "SSB grid has {} of {} symbols", self.columns.len(), SSB_SYMBOLS
            )));
        }

        let columns = self.columns;
        let grid = Array2::from_shape_fn((SSB_SUBCARRIERS, SSB_SYMBOLS), |(k, l)| columns[l][k]);
        debug!("Assembled SSB grid {:?} for nid2={}", grid.shape(), detection.nid2);

        Ok(SsbGrid {
            detection: *detection,
            grid,
            iq_window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peak_picker::PeakEvent;

    fn detection() -> DetectionResult {
        let nid2 = Nid2::new(2).unwrap();
        DetectionResult {
            symbol_start: 42,
            nid2,
            peak: PeakEvent { index: 315, nid2, magnitude_sq: 1.0 },
        }
    }

    fn column(value: f32) -> Vec<Complex32> {
        (0..SSB_SUBCARRIERS).map(|k| Complex32::new(value, k as f32)).collect()
    }

    #[test]
    fn test_assemble_in_symbol_order() {
        let mut assembler = GridAssembler::new();
        for l in 0..SSB_SYMBOLS {
            assembler.push_symbol(column(l as f32)).unwrap();
        }
        assert!(assembler.is_complete());

        let grid = assembler.assemble(&detection(), vec![Complex32::new(0.0, 0.0); 8]).unwrap();
        assert_eq!(grid.grid().shape(), &[240, 4]);
        assert_eq!(grid.nid2().value(), 2);
        assert_eq!(grid.symbol_start(), 42);
        assert_eq!(grid.detection().peak.index, 315);
        assert_eq!(grid.get(7, 3), Some(Complex32::new(3.0, 7.0)));
        assert_eq!(grid.symbol(1)[239], Complex32::new(1.0, 239.0));
        assert_eq!(grid.iq_window().len(), 8);
        assert_eq!(grid.get(240, 0), None);
    }

    #[test]
    fn test_wrong_column_length() {
        let mut assembler = GridAssembler::new();
        assert!(assembler.push_symbol(vec![Complex32::new(0.0, 0.0); 256]).is_err());
    }

    #[test]
    fn test_incomplete_grid_rejected() {
        let mut assembler = GridAssembler::new();
        assembler.push_symbol(column(0.0)).unwrap();
        assert_eq!(assembler.symbols(), 1);
        assert!(assembler.assemble(&detection(), Vec::new()).is_err());
    }

    #[test]
    fn test_fifth_symbol_rejected() {
        let mut assembler = GridAssembler::new();
        for _ in 0..SSB_SYMBOLS {
            assembler.push_symbol(column(1.0)).unwrap();
        }
        assert!(assembler.push_symbol(column(1.0)).is_err());
    }
}

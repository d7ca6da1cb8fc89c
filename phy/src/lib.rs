//! 5G NR SSB Detection Library
//!
//! This crate finds the first Synchronization Signal Block in a baseband sample
//! stream and recovers its 240 x 4 resource grid for MIB decoding, following
//! the PSS and SSB definitions of 3GPP TS 38.211 section 7.4.

pub mod config;
pub mod pss;
pub mod resampler;
pub mod correlator;
pub mod threshold;
pub mod peak_picker;
pub mod selector;
pub mod ofdm;
pub mod resource_grid;
pub mod receiver;
pub mod synth;

// Re-export commonly used types
pub use config::SsbDetectorConfig;
pub use pss::PssReference;
pub use resampler::{HalfbandDecimator, SampleRateAdapter};
pub use correlator::{CorrelationSample, MatchedFilter, PssCorrelatorBank};
pub use threshold::EnergyThreshold;
pub use peak_picker::{PeakEvent, PeakPicker};
pub use selector::{DetectionResult, DetectionSelector};
pub use ofdm::{OfdmModulator, SsbDemodulator};
pub use resource_grid::{GridAssembler, SsbGrid};
pub use receiver::{SearchOutcome, SsbReceiver};

use thiserror::Error;

/// Number of subcarriers in an SSB
pub const SSB_SUBCARRIERS: usize = 240;

/// Number of OFDM symbols in an SSB
pub const SSB_SYMBOLS: usize = 4;

/// Errors raised by the SSB detection pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Insufficient history: peak at sample {peak_index} needs {required} samples of lookback")]
    InsufficientHistory {
        peak_index: usize,
        required: usize,
    },

    #[error("Incomplete SSB: {available} of {required} samples received after symbol start")]
    IncompleteSsb {
        available: usize,
        required: usize,
    },

    #[error("Processing error: {0}")]
    ProcessingError(String),
}

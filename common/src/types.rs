//! Common Types for the SSB receiver
//!
//! Defines fundamental identifiers and numerologies shared by the PHY core and the CLI

use serde::{Deserialize, Serialize};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive, ToPrimitive};

/// Physical Cell Identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pci(pub u16);

impl Pci {
    /// Maximum valid PCI value (0-1007)
    pub const MAX: u16 = 1007;

    /// Create a new PCI with validation
    pub fn new(value: u16) -> Option<Self> {
        if value <= Self::MAX {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Combine a cell group (NID1, 0-335) and a PSS index into a PCI
    pub fn from_ids(nid1: u16, nid2: Nid2) -> Option<Self> {
        if nid1 > 335 {
            return None;
        }
        Self::new(3 * nid1 + nid2.value() as u16)
    }

    /// Cell group identity carried by the SSS
    pub fn nid1(&self) -> u16 {
        self.0 / 3
    }

    /// Cell identity within the group carried by the PSS
    pub fn nid2(&self) -> Nid2 {
        Nid2((self.0 % 3) as u8)
    }
}

/// PSS sequence identity (cell-ID-2), one of 0, 1, 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Nid2(u8);

impl Nid2 {
    /// All PSS identities in ascending order
    pub const ALL: [Nid2; 3] = [Nid2(0), Nid2(1), Nid2(2)];

    /// Create a new NID2 with validation
    pub fn new(value: u8) -> Option<Self> {
        if value < 3 {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Get the NID2 value
    pub fn value(&self) -> u8 {
        self.0
    }

    /// Lane index of this identity in per-NID2 arrays
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Nid2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SSB subcarrier spacing in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive, Serialize, Deserialize)]
pub enum SubcarrierSpacing {
    /// 15 kHz
    Scs15 = 15,
    /// 30 kHz
    Scs30 = 30,
}

impl SubcarrierSpacing {
    /// Parse a spacing given in kHz
    pub fn from_khz(khz: u32) -> Option<Self> {
        Self::from_u32(khz)
    }

    /// Spacing in kHz
    pub fn khz(&self) -> u32 {
        self.to_u32().unwrap_or(15)
    }

    /// Spacing in Hz
    pub fn hz(&self) -> f64 {
        self.khz() as f64 * 1e3
    }

    /// Sample rate of an `fft_size`-point OFDM grid at this spacing
    pub fn sample_rate(&self, fft_size: usize) -> f64 {
        fft_size as f64 * self.hz()
    }

    /// Extra cyclic prefix samples of the first symbol of each half subframe.
    ///
    /// The long CP exceeds the normal CP by 16 * kappa * Tc, which at an
    /// `fft_size`-point grid is `fft_size / 128` samples per 15 kHz step.
    pub fn long_cp_extension(&self, fft_size: usize) -> usize {
        let base = fft_size / 128;
        match self {
            SubcarrierSpacing::Scs15 => base,
            SubcarrierSpacing::Scs30 => 2 * base,
        }
    }
}

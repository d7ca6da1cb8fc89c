//! Synthetic SSB waveforms
//!
//! Builds a baseband stream holding one SSB: the PSS of the requested NID2 on
//! symbol 0 and seeded random QPSK on all subcarriers of symbols 1-3, framed
//! by silence and optionally buried in white Gaussian noise. Symbol 0 can be
//! rendered with the long CP it carries at a half-subframe boundary.

use crate::ofdm::{slot_cp_lengths, OfdmModulator};
use crate::pss::map_pss;
use crate::{PhyError, SSB_SUBCARRIERS, SSB_SYMBOLS};
use common::types::{Nid2, SubcarrierSpacing};
use ndarray::Array2;
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::f32::consts::FRAC_1_SQRT_2;
use tracing::debug;

/// A synthetic stream and the ground truth it was built from
#[derive(Debug, Clone)]
pub struct SsbWaveform {
    /// Embedded PSS identity
    pub nid2: Nid2,
    /// Transmitted grid, [subcarrier, symbol]
    pub grid: Array2<Complex32>,
    /// Baseband samples
    pub samples: Vec<Complex32>,
    /// Index of the first SSB sample (CP of symbol 0)
    pub ssb_start: usize,
    /// FFT size the SSB was rendered with
    pub fft_size: usize,
    /// CP length of symbols 1-3
    pub cp_length: usize,
    /// CP length of symbol 0, longer at a half-subframe boundary
    pub first_cp_length: usize,
}

impl SsbWaveform {
    /// Index of the last PSS sample, where the matched filter peaks
    pub fn peak_index(&self) -> usize {
        self.ssb_start + self.first_cp_length + self.fft_size - 1
    }

    /// Symbol start a normal-CP receiver derives from the PSS peak.
    ///
    /// Equals `ssb_start` unless symbol 0 has a long CP, in which case it
    /// lies inside that CP, one normal CP before the PSS.
    pub fn detection_start(&self) -> usize {
        self.ssb_start + self.first_cp_length - self.cp_length
    }
}

/// Builder for `SsbWaveform`
#[derive(Debug, Clone)]
pub struct SsbSynthesizer {
    nid2: Nid2,
    fft_size: usize,
    cp_length: usize,
    leading: usize,
    trailing: usize,
    amplitude: f32,
    noise_power: f32,
    slot_boundary: Option<SubcarrierSpacing>,
    seed: u64,
}

impl SsbSynthesizer {
    /// 256-point SSB for `nid2` with no surrounding silence
    pub fn new(nid2: Nid2) -> Self {
        Self {
            nid2,
            fft_size: 256,
            cp_length: crate::config::normal_cp_length(256),
            leading: 0,
            trailing: 0,
            amplitude: 1.0,
            noise_power: 0.0,
            slot_boundary: None,
            seed: 0,
        }
    }

    /// Render with an `fft_size`-point grid and its normal CP
    pub fn fft_size(mut self, fft_size: usize) -> Self {
        self.fft_size = fft_size;
        self.cp_length = crate::config::normal_cp_length(fft_size);
        self
    }

    /// Silence before the SSB
    pub fn leading(mut self, samples: usize) -> Self {
        self.leading = samples;
        self
    }

    /// Silence after the SSB
    pub fn trailing(mut self, samples: usize) -> Self {
        self.trailing = samples;
        self
    }

    /// Linear amplitude of the SSB
    pub fn amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    /// Complex white Gaussian noise power per sample, added everywhere
    pub fn noise_power(mut self, power: f32) -> Self {
        self.noise_power = power;
        self
    }

    /// Place the SSB at the start of a half subframe of spacing `scs`, so
    /// symbol 0 carries the long CP
    pub fn slot_boundary(mut self, scs: SubcarrierSpacing) -> Self {
        self.slot_boundary = Some(scs);
        self
    }

    /// Seed for payload and noise
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the waveform
    pub fn build(&self) -> Result<SsbWaveform, PhyError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let grid = ssb_test_grid(self.nid2, &mut rng);

        let modulator = OfdmModulator::new(self.fft_size, self.cp_length)?;
        let first_cp_length = match self.slot_boundary {
            Some(scs) => slot_cp_lengths(self.fft_size, scs)[0],
            None => self.cp_length,
        };

        let mut ssb = Vec::with_capacity(first_cp_length + SSB_SYMBOLS * modulator.symbol_length());
        for (l, column) in grid.columns().into_iter().enumerate() {
            let cp_length = if l == 0 { first_cp_length } else { self.cp_length };
            ssb.extend(modulator.modulate_symbol_with_cp(&column.to_vec(), cp_length)?);
        }

        let mut samples = Vec::with_capacity(self.leading + ssb.len() + self.trailing);
        samples.resize(self.leading, Complex32::new(0.0, 0.0));
        samples.extend(ssb.iter().map(|&s| s * self.amplitude));
        samples.resize(samples.len() + self.trailing, Complex32::new(0.0, 0.0));

        if self.noise_power > 0.0 {
            // Half the power on each of I and Q
            let normal = Normal::new(0.0, (self.noise_power / 2.0).sqrt()).map_err(|e| {
                PhyError::InvalidConfiguration(format!(
                    "Invalid noise power {}: {}", self.noise_power, e
                ))
            })?;
            for sample in samples.iter_mut() {
                *sample += Complex32::new(normal.sample(&mut rng), normal.sample(&mut rng));
            }
        }

        debug!("Synthesized SSB: nid2={} start={} total={} samples",
               self.nid2, self.leading, samples.len());

        Ok(SsbWaveform {
            nid2: self.nid2,
            grid,
            samples,
            ssb_start: self.leading,
            fft_size: self.fft_size,
            cp_length: self.cp_length,
            first_cp_length,
        })
    }
}

/// SSB grid with the PSS on symbol 0 and random QPSK on symbols 1-3
pub fn ssb_test_grid(nid2: Nid2, rng: &mut impl Rng) -> Array2<Complex32> {
    let mut grid = Array2::zeros((SSB_SUBCARRIERS, SSB_SYMBOLS));

    let mut pss = vec![Complex32::new(0.0, 0.0); SSB_SUBCARRIERS];
    map_pss(&mut pss, nid2);
    for (k, value) in pss.into_iter().enumerate() {
        grid[(k, 0)] = value;
    }

    for l in 1..SSB_SYMBOLS {
        for k in 0..SSB_SUBCARRIERS {
            let re = if rng.gen::<bool>() { FRAC_1_SQRT_2 } else { -FRAC_1_SQRT_2 };
            let im = if rng.gen::<bool>() { FRAC_1_SQRT_2 } else { -FRAC_1_SQRT_2 };
            grid[(k, l)] = Complex32::new(re, im);
        }
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::mean_power;

    #[test]
    fn test_layout() {
        let waveform = SsbSynthesizer::new(Nid2::new(1).unwrap())
            .leading(100)
            .trailing(50)
            .build()
            .unwrap();

        assert_eq!(waveform.samples.len(), 100 + 1096 + 50);
        assert_eq!(waveform.ssb_start, 100);
        assert_eq!(waveform.peak_index(), 373);
        assert!(waveform.samples[..100].iter().all(|s| s.norm_sqr() == 0.0));
        assert!(waveform.samples[1196..].iter().all(|s| s.norm_sqr() == 0.0));
    }

    #[test]
    fn test_grid_content() {
        let mut rng = StdRng::seed_from_u64(3);
        let grid = ssb_test_grid(Nid2::new(0).unwrap(), &mut rng);

        // PSS only on subcarriers 56..=182 of symbol 0
        assert_eq!(grid[(55, 0)], Complex32::new(0.0, 0.0));
        assert_eq!(grid[(56, 0)].norm(), 1.0);
        assert_eq!(grid[(182, 0)].norm(), 1.0);
        assert_eq!(grid[(183, 0)], Complex32::new(0.0, 0.0));

        for l in 1..SSB_SYMBOLS {
            for k in 0..SSB_SUBCARRIERS {
                assert!((grid[(k, l)].norm() - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_seed_is_deterministic() {
        let nid2 = Nid2::new(2).unwrap();
        let a = SsbSynthesizer::new(nid2).seed(9).noise_power(0.1).build().unwrap();
        let b = SsbSynthesizer::new(nid2).seed(9).noise_power(0.1).build().unwrap();
        assert_eq!(a.samples, b.samples);
    }

    #[test]
    fn test_slot_boundary_long_cp() {
        let waveform = SsbSynthesizer::new(Nid2::new(1).unwrap())
            .slot_boundary(SubcarrierSpacing::Scs30)
            .leading(100)
            .build()
            .unwrap();

        assert_eq!(waveform.first_cp_length, 22);
        assert_eq!(waveform.samples.len(), 100 + 1096 + 4);
        assert_eq!(waveform.peak_index(), 100 + 22 + 255);
        assert_eq!(waveform.detection_start(), 104);

        let waveform = SsbSynthesizer::new(Nid2::new(1).unwrap())
            .slot_boundary(SubcarrierSpacing::Scs15)
            .build()
            .unwrap();
        assert_eq!(waveform.first_cp_length, 20);
        assert_eq!(waveform.detection_start(), 2);
    }

    #[test]
    fn test_noise_power() {
        let waveform = SsbSynthesizer::new(Nid2::new(0).unwrap())
            .leading(20_000)
            .noise_power(0.5)
            .seed(11)
            .build()
            .unwrap();

        let power = mean_power(&waveform.samples[..20_000]);
        assert!((power - 0.5).abs() < 0.025, "noise power {}", power);

        // I and Q each carry half
        let i_power: f32 = waveform.samples[..20_000].iter().map(|s| s.re * s.re).sum::<f32>() / 20_000.0;
        assert!((i_power - 0.25).abs() < 0.0125, "I power {}", i_power);
    }

    #[test]
    fn test_negative_noise_power_ignored() {
        let waveform = SsbSynthesizer::new(Nid2::new(0).unwrap())
            .leading(10)
            .noise_power(-1.0)
            .build()
            .unwrap();
        assert!(waveform.samples[..10].iter().all(|s| s.norm_sqr() == 0.0));
    }
}

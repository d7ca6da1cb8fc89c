//! Primary Synchronization Signal reference generation
//!
//! Implements the PSS sequence of 3GPP TS 38.211 section 7.4.2.2 and derives
//! the time-domain matched filter kernels used by the correlator bank.

use crate::{PhyError, SSB_SUBCARRIERS};
use common::types::Nid2;
use num_complex::Complex32;
use rustfft::FftPlanner;
use tracing::{debug, trace};

/// PSS sequence length
pub const PSS_LENGTH: usize = 127;

/// First SSB subcarrier occupied by the PSS
pub const PSS_FIRST_SUBCARRIER: usize = 56;

/// Generate the BPSK PSS sequence d_PSS(n) for one NID2
pub fn generate_pss_sequence(nid2: Nid2) -> Vec<f32> {
    // x(6..0) = 1 1 1 0 1 1 0
    let mut x = vec![0u8; PSS_LENGTH + 7];
    x[1] = 1;
    x[2] = 1;
    x[4] = 1;
    x[5] = 1;
    x[6] = 1;

    // x(i+7) = (x(i+4) + x(i)) mod 2
    for i in 0..PSS_LENGTH {
        x[i + 7] = (x[i + 4] + x[i]) % 2;
    }

    let m_shift = (43 * nid2.index()) % PSS_LENGTH;
    trace!("PSS cyclic shift M = 43 * {} mod 127 = {}", nid2, m_shift);

    (0..PSS_LENGTH)
        .map(|n| 1.0 - 2.0 * x[(n + m_shift) % PSS_LENGTH] as f32)
        .collect()
}

/// Map the PSS of `nid2` onto a 240-subcarrier SSB column
pub fn map_pss(column: &mut [Complex32], nid2: Nid2) {
    debug_assert_eq!(column.len(), SSB_SUBCARRIERS);
    for (n, d) in generate_pss_sequence(nid2).into_iter().enumerate() {
        column[PSS_FIRST_SUBCARRIER + n] = Complex32::new(d, 0.0);
    }
}

/// FFT bin holding SSB subcarrier `k` of an `fft_size`-point grid centred on DC
pub fn ssb_subcarrier_to_bin(k: usize, fft_size: usize) -> usize {
    let offset = k as isize - (SSB_SUBCARRIERS / 2) as isize;
    offset.rem_euclid(fft_size as isize) as usize
}

/// Reference PSS waveforms and matched filter kernels for all three NID2 values
#[derive(Debug, Clone)]
pub struct PssReference {
    fft_size: usize,
    /// Unit energy time-domain PSS symbol, CP excluded
    time_domain: [Vec<Complex32>; 3],
    /// Time-reversed conjugate of `time_domain`
    kernels: [Vec<Complex32>; 3],
}

impl PssReference {
    /// Build the references for an `fft_size`-point OFDM symbol
    pub fn new(fft_size: usize) -> Result<Self, PhyError> {
        if fft_size < SSB_SUBCARRIERS {
            return Err(PhyError::InvalidConfiguration(format!(
                "FFT size {} too small for the SSB", fft_size
            )));
        }

        let mut planner = FftPlanner::<f32>::new();
        let ifft = planner.plan_fft_inverse(fft_size);

        let time_domain = Nid2::ALL.map(|nid2| {
            let mut column = vec![Complex32::new(0.0, 0.0); SSB_SUBCARRIERS];
            map_pss(&mut column, nid2);

            let mut buffer = vec![Complex32::new(0.0, 0.0); fft_size];
            for (k, value) in column.iter().enumerate() {
                buffer[ssb_subcarrier_to_bin(k, fft_size)] = *value;
            }
            ifft.process(&mut buffer);

            let energy: f32 = buffer.iter().map(|s| s.norm_sqr()).sum();
            let scale = 1.0 / energy.sqrt();
            buffer.iter_mut().for_each(|s| *s *= scale);
            buffer
        });

        let kernels = time_domain.clone().map(|symbol| {
            symbol.iter().rev().map(|s| s.conj()).collect::<Vec<_>>()
        });

        debug!("Built PSS matched filter kernels, {} taps each", fft_size);

        Ok(Self {
            fft_size,
            time_domain,
            kernels,
        })
    }

    /// FFT size the references were built for
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Matched filter coefficients for `nid2`
    pub fn kernel(&self, nid2: Nid2) -> &[Complex32] {
        &self.kernels[nid2.index()]
    }

    /// Unit energy time-domain PSS symbol for `nid2`
    pub fn time_domain(&self, nid2: Nid2) -> &[Complex32] {
        &self.time_domain[nid2.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid2(value: u8) -> Nid2 {
        Nid2::new(value).unwrap()
    }

    #[test]
    fn test_pss_sequence_start() {
        // d_PSS for NID2=0 starts with x(0..7) = 0 1 1 0 1 1 1
        let seq = generate_pss_sequence(nid2(0));
        assert_eq!(seq.len(), PSS_LENGTH);
        assert_eq!(&seq[..7], &[1.0, -1.0, -1.0, 1.0, -1.0, -1.0, -1.0]);
    }

    #[test]
    fn test_pss_sequences_are_shifts() {
        let base = generate_pss_sequence(nid2(0));
        let seq = generate_pss_sequence(nid2(2));
        for n in 0..PSS_LENGTH {
            assert_eq!(seq[n], base[(n + 86) % PSS_LENGTH]);
        }
    }

    #[test]
    fn test_subcarrier_mapping() {
        assert_eq!(ssb_subcarrier_to_bin(120, 256), 0);
        assert_eq!(ssb_subcarrier_to_bin(0, 256), 136);
        assert_eq!(ssb_subcarrier_to_bin(239, 256), 119);
    }

    #[test]
    fn test_kernels_unit_energy() {
        let reference = PssReference::new(256).unwrap();
        for nid2 in Nid2::ALL {
            let kernel = reference.kernel(nid2);
            assert_eq!(kernel.len(), 256);
            let energy: f32 = kernel.iter().map(|s| s.norm_sqr()).sum();
            assert!((energy - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_kernel_is_reversed_conjugate() {
        let reference = PssReference::new(256).unwrap();
        let td = reference.time_domain(nid2(1));
        let kernel = reference.kernel(nid2(1));
        assert_eq!(kernel[0], td[255].conj());
        assert_eq!(kernel[255], td[0].conj());
    }

    #[test]
    fn test_small_fft_rejected() {
        assert!(PssReference::new(128).is_err());
    }
}

//! Common Utilities
//!
//! Provides utility functions used across the SSB receiver

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_complex::Complex32;
use tracing::trace;

/// Size of one interleaved cf32 sample in bytes
pub const CF32_SAMPLE_BYTES: usize = 8;

/// Convert a power ratio in dB to linear scale
pub fn db_to_power(db: f32) -> f32 {
    10.0_f32.powf(db / 10.0)
}

/// Convert a linear power ratio to dB
pub fn power_to_db(power: f32) -> f32 {
    10.0 * power.log10()
}

/// Mean power of a block of samples
pub fn mean_power(samples: &[Complex32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().map(|s| s.norm_sqr()).sum::<f32>() / samples.len() as f32
}

/// Pack samples as interleaved little-endian f32 I/Q (cf32)
pub fn iq_to_bytes(samples: &[Complex32]) -> Bytes {
    let mut bytes = BytesMut::with_capacity(samples.len() * CF32_SAMPLE_BYTES);

    for sample in samples {
        bytes.put_f32_le(sample.re);
        bytes.put_f32_le(sample.im);
    }

    bytes.freeze()
}

/// Unpack interleaved little-endian f32 I/Q (cf32)
///
/// A trailing partial sample is ignored.
pub fn iq_from_bytes(data: &[u8]) -> Vec<Complex32> {
    let count = data.len() / CF32_SAMPLE_BYTES;
    let mut buf = &data[..count * CF32_SAMPLE_BYTES];
    let mut samples = Vec::with_capacity(count);

    while buf.has_remaining() {
        let re = buf.get_f32_le();
        let im = buf.get_f32_le();
        samples.push(Complex32::new(re, im));
    }

    if data.len() % CF32_SAMPLE_BYTES != 0 {
        trace!("Dropped {} trailing bytes of a partial cf32 sample",
               data.len() % CF32_SAMPLE_BYTES);
    }

    samples
}

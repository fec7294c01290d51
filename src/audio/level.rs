//! Loudness estimation for raw PCM16 chunks
//!
//! Every chunk delivered by an [`AudioSource`](super::AudioSource) is reduced to
//! a single integer level on an uncalibrated `20 * log10(rms)` scale. The
//! conversion is total: empty, odd-length or silent chunks all map to 0.

/// Loudness of one chunk on the decibel-like scale. Never negative.
pub type LoudnessSample = u32;

/// Bytes per encoded sample (signed 16-bit little-endian)
pub const BYTES_PER_SAMPLE: usize = 2;

/// Decode interleaved i16 LE samples. A dangling trailing byte is skipped.
pub fn decode_samples(chunk: &[u8]) -> impl Iterator<Item = i16> + '_ {
    chunk
        .chunks_exact(BYTES_PER_SAMPLE)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

/// Encode samples as i16 LE bytes, the wire format every source emits.
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Estimate the loudness of one chunk.
///
/// Sum of squares is accumulated in `u64` (a full-scale sample squares to
/// 2^30, so billions of samples fit before overflow). Zero complete samples
/// is treated as a mean square of 0.
pub fn estimate_level(chunk: &[u8]) -> LoudnessSample {
    let mut energy: u64 = 0;
    let mut count: u64 = 0;

    for sample in decode_samples(chunk) {
        let magnitude = u64::from(sample.unsigned_abs());
        energy += magnitude * magnitude;
        count += 1;
    }

    let mean_square = if count == 0 {
        0.0
    } else {
        energy as f64 / count as f64
    };

    rms_to_level(mean_square.sqrt())
}

/// Convert an RMS amplitude (in raw i16 units) to a level.
///
/// RMS is floored at 1 before the logarithm so silence maps to exactly 0.
pub fn rms_to_level(rms: f64) -> LoudnessSample {
    let rms = if rms.is_nan() { 1.0 } else { rms.max(1.0) };
    let db = 20.0 * rms.log10();
    db.round().max(0.0) as LoudnessSample
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunk_is_silent() {
        assert_eq!(estimate_level(&[]), 0);
    }

    #[test]
    fn test_single_dangling_byte_is_silent() {
        assert_eq!(estimate_level(&[0x7F]), 0);
    }

    #[test]
    fn test_zero_samples_are_silent() {
        let chunk = vec![0u8; 3200];
        assert_eq!(estimate_level(&chunk), 0);
    }

    #[test]
    fn test_reference_chunk() {
        // {10000, -10000} -> rms 10000 -> 80
        let chunk = [0x10, 0x27, 0xF0, 0xD8];
        assert_eq!(estimate_level(&chunk), 80);
    }

    #[test]
    fn test_trailing_byte_ignored() {
        let chunk = [0x10, 0x27, 0xF0, 0xD8];
        let with_tail = [0x10, 0x27, 0xF0, 0xD8, 0xAB];
        assert_eq!(estimate_level(&with_tail), estimate_level(&chunk));
    }

    #[test]
    fn test_full_scale_negative() {
        // i16::MIN squared still fits; 20*log10(32768) ~= 90.3
        let chunk = encode_samples(&[i16::MIN; 160]);
        assert_eq!(estimate_level(&chunk), 90);
    }

    #[test]
    fn test_rms_at_or_below_one_is_zero() {
        assert_eq!(rms_to_level(0.0), 0);
        assert_eq!(rms_to_level(0.5), 0);
        assert_eq!(rms_to_level(1.0), 0);
        assert_eq!(rms_to_level(f64::NAN), 0);
    }

    #[test]
    fn test_rms_to_level_rounding() {
        assert_eq!(rms_to_level(10.0), 20);
        assert_eq!(rms_to_level(100.0), 40);
        // 20*log10(2) = 6.02
        assert_eq!(rms_to_level(2.0), 6);
    }

    #[test]
    fn test_decode_samples() {
        let samples: Vec<i16> = decode_samples(&[0x10, 0x27, 0xF0, 0xD8, 0x01]).collect();
        assert_eq!(samples, vec![10000, -10000]);
    }

    #[test]
    fn test_encode_samples_layout() {
        assert_eq!(encode_samples(&[10000, -10000]), vec![0x10, 0x27, 0xF0, 0xD8]);
        assert!(encode_samples(&[]).is_empty());
    }
}

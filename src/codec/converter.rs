//! Stateless native → wire sample conversion
//!
//! Converters append to a caller-owned byte buffer so the producer can reuse
//! one allocation for every chunk. Trailing bytes that do not form a whole
//! value are dropped.

use super::format::{SampleFormat, WireFormat};

/// Scale of the unsigned 8-bit midpoint (`u8::MAX / 2`)
const U8_SCALE: f32 = 127.5;

/// Full-scale magnitude of signed 16-bit values
const I16_SCALE: f32 = 32768.0;

/// Convert one unsigned 8-bit value to float in approximately [-1, 1)
#[inline]
pub fn u8_to_f32(value: u8) -> f32 {
    value as f32 / U8_SCALE - 1.0
}

/// Convert one signed 16-bit value to float in [-1, 1)
#[inline]
pub fn i16_to_f32(value: i16) -> f32 {
    value as f32 / I16_SCALE
}

/// Convert one float value to unsigned 8-bit, clipping outside [-1, 1]
#[inline]
pub fn f32_to_u8(value: f32) -> u8 {
    ((value + 1.0) * U8_SCALE).round().clamp(0.0, 255.0) as u8
}

/// Convert one signed 16-bit value to unsigned 8-bit by keeping the high byte
#[inline]
pub fn i16_to_u8(value: i16) -> u8 {
    ((value as i32 + 32768) >> 8) as u8
}

/// Exchange I and Q of every interleaved pair in place.
///
/// Works on raw bytes so it applies to any format; a trailing partial pair
/// is left untouched. Applying it twice restores the input.
pub fn swap_iq(data: &mut [u8], value_size: usize) {
    let pair = value_size * 2;
    for chunk in data.chunks_exact_mut(pair) {
        let (i, q) = chunk.split_at_mut(value_size);
        i.swap_with_slice(q);
    }
}

/// Transcode a chunk of native bytes into `out` in the wire format
pub fn convert(input: &[u8], native: SampleFormat, wire: WireFormat, out: &mut Vec<u8>) {
    out.reserve(input.len() / native.value_size() * wire.value_size());

    match (native, wire) {
        (SampleFormat::U8, WireFormat::U8) => out.extend_from_slice(input),
        (SampleFormat::U8, WireFormat::F32) => {
            for &v in input {
                out.extend_from_slice(&u8_to_f32(v).to_le_bytes());
            }
        }
        (SampleFormat::I16, WireFormat::U8) => {
            out.extend(input.chunks_exact(2).map(|b| i16_to_u8(i16::from_ne_bytes([b[0], b[1]]))));
        }
        (SampleFormat::I16, WireFormat::F32) => {
            for b in input.chunks_exact(2) {
                let v = i16_to_f32(i16::from_ne_bytes([b[0], b[1]]));
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        (SampleFormat::F32, WireFormat::U8) => {
            out.extend(
                input
                    .chunks_exact(4)
                    .map(|b| f32_to_u8(f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))),
            );
        }
        (SampleFormat::F32, WireFormat::F32) => {
            for b in input.chunks_exact(4) {
                let v = f32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_f32(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn test_u8_to_f32_range() {
        assert!((u8_to_f32(0) + 1.0).abs() < 1e-6);
        assert!(u8_to_f32(255) <= 1.0);
        assert!(u8_to_f32(255) > 0.99);
        assert!(u8_to_f32(128).abs() < 0.01);
    }

    #[test]
    fn test_u8_round_trip() {
        let recovered = (0..=255u8)
            .filter(|&v| {
                let back = f32_to_u8(u8_to_f32(v));
                (back as i16 - v as i16).abs() <= 1
            })
            .count();
        assert!(recovered >= 254, "only {recovered} values recovered");
    }

    #[test]
    fn test_f32_to_u8_clips() {
        assert_eq!(f32_to_u8(-3.0), 0);
        assert_eq!(f32_to_u8(7.5), 255);
        assert_eq!(f32_to_u8(-1.0), 0);
        assert_eq!(f32_to_u8(1.0), 255);
    }

    #[test]
    fn test_i16_normalization() {
        assert_eq!(i16_to_f32(0), 0.0);
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
        assert!(i16_to_f32(i16::MAX) < 1.0);
        assert_eq!(i16_to_u8(i16::MIN), 0);
        assert_eq!(i16_to_u8(i16::MAX), 255);
        assert_eq!(i16_to_u8(0), 128);
    }

    #[test]
    fn test_convert_u8_to_f32_chunk() {
        let mut out = Vec::new();
        convert(&[0, 255, 128, 127], SampleFormat::U8, WireFormat::F32, &mut out);
        let values = decode_f32(&out);
        assert_eq!(values.len(), 4);
        assert!((values[0] + 1.0).abs() < 1e-6);
        assert!((values[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_convert_i16_to_u8_chunk() {
        let input: Vec<u8> = [i16::MIN, 0, i16::MAX, -256]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let mut out = Vec::new();
        convert(&input, SampleFormat::I16, WireFormat::U8, &mut out);
        assert_eq!(out, vec![0, 128, 255, 127]);
    }

    #[test]
    fn test_convert_f32_passthrough() {
        let input: Vec<u8> = [0.25f32, -0.5, 1.5, -2.0]
            .iter()
            .flat_map(|v| v.to_ne_bytes())
            .collect();
        let mut out = Vec::new();
        convert(&input, SampleFormat::F32, WireFormat::F32, &mut out);
        assert_eq!(decode_f32(&out), vec![0.25, -0.5, 1.5, -2.0]);
    }

    #[test]
    fn test_convert_appends() {
        let mut out = vec![9u8];
        convert(&[1, 2], SampleFormat::U8, WireFormat::U8, &mut out);
        assert_eq!(out, vec![9, 1, 2]);
    }

    #[test]
    fn test_swap_iq_pairs() {
        let mut data = vec![1u8, 2, 3, 4, 5];
        swap_iq(&mut data, 1);
        assert_eq!(data, vec![2, 1, 4, 3, 5]);

        let mut wide: Vec<u8> = (0..8).collect();
        swap_iq(&mut wide, 2);
        assert_eq!(wide, vec![2, 3, 0, 1, 6, 7, 4, 5]);
    }

    proptest! {
        #[test]
        fn swap_iq_is_self_inverse(data in proptest::collection::vec(any::<u8>(), 0..512),
                                   size in prop_oneof![Just(1usize), Just(2usize), Just(4usize)]) {
            let mut swapped = data.clone();
            swap_iq(&mut swapped, size);
            swap_iq(&mut swapped, size);
            prop_assert_eq!(swapped, data);
        }
    }
}

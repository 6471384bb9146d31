// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Order-preserving encoding for signed logical positions.
//!
//! Sequences are biased by [`ZERO_POINT`] and serialized as an 8-byte
//! big-endian key, so lexicographic key order matches numeric sequence
//! order across the whole signed range. `ZERO_POINT` mirrors the reference
//! implementation's `MaxUint64 / 1_000_000_000` offset.

/// Bias applied to a signed sequence before it is stored as an unsigned key.
pub const ZERO_POINT: u64 = u64::MAX / 1_000_000_000;

/// Encodes a signed logical position as a fixed-width, order-preserving key.
pub fn encode_seq(seq: i64) -> [u8; 8] {
    let biased = ZERO_POINT.wrapping_add(seq as u64);
    biased.to_be_bytes()
}

/// Decodes a key produced by [`encode_seq`] back into a signed position.
///
/// Returns `None` if `bytes` is not exactly 8 bytes wide.
pub fn decode_seq(bytes: &[u8]) -> Option<i64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    let biased = u64::from_be_bytes(arr);
    Some(biased.wrapping_sub(ZERO_POINT) as i64)
}

/// Encodes an already-biased unsigned sequence (used for queue head/tail,
/// which track the biased value directly rather than a signed position).
pub fn encode_biased(biased: u64) -> [u8; 8] {
    biased.to_be_bytes()
}

/// Decodes a key back into its biased unsigned form.
pub fn decode_biased(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_preserves_order_across_zero() {
        let keys: Vec<[u8; 8]> = [-3_i64, -2, -1, 0, 1, 2, 3]
            .iter()
            .map(|&s| encode_seq(s))
            .collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should sort before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn roundtrip() {
        for s in [i64::MIN / 2, -1, 0, 1, 42, i64::MAX / 2] {
            let encoded = encode_seq(s);
            assert_eq!(decode_seq(&encoded), Some(s));
        }
    }

    #[test]
    fn decode_rejects_wrong_width() {
        assert_eq!(decode_seq(&[0u8; 4]), None);
        assert_eq!(decode_seq(&[0u8; 9]), None);
    }

    #[test]
    fn biased_roundtrip() {
        let biased = ZERO_POINT + 7;
        let key = encode_biased(biased);
        assert_eq!(decode_biased(&key), Some(biased));
    }
}

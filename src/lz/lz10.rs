//! LZ10 - forward LZSS compression tagged `0x10`.
//!
//! ## Layout
//! ```text
//! [0x00] Tag byte (0x10)                (1 byte)
//! [0x01] Decompressed size              (u24 LE)
//! [0x04] Token stream (see `lz::core`)
//! ```
//!
//! A back-reference token is a 16-bit big-endian word `(length-3) << 12 |
//! (distance-1)`; copying overlaps with bytes the back-reference itself is
//! producing, which is what gives runs of a single byte a compact encoding.

use super::core::{decode_tokens, encode_tokens};
use crate::error::{Error, Result};

const TAG: u8 = 0x10;

/// Decompress an LZ10 stream.
///
/// Returns [`Error::InvalidMagic`] if the first byte is not `0x10`, or
/// [`Error::OutOfBounds`] if the stream ends before the declared
/// decompressed size is reached.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.first() != Some(&TAG) {
        return Err(Error::InvalidMagic {
            pos: 0,
            expected: &[TAG],
            found: data.first().copied().into_iter().collect(),
        });
    }
    if data.len() < 4 {
        return Err(Error::OutOfBounds { pos: data.len() });
    }
    let decompressed_size =
        (data[1] as usize) | (data[2] as usize) << 8 | (data[3] as usize) << 16;
    decode_tokens(&data[4..], decompressed_size)
}

/// Compress `data` as LZ10.
///
/// Uses a greedy longest-match search bounded by the format's limits
/// (match length 3..=18, distance 1..=0x1000); any other valid parse would
/// decompress to the same bytes (see [`decompress`]'s overlap semantics).
pub fn compress(data: &[u8]) -> Vec<u8> {
    let len = data.len();
    let mut out = Vec::with_capacity(len + len / 8 + 4);
    out.push(TAG);
    out.push((len & 0xFF) as u8);
    out.push(((len >> 8) & 0xFF) as u8);
    out.push(((len >> 16) & 0xFF) as u8);
    out.extend(encode_tokens(data));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_arbitrary_bytes() {
        let data: Vec<u8> = (0..500).map(|i| (i * 37 % 251) as u8).collect();
        let compressed = compress(&data);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn roundtrip_empty() {
        let compressed = compress(&[]);
        assert_eq!(decompress(&compressed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn roundtrip_repetitive_run() {
        let data = vec![0x41u8; 200];
        let compressed = compress(&data);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn known_vector_from_spec() {
        // "This is some data to compress" compressed by a reference encoder.
        let input = b"This is some data to compress";
        let expected: &[u8] = &[
            0x10, 0x1d, 0x00, 0x00, 0x04, 0x54, 0x68, 0x69, 0x73, 0x20, 0x00, 0x02, 0x73, 0x6f,
            0x00, 0x6d, 0x65, 0x20, 0x64, 0x61, 0x74, 0x61, 0x20, 0x00, 0x74, 0x6f, 0x20, 0x63,
            0x6f, 0x6d, 0x70, 0x72, 0x00, 0x65, 0x73, 0x73, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        assert_eq!(decompress(expected).unwrap(), input);
    }

    #[test]
    fn rejects_bad_magic() {
        let data = [0x11, 0x00, 0x00, 0x00];
        assert!(matches!(decompress(&data), Err(Error::InvalidMagic { .. })));
    }

    #[test]
    fn decompress_idempotent_across_parses() {
        // Two differently-parsed (but both valid) encodings of the same
        // string must decompress to the same bytes.
        let greedy = compress(b"abcabcabcabc");
        let literal: Vec<u8> = {
            let data = b"abcabcabcabc";
            let mut v = vec![TAG, data.len() as u8, 0, 0];
            // Encode entirely as literals: two flag bytes of 0x00 covering 12 bytes.
            v.push(0x00);
            v.extend_from_slice(&data[..8]);
            v.push(0x00);
            v.extend_from_slice(&data[8..]);
            v
        };
        assert_eq!(decompress(&greedy).unwrap(), decompress(&literal).unwrap());
    }
}

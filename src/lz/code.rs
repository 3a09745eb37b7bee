//! Code-compression - the reverse-direction, in-place LZSS variant used for
//! ARM9 main code and overlays.
//!
//! ## Layout
//! ```text
//! [ uncompressed prefix (left untouched) ]
//! [ compressed region (read tail-to-head) ]
//! [ filler ]
//! [ 8-byte footer ]
//! ```
//!
//! The footer holds two little-endian `u32` words:
//!
//! * `word0 = header_length << 24 | compressed_size` - `header_length`
//!   counts the footer plus any filler bytes, so `compressed_region`
//!   starts at `file_len - header_length - compressed_size`.
//! * `word1 = decompressed_size_delta` - how many bytes larger the
//!   decompressed region is than the compressed one. A delta of zero means
//!   "not compressed"; the whole input is returned unchanged.
//!
//! Running the shared token grammar (see [`super::core`]) over a *reversed*
//! copy of the bytes, then reversing the token stream back, is equivalent to
//! running it tail-to-head over the original bytes - which is exactly what
//! this format needs, without duplicating the grammar.

use super::core::{decode_tokens, encode_tokens};
use crate::error::{Error, Result};

/// Bytes of filler the ARM9 post-adjustment inserts ahead of the footer, to
/// match how the bootloader relocates the decompressed block.
const ARM9_RELOC_ADJUST: u32 = 4;
const FOOTER_LEN: u32 = 8;

/// Decompress a code-compressed blob.
///
/// Returns the input unchanged if the footer's `decompressed_size_delta` is
/// zero (the documented "not compressed" escape hatch).
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 8 {
        return Err(Error::OutOfBounds { pos: data.len() });
    }
    let file_len = data.len();
    let word0 = u32::from_le_bytes(data[file_len - 8..file_len - 4].try_into().unwrap());
    let delta = u32::from_le_bytes(data[file_len - 4..file_len].try_into().unwrap());

    if delta == 0 {
        return Ok(data.to_vec());
    }

    let header_length = (word0 >> 24) as usize;
    let compressed_size = (word0 & 0x00FF_FFFF) as usize;

    let trailer_start = file_len
        .checked_sub(header_length)
        .ok_or(Error::OutOfBounds { pos: file_len })?;
    let compressed_region_start = trailer_start
        .checked_sub(compressed_size)
        .ok_or(Error::OutOfBounds { pos: trailer_start })?;

    let compressed_region = &data[compressed_region_start..trailer_start];
    let tail_size = compressed_size + delta as usize;

    let reversed_tokens: Vec<u8> = compressed_region.iter().rev().copied().collect();
    let mut reversed_tail = decode_tokens(&reversed_tokens, tail_size)?;
    reversed_tail.reverse();

    let mut out = Vec::with_capacity(compressed_region_start + reversed_tail.len());
    out.extend_from_slice(&data[..compressed_region_start]);
    out.extend_from_slice(&reversed_tail);
    Ok(out)
}

/// Compress `data` for in-place ARM9/overlay decompression.
///
/// The whole input is treated as compressible region (no uncompressed
/// prefix is chosen). If the token stream would not be smaller than the
/// input - incompressible data, where LZSS flag-byte overhead can exceed
/// any savings - the "not compressed" footer (`delta = 0`) is emitted
/// instead and `data` is stored verbatim, since a negative
/// `decompressed_size_delta` cannot be represented.
///
/// `arm9_mode` applies the small constant relocation adjustment the boot
/// loader expects for ARM9 blocks; it does not change the decompressed
/// result, since the decompressor re-derives the footer geometry from the
/// file itself.
pub fn compress(data: &[u8], arm9_mode: bool) -> Vec<u8> {
    let reversed: Vec<u8> = data.iter().rev().copied().collect();
    let tokens = encode_tokens(&reversed);

    if tokens.len() >= data.len() {
        let mut out = data.to_vec();
        append_footer(&mut out, 0, 0, arm9_mode);
        return out;
    }

    let compressed_region: Vec<u8> = tokens.into_iter().rev().collect();
    let compressed_size = compressed_region.len() as u32;
    let delta = data.len() as u32 - compressed_size;

    let mut out = Vec::with_capacity(compressed_region.len() + 12);
    out.extend_from_slice(&compressed_region);
    append_footer(&mut out, compressed_size, delta, arm9_mode);
    out
}

fn append_footer(out: &mut Vec<u8>, compressed_size: u32, delta: u32, arm9_mode: bool) {
    let filler = if arm9_mode { ARM9_RELOC_ADJUST } else { 0 };
    out.extend(std::iter::repeat_n(0u8, filler as usize));
    let header_length = FOOTER_LEN + filler;
    let word0 = (header_length << 24) | (compressed_size & 0x00FF_FFFF);
    out.extend_from_slice(&word0.to_le_bytes());
    out.extend_from_slice(&delta.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_compressible_data_both_modes() {
        let data: Vec<u8> = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbccccccccccccccccc".to_vec();
        for arm9_mode in [false, true] {
            let compressed = compress(&data, arm9_mode);
            assert_eq!(decompress(&compressed).unwrap(), data);
        }
    }

    #[test]
    fn roundtrip_incompressible_data_falls_back_to_stored() {
        let data: Vec<u8> = (0..64).map(|i| (i * 53 + 7) as u8).collect();
        let compressed = compress(&data, false);
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn roundtrip_empty() {
        let compressed = compress(&[], false);
        assert_eq!(decompress(&compressed).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn not_compressed_footer_returns_input_verbatim() {
        // delta = 0 must pass through untouched, even if word0 is garbage.
        let mut data = vec![0xAAu8; 16];
        let len = data.len();
        data[len - 8..len - 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        data[len - 4..len].copy_from_slice(&0u32.to_le_bytes());
        assert_eq!(decompress(&data).unwrap(), data);
    }
}

//! Shared token grammar for the LZ10 family: a flag byte followed by up to
//! eight literal-or-back-reference tokens, repeated until the requested
//! output length is reached.
//!
//! [`lz10`](super::lz10) runs this head-to-tail over the plain byte order.
//! [`code`](super::code) runs it head-to-tail over a *reversed* copy of the
//! data and reverses the result, which is algebraically identical to
//! running the same grammar tail-to-head over the original bytes - exactly
//! what the in-place ARM9/overlay decompressor does.

use crate::error::{Error, Result};

const MIN_MATCH: usize = 3;
const MAX_MATCH: usize = 0x12;
const MAX_DISTANCE: usize = 0x1000;

/// Encode `data` as a stream of flag-prefixed literal/back-reference tokens
/// (no tag byte, no length prefix).
pub(super) fn encode_tokens(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8 + 1);
    let mut pos = 0usize;
    while pos < data.len() {
        let flag_index = out.len();
        out.push(0);
        let mut flags = 0u8;
        for i in 0..8 {
            if pos >= data.len() {
                break;
            }
            if let Some((distance, length)) = find_longest_match(data, pos) {
                flags |= 0x80 >> i;
                let word = ((length - 3) << 12) | (distance - 1);
                out.push((word >> 8) as u8);
                out.push((word & 0xFF) as u8);
                pos += length;
            } else {
                out.push(data[pos]);
                pos += 1;
            }
        }
        out[flag_index] = flags;
    }
    out
}

/// Decode a token stream produced by [`encode_tokens`] until `decompressed_len`
/// output bytes have been produced.
pub(super) fn decode_tokens(tokens: &[u8], decompressed_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(decompressed_len);
    let mut pos = 0usize;
    let next = |pos: &mut usize| -> Result<u8> {
        let b = *tokens.get(*pos).ok_or(Error::OutOfBounds { pos: *pos })?;
        *pos += 1;
        Ok(b)
    };

    while out.len() < decompressed_len {
        let flags = next(&mut pos)?;
        for i in 0..8 {
            if out.len() >= decompressed_len {
                break;
            }
            let is_reference = flags & (0x80 >> i) != 0;
            if !is_reference {
                out.push(next(&mut pos)?);
                continue;
            }
            let hi = next(&mut pos)?;
            let lo = next(&mut pos)?;
            let word = (hi as usize) << 8 | lo as usize;
            let length = (word >> 12) + 3;
            let distance = (word & 0x0FFF) + 1;
            if distance > out.len() {
                return Err(Error::OutOfBounds { pos });
            }
            let start = out.len() - distance;
            for j in 0..length {
                if out.len() >= decompressed_len {
                    break;
                }
                out.push(out[start + j]);
            }
        }
    }
    Ok(out)
}

/// Find the longest back-reference ending before `pos`, if any qualifies
/// (length >= 3, distance in 1..=0x1000).
fn find_longest_match(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let window_start = pos.saturating_sub(MAX_DISTANCE);
    let max_len = MAX_MATCH.min(data.len() - pos);
    if max_len < MIN_MATCH {
        return None;
    }

    let mut best_len = 0usize;
    let mut best_distance = 0usize;
    for start in window_start..pos {
        let distance = pos - start;
        let mut length = 0usize;
        while length < max_len && data[start + length] == data[pos + length] {
            length += 1;
        }
        if length >= MIN_MATCH && length > best_len {
            best_len = length;
            best_distance = distance;
        }
    }
    if best_len >= MIN_MATCH {
        Some((best_distance, best_len))
    } else {
        None
    }
}

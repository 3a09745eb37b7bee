//! File allocation table: an array of absolute `(start, end)` byte-offset
//! pairs, shared verbatim by the ROM and NARC composites.

use crate::cursor::{Reader, Writer};
use crate::error::Result;

pub const RECORD_LEN: usize = 8;

/// Parse a FAT blob; the entry count is implied by `data.len() / 8`.
pub fn parse(data: &[u8]) -> Result<Vec<(u32, u32)>> {
    let count = data.len() / RECORD_LEN;
    let mut r = Reader::new(data, true);
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let start = r.read_u32()?;
        let end = r.read_u32()?;
        entries.push((start, end));
    }
    Ok(entries)
}

pub fn emit(entries: &[(u32, u32)]) -> Vec<u8> {
    let mut w = Writer::new(true);
    for &(start, end) in entries {
        w.write_u32(start);
        w.write_u32(end);
    }
    w.finish().expect("fat emit never uses anchors")
}

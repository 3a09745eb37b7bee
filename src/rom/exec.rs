//! Main-code container: the executable blob an ARM9/ARM7 slot points at,
//! peeled into its residual ("implicit") prefix plus a list of relocatable
//! sections, driven by a "code settings" block reached through a
//! RAM-address pointer the ROM header holds.
//!
//! ## Code-settings block layout
//! ```text
//! [0..4)  compression flags (bit 0 = main code is LZSS code-compressed)
//! [4..8)  section count
//! [8..)   section count * 16-byte records:
//!           source_offset:u32 (relative to the decompressed blob)
//!           ram_dest:u32
//!           length:u32
//!           bss_size:u32
//! [..+4)  self-pointer word: `ram_address_of(code settings block) + 4`,
//!         kept for on-disk format fidelity but not consulted when locating
//!         the block.
//! ```
//! The header's code-settings-pointer-address field holds the RAM address
//! of the block itself (the compression-flags word), not of the
//! self-pointer word - that's what [`MainCode::parse`]/[`MainCode::emit`]
//! agree on.
//!
//! The block is always appended *after* the (optionally compressed)
//! implicit+sections payload, uncompressed, so its flag word sits at a
//! stable offset readable before any decompression happens - the
//! compressor never touches it.

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::lz::code;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub ram_dest: u32,
    pub bss_size: u32,
    pub data: Vec<u8>,
}

/// A parsed main-code blob: the bytes ahead of the code-settings block
/// (the "implicit" first section) plus the enumerated relocatable sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainCode {
    pub implicit: Vec<u8>,
    pub sections: Vec<Section>,
    pub was_compressed: bool,
}

impl MainCode {
    /// `ram_address` is the section's RAM load address (`ExecBlock::ram_address`);
    /// `code_settings_pointer_address` is the header field holding the RAM
    /// address of the code-settings block itself.
    pub fn parse(blob: &[u8], ram_address: u32, code_settings_pointer_address: u32) -> Result<MainCode> {
        let block_offset = code_settings_pointer_address
            .checked_sub(ram_address)
            .ok_or(Error::MalformedRom(crate::error::Context::new(
                0,
                "code-settings pointer address precedes RAM load address",
            )))? as usize;

        let mut r = Reader::new(blob, true);
        r.seek(block_offset);
        let compression_flags = r.read_u32()?;
        let was_compressed = compression_flags & 1 != 0;
        let count = r.read_u32()? as usize;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            let source_offset = r.read_u32()? as usize;
            let ram_dest = r.read_u32()?;
            let length = r.read_u32()? as usize;
            let bss_size = r.read_u32()?;
            records.push((source_offset, ram_dest, length, bss_size));
        }

        let payload = blob
            .get(..block_offset)
            .ok_or(Error::OutOfBounds { pos: block_offset })?;
        let decompressed;
        let data: &[u8] = if was_compressed {
            decompressed = code::decompress(payload)?;
            &decompressed
        } else {
            payload
        };

        let mut sections = Vec::with_capacity(count);
        let implicit_end = records.iter().map(|r| r.0).min().unwrap_or(data.len());
        for (source_offset, ram_dest, length, bss_size) in records {
            let section_data = data
                .get(source_offset..source_offset + length)
                .ok_or(Error::OutOfBounds { pos: source_offset })?
                .to_vec();
            sections.push(Section {
                ram_dest,
                bss_size,
                data: section_data,
            });
        }
        let implicit = data[..implicit_end].to_vec();

        Ok(MainCode {
            implicit,
            sections,
            was_compressed,
        })
    }

    /// Lay the blob back out and, if `compress` is true, code-compress it
    /// (`arm9_mode` selects the ARM9/ARM7 footer adjustment). Returns the
    /// final bytes plus the RAM address of the code-settings block itself -
    /// the value the header's code-settings-pointer field must hold, and
    /// exactly what [`MainCode::parse`] expects back.
    pub fn emit(&self, ram_address: u32, compress: bool, arm9_mode: bool) -> (Vec<u8>, u32) {
        let mut w = Writer::new(true);
        w.write_bytes(&self.implicit);

        let mut records = Vec::with_capacity(self.sections.len());
        for section in &self.sections {
            let source_offset = w.tell() as u32;
            w.write_bytes(&section.data);
            records.push((source_offset, section.ram_dest, section.data.len() as u32, section.bss_size));
        }

        let mut payload = w.finish().expect("main-code emit never uses anchors");
        if compress {
            payload = code::compress(&payload, arm9_mode);
        }

        let block_offset = payload.len();
        let code_settings_pointer_address = ram_address + block_offset as u32;

        let mut block = Writer::new(true);
        block.write_u32(compress as u32);
        block.write_u32(self.sections.len() as u32);
        for &(source_offset, ram_dest, length, bss_size) in &records {
            block.write_u32(source_offset);
            block.write_u32(ram_dest);
            block.write_u32(length);
            block.write_u32(bss_size);
        }
        block.write_u32(code_settings_pointer_address + 4);

        let mut bytes = payload;
        bytes.extend_from_slice(&block.finish().expect("main-code emit never uses anchors"));
        (bytes, code_settings_pointer_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_uncompressed_sections() {
        let main = MainCode {
            implicit: vec![0xAA; 16],
            sections: vec![
                Section {
                    ram_dest: 0x0200_1000,
                    bss_size: 4,
                    data: vec![1, 2, 3, 4, 5],
                },
                Section {
                    ram_dest: 0x0200_2000,
                    bss_size: 0,
                    data: vec![6, 7],
                },
            ],
            was_compressed: false,
        };
        let ram_address = 0x0200_0000u32;
        let (bytes, ptr_addr) = main.emit(ram_address, false, true);
        let parsed = MainCode::parse(&bytes, ram_address, ptr_addr).unwrap();
        assert_eq!(parsed, main);
    }

    #[test]
    fn roundtrip_compressed_sections() {
        let main = MainCode {
            implicit: vec![0u8; 32],
            sections: vec![Section {
                ram_dest: 0x0200_1000,
                bss_size: 8,
                data: vec![9u8; 20],
            }],
            was_compressed: true,
        };
        let ram_address = 0x0200_0000u32;
        let (bytes, ptr_addr) = main.emit(ram_address, true, true);
        let parsed = MainCode::parse(&bytes, ram_address, ptr_addr).unwrap();
        assert_eq!(parsed.implicit, main.implicit);
        assert_eq!(parsed.sections, main.sections);
        assert!(parsed.was_compressed);
    }
}

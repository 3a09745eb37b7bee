//! Overlay table records: one per loadable ARM9/ARM7 overlay module.

use crate::cursor::{Reader, Writer};
use crate::error::Result;
use crate::lz::code;

pub const RECORD_LEN: usize = 32;

/// One overlay table entry plus (once loaded) its decompressed bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub id: u32,
    pub ram_address: u32,
    pub ram_size: u32,
    pub bss_size: u32,
    pub static_init_start: u32,
    pub static_init_end: u32,
    pub file_id: u32,
    pub compressed_size: u32,
    pub compressed: bool,
    pub verify_hash: bool,
    pub data: Vec<u8>,
}

impl Overlay {
    /// Parse one 32-byte record, then load and (if flagged) decompress its
    /// file contents from `file_bytes` (looked up by `file_id` elsewhere).
    pub fn parse_record(record: &[u8]) -> Result<OverlayRecord> {
        let mut r = Reader::new(record, true);
        let id = r.read_u32()?;
        let ram_address = r.read_u32()?;
        let ram_size = r.read_u32()?;
        let bss_size = r.read_u32()?;
        let static_init_start = r.read_u32()?;
        let static_init_end = r.read_u32()?;
        let file_id = r.read_u32()?;
        let packed = r.read_u32()?;
        Ok(OverlayRecord {
            id,
            ram_address,
            ram_size,
            bss_size,
            static_init_start,
            static_init_end,
            file_id,
            compressed_size: packed & 0x00FF_FFFF,
            compressed: packed & (1 << 24) != 0,
            verify_hash: packed & (1 << 25) != 0,
        })
    }

    pub fn load(record: OverlayRecord, file_bytes: &[u8]) -> Result<Overlay> {
        let data = if record.compressed {
            code::decompress(file_bytes)?
        } else {
            file_bytes.to_vec()
        };
        Ok(Overlay {
            id: record.id,
            ram_address: record.ram_address,
            ram_size: record.ram_size,
            bss_size: record.bss_size,
            static_init_start: record.static_init_start,
            static_init_end: record.static_init_end,
            file_id: record.file_id,
            compressed_size: record.compressed_size,
            compressed: record.compressed,
            verify_hash: record.verify_hash,
            data,
        })
    }

    /// Emit this overlay's 32-byte record. Does not re-derive
    /// `compressed_size`/`compressed` from `data` - callers that recompress
    /// must update those fields themselves.
    pub fn emit_record(&self) -> Vec<u8> {
        let mut w = Writer::new(true);
        w.write_u32(self.id);
        w.write_u32(self.ram_address);
        w.write_u32(self.ram_size);
        w.write_u32(self.bss_size);
        w.write_u32(self.static_init_start);
        w.write_u32(self.static_init_end);
        w.write_u32(self.file_id);
        let mut packed = self.compressed_size & 0x00FF_FFFF;
        if self.compressed {
            packed |= 1 << 24;
        }
        if self.verify_hash {
            packed |= 1 << 25;
        }
        w.write_u32(packed);
        w.finish().expect("overlay record emit never uses anchors")
    }
}

/// The raw fields of an overlay record, before its file payload is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRecord {
    pub id: u32,
    pub ram_address: u32,
    pub ram_size: u32,
    pub bss_size: u32,
    pub static_init_start: u32,
    pub static_init_end: u32,
    pub file_id: u32,
    pub compressed_size: u32,
    pub compressed: bool,
    pub verify_hash: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_uncompressed_record() {
        let overlay = Overlay {
            id: 3,
            ram_address: 0x0238_0000,
            ram_size: 0x4000,
            bss_size: 0x200,
            static_init_start: 0x0238_0000,
            static_init_end: 0x0238_0100,
            file_id: 7,
            compressed_size: 0x4000,
            compressed: false,
            verify_hash: true,
            data: vec![0xAB; 0x4000],
        };
        let bytes = overlay.emit_record();
        assert_eq!(bytes.len(), RECORD_LEN);
        let record = Overlay::parse_record(&bytes).unwrap();
        assert_eq!(record.id, overlay.id);
        assert!(!record.compressed);
        assert!(record.verify_hash);
    }

    #[test]
    fn load_decompresses_when_flagged() {
        let original = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let compressed_file = code::compress(&original, true);
        let record = OverlayRecord {
            id: 0,
            ram_address: 0,
            ram_size: original.len() as u32,
            bss_size: 0,
            static_init_start: 0,
            static_init_end: 0,
            file_id: 0,
            compressed_size: compressed_file.len() as u32,
            compressed: true,
            verify_hash: false,
        };
        let overlay = Overlay::load(record, &compressed_file).unwrap();
        assert_eq!(overlay.data, original);
    }
}

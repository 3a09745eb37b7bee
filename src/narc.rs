//! NARC - a generic nested-archive container sharing the ROM's FAT/FNT wire
//! layout, wrapped in three named chunks.
//!
//! ## Wire layout
//! ```text
//! [0..4)   magic "NARC"
//! [4..6)   byte-order mark
//! [6..8)   version
//! [8..12)  total file size (u32)
//! [12..14) header size (u16, always 16)
//! [14..16) chunk count (u16, always 3)
//! BTAF chunk: magic "BTAF", chunk_size:u32, file_count:u16, reserved:u16,
//!             file_count * 8-byte (start, end) pairs relative to the start
//!             of the GMIF chunk's data (not absolute, unlike the ROM FAT)
//! BTNF chunk: magic "BTNF", chunk_size:u32, FNT bytes, zero-padded to a
//!             multiple of 4
//! GMIF chunk: magic "GMIF", chunk_size:u32, concatenated file bytes, each
//!             individually 4-byte aligned
//! ```
//!
//! The byte-order mark is a container property exactly as in [`crate::sdat`]:
//! raw bytes `FE FF` mean the magic-through-version prefix was big-endian,
//! `FF FE` little-endian; everything from offset 8 onward stays
//! little-endian regardless.

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::fat;
use crate::fnt::Fnt;

const MAGIC: &[u8; 4] = b"NARC";
const BOM: u16 = 0xFEFF;
const VERSION: u16 = 0x0100;
const HEADER_SIZE: u16 = 16;
const CHUNK_COUNT: u16 = 3;
const BTAF_MAGIC: &[u8; 4] = b"BTAF";
const BTNF_MAGIC: &[u8; 4] = b"BTNF";
const GMIF_MAGIC: &[u8; 4] = b"GMIF";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narc {
    pub fnt: Fnt,
    pub files: Vec<Vec<u8>>,
    pub big_endian_header: bool,
}

impl Narc {
    pub fn parse(data: &[u8]) -> Result<Narc> {
        let mut r = Reader::new(data, true);
        r.expect_magic(MAGIC)?;
        let bom_bytes: [u8; 2] = r.read_array()?;
        let big_endian_header = bom_bytes == [0xFE, 0xFF];
        r.read_array::<2>()?; // version, endianness-agnostic bytes, value unused
        r.read_u32()?; // total file size
        r.read_u16()?; // header size
        r.read_u16()?; // chunk count

        let btaf_start = r.tell();
        r.expect_magic(BTAF_MAGIC)?;
        let btaf_size = r.read_u32()? as usize;
        let file_count = r.read_u16()? as usize;
        r.read_u16()?; // reserved
        let mut relative_fat = Vec::with_capacity(file_count);
        for _ in 0..file_count {
            let start = r.read_u32()?;
            let end = r.read_u32()?;
            relative_fat.push((start, end));
        }

        r.seek(btaf_start + btaf_size);
        let btnf_start = r.tell();
        r.expect_magic(BTNF_MAGIC)?;
        let btnf_size = r.read_u32()? as usize;
        let fnt_bytes = r.read_bytes(btnf_size - 8)?;
        let fnt = Fnt::parse(fnt_bytes)?;

        r.seek(btnf_start + btnf_size);
        r.expect_magic(GMIF_MAGIC)?;
        r.read_u32()?; // chunk size
        let gmif_data_start = r.tell();

        let mut files = Vec::with_capacity(relative_fat.len());
        for &(start, end) in &relative_fat {
            let s = gmif_data_start + start as usize;
            let e = gmif_data_start + end as usize;
            files.push(data.get(s..e).ok_or(Error::OutOfBounds { pos: s })?.to_vec());
        }

        Ok(Narc {
            fnt,
            files,
            big_endian_header,
        })
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        let fnt_bytes = self.fnt.emit()?;

        let mut gmif_body = Writer::new(true);
        let mut relative_fat = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let start = gmif_body.tell() as u32;
            gmif_body.write_bytes(file);
            let end = gmif_body.tell() as u32;
            relative_fat.push((start, end));
            gmif_body.align(4);
        }
        let gmif_body_bytes = gmif_body.finish().expect("gmif body emit never uses anchors");

        let mut w = Writer::new(true);
        w.write_bytes(MAGIC);
        if self.big_endian_header {
            w.write_bytes(&BOM.to_be_bytes());
            w.write_bytes(&VERSION.to_be_bytes());
        } else {
            w.write_bytes(&BOM.to_le_bytes());
            w.write_bytes(&VERSION.to_le_bytes());
        }
        let total_size_at = w.tell();
        w.write_u32(0);
        w.write_u16(HEADER_SIZE);
        w.write_u16(CHUNK_COUNT);
        debug_assert_eq!(w.tell(), HEADER_SIZE as usize);

        w.write_bytes(BTAF_MAGIC);
        let btaf_size = 12 + 8 * relative_fat.len();
        w.write_u32(btaf_size as u32);
        w.write_u16(relative_fat.len() as u16);
        w.write_u16(0);
        w.write_bytes(&fat::emit(&relative_fat));

        w.write_bytes(BTNF_MAGIC);
        let btnf_body_padded = fnt_bytes.len().div_ceil(4) * 4;
        w.write_u32((8 + btnf_body_padded) as u32);
        w.write_bytes(&fnt_bytes);
        w.write_zeros(btnf_body_padded - fnt_bytes.len());

        w.write_bytes(GMIF_MAGIC);
        w.write_u32((8 + gmif_body_bytes.len()) as u32);
        w.write_bytes(&gmif_body_bytes);

        let total_size = w.tell() as u32;
        w.patch_at(total_size_at, &total_size.to_le_bytes());

        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fnt::Folder;

    fn sample() -> Narc {
        Narc {
            fnt: Fnt {
                root: Folder {
                    first_id: 0,
                    files: vec!["a.bin".into(), "b.bin".into()],
                    subfolders: vec![(
                        "sub".into(),
                        Folder {
                            first_id: 2,
                            files: vec!["c.bin".into()],
                            subfolders: vec![],
                        },
                    )],
                },
            },
            files: vec![vec![1, 2, 3], vec![4, 5, 6, 7, 8], vec![9]],
            big_endian_header: false,
        }
    }

    #[test]
    fn roundtrips_files_and_fnt() {
        let narc = sample();
        let bytes = narc.emit().unwrap();
        assert_eq!(&bytes[0..4], b"NARC");
        let parsed = Narc::parse(&bytes).unwrap();
        assert_eq!(parsed, narc);
    }

    #[test]
    fn big_endian_header_flag_roundtrips() {
        let mut narc = sample();
        narc.big_endian_header = true;
        let bytes = narc.emit().unwrap();
        assert_eq!(&bytes[4..6], [0xFE, 0xFF]);
        let parsed = Narc::parse(&bytes).unwrap();
        assert!(parsed.big_endian_header);
        assert_eq!(parsed, narc);
    }

    #[test]
    fn empty_archive_roundtrips() {
        let narc = Narc {
            fnt: Fnt {
                root: Folder {
                    first_id: 0,
                    files: vec![],
                    subfolders: vec![],
                },
            },
            files: vec![],
            big_endian_header: false,
        };
        let bytes = narc.emit().unwrap();
        let parsed = Narc::parse(&bytes).unwrap();
        assert_eq!(parsed, narc);
    }
}

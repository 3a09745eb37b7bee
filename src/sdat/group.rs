//! Group - a named bundle of SSEQ/SBNK/SWAR/SSAR assets to load together.

use crate::cursor::{Reader, Writer};
use crate::error::{Context, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Sseq,
    Sbnk,
    Swar,
    Ssar,
}

/// 4-bit load-flags field: whether to load the sequence, the bank plus its
/// linked wave archive, the wave archive on its own, or the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadFlags {
    pub load_sseq: bool,
    pub load_bank_and_swar_linkage: bool,
    pub load_swar: bool,
    pub load_ssar: bool,
}

impl LoadFlags {
    fn from_bits(bits: u8) -> LoadFlags {
        LoadFlags {
            load_sseq: bits & 0b0001 != 0,
            load_bank_and_swar_linkage: bits & 0b0010 != 0,
            load_swar: bits & 0b0100 != 0,
            load_ssar: bits & 0b1000 != 0,
        }
    }

    fn to_bits(self) -> u8 {
        (self.load_sseq as u8)
            | (self.load_bank_and_swar_linkage as u8) << 1
            | (self.load_swar as u8) << 2
            | (self.load_ssar as u8) << 3
    }
}

/// One entry in a group: an asset kind, its load flags, and an ordinal ID
/// into the enclosing SDAT's list of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEntry {
    pub kind: AssetKind,
    pub flags: LoadFlags,
    pub id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Group {
    pub entries: Vec<GroupEntry>,
}

impl Group {
    pub fn parse(data: &[u8]) -> Result<Group> {
        let mut r = Reader::new(data, true);
        let count = r.read_u32()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let pos = r.tell();
            let kind = match r.read_u8()? {
                0 => AssetKind::Sseq,
                1 => AssetKind::Sbnk,
                2 => AssetKind::Swar,
                3 => AssetKind::Ssar,
                _ => return Err(Error::MalformedSdat(Context::new(pos, "unknown group asset kind"))),
            };
            let flags = LoadFlags::from_bits(r.read_u8()?);
            let id = r.read_u16()?;
            entries.push(GroupEntry { kind, flags, id });
        }
        Ok(Group { entries })
    }

    pub fn emit(&self) -> Vec<u8> {
        let mut w = Writer::new(true);
        w.write_u32(self.entries.len() as u32);
        for entry in &self.entries {
            w.write_u8(match entry.kind {
                AssetKind::Sseq => 0,
                AssetKind::Sbnk => 1,
                AssetKind::Swar => 2,
                AssetKind::Ssar => 3,
            });
            w.write_u8(entry.flags.to_bits());
            w.write_u16(entry.id);
        }
        w.finish().expect("group emit never uses anchors")
    }
}

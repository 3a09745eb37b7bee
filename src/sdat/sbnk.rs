//! SBNK - an instrument bank: an ordered table of `(type, pointer)` pairs
//! into a region of instrument-data structs.
//!
//! ## Wire layout
//! ```text
//! [0..4]   magic "SBNK"
//! [4..8]   total size (u32)
//! [8..18]  wave_archive_slots (4x u16) + slots_are_file_ids (u8) + pad
//! [18..20] instrument count (u16)
//! [20..]   instrument table: count * (type u8, pad u8, pointer u16)
//! [..]     instrument-data region (pointer is relative to its start;
//!          pointer 0 means "empty slot"; byte 0 of the region is always a
//!          reserved zero spacer so a real struct is never at offset 0)
//! ```
//!
//! Struct layout by type:
//! * `1..=15` (SingleNote): one 11-byte [`NoteDefinition`].
//! * `16` (RangeInstrument): `low(u8) high(u8)` then `(high-low+1)` note defs.
//! * `17` (RegionalInstrument): `region_count(u8)` then that many
//!   `low(u8) high(u8) NoteDefinition` triples.

use crate::cursor::{Reader, Writer};
use crate::error::{Context, Error, Result};
use std::collections::HashMap;

const MAGIC: &[u8; 4] = b"SBNK";
const NOTE_DEF_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveLocator {
    None,
    Wave { wave_archive_slot: u8, wave_id: u16 },
    Psg { duty_cycle: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteDefinition {
    pub locator: WaveLocator,
    pub base_pitch: u8,
    pub attack: u8,
    pub decay: u8,
    pub sustain: u8,
    pub release: u8,
    pub pan: u8,
}

impl NoteDefinition {
    fn parse(data: &[u8], pos: usize) -> Result<Self> {
        let b = data
            .get(pos..pos + NOTE_DEF_LEN)
            .ok_or(Error::OutOfBounds { pos })?;
        let locator = match b[0] {
            0 => WaveLocator::None,
            1 => WaveLocator::Wave {
                wave_archive_slot: b[1],
                wave_id: u16::from_le_bytes([b[2], b[3]]),
            },
            2 => WaveLocator::Psg { duty_cycle: b[4] },
            _ => {
                return Err(Error::MalformedSbnk(Context::new(pos, "unknown wave locator tag")));
            }
        };
        Ok(NoteDefinition {
            locator,
            base_pitch: b[5],
            attack: b[6],
            decay: b[7],
            sustain: b[8],
            release: b[9],
            pan: b[10],
        })
    }

    fn emit(&self, out: &mut Vec<u8>) {
        let mut rec = [0u8; NOTE_DEF_LEN];
        match self.locator {
            WaveLocator::None => rec[0] = 0,
            WaveLocator::Wave {
                wave_archive_slot,
                wave_id,
            } => {
                rec[0] = 1;
                rec[1] = wave_archive_slot;
                rec[2..4].copy_from_slice(&wave_id.to_le_bytes());
            }
            WaveLocator::Psg { duty_cycle } => {
                rec[0] = 2;
                rec[4] = duty_cycle;
            }
        }
        rec[5] = self.base_pitch;
        rec[6] = self.attack;
        rec[7] = self.decay;
        rec[8] = self.sustain;
        rec[9] = self.release;
        rec[10] = self.pan;
        out.extend_from_slice(&rec);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instrument {
    Empty,
    SingleNote { subtype: u8, note: NoteDefinition },
    RangeInstrument {
        low: u8,
        high: u8,
        notes: Vec<NoteDefinition>,
    },
    RegionalInstrument {
        regions: Vec<(u8, u8, NoteDefinition)>,
    },
}

/// An instrument bank.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sbnk {
    pub instruments: Vec<Instrument>,
    /// Up to 4 wave-archive slot references.
    pub wave_archive_slots: [u16; 4],
    /// Whether `wave_archive_slots` holds raw SDAT file IDs rather than
    /// SDAT wave-archive ordinals.
    pub slots_are_file_ids: bool,
    /// Bytes between referenced instrument structs that parse as neither
    /// garbage nor a reachable struct, keyed by the ID of the instrument
    /// whose struct immediately precedes them.
    pub inaccessible_gaps: HashMap<u16, Vec<u8>>,
}

impl Sbnk {
    pub fn parse(data: &[u8]) -> Result<Sbnk> {
        let mut r = Reader::new(data, true);
        r.expect_magic(MAGIC)?;
        let _total_size = r.read_u32()?;
        let mut wave_archive_slots = [0u16; 4];
        for slot in &mut wave_archive_slots {
            *slot = r.read_u16()?;
        }
        let slots_are_file_ids = r.read_u8()? != 0;
        let _pad = r.read_u8()?;
        let count = r.read_u16()? as usize;

        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let kind = r.read_u8()?;
            let _pad = r.read_u8()?;
            let pointer = r.read_u16()? as usize;
            entries.push((kind, pointer));
        }

        let region_start = r.tell();
        let mut instruments = Vec::with_capacity(count);
        let mut struct_spans: Vec<(usize, usize, u16)> = Vec::new();

        for (id, &(kind, pointer)) in entries.iter().enumerate() {
            if pointer == 0 {
                instruments.push(Instrument::Empty);
                continue;
            }
            let pos = region_start + pointer;
            let (instrument, end) = parse_struct(data, pos, kind)?;
            instruments.push(instrument);
            struct_spans.push((pos, end, id as u16));
        }

        struct_spans.sort_by_key(|&(start, _, _)| start);
        let mut inaccessible_gaps = HashMap::new();
        for w in struct_spans.windows(2) {
            let (_, prev_end, prev_id) = w[0];
            let (next_start, _, _) = w[1];
            if next_start > prev_end {
                inaccessible_gaps.insert(prev_id, data[prev_end..next_start].to_vec());
            }
        }

        Ok(Sbnk {
            instruments,
            wave_archive_slots,
            slots_are_file_ids,
            inaccessible_gaps,
        })
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        let mut data_region = vec![0u8];
        let mut dedup: HashMap<Vec<u8>, u32> = HashMap::new();
        let mut pointers = Vec::with_capacity(self.instruments.len());
        let mut type_tags = Vec::with_capacity(self.instruments.len());

        for (id, instrument) in self.instruments.iter().enumerate() {
            let Some((tag, payload)) = emit_struct(instrument) else {
                pointers.push(0u32);
                type_tags.push(0u8);
                continue;
            };
            type_tags.push(tag);
            let has_gap = self.inaccessible_gaps.contains_key(&(id as u16));
            if !has_gap {
                if let Some(&ptr) = dedup.get(&payload) {
                    pointers.push(ptr);
                    continue;
                }
            }
            let ptr = data_region.len() as u32;
            data_region.extend_from_slice(&payload);
            dedup.entry(payload).or_insert(ptr);
            pointers.push(ptr);
            if let Some(gap) = self.inaccessible_gaps.get(&(id as u16)) {
                data_region.extend_from_slice(gap);
            }
        }

        let mut w = Writer::new(true);
        w.write_bytes(MAGIC);
        let size_at = w.tell();
        w.write_u32(0);
        for &slot in &self.wave_archive_slots {
            w.write_u16(slot);
        }
        w.write_u8(self.slots_are_file_ids as u8);
        w.write_u8(0);
        w.write_u16(self.instruments.len() as u16);
        for (&tag, &pointer) in type_tags.iter().zip(&pointers) {
            w.write_u8(tag);
            w.write_u8(0);
            w.write_u16(pointer as u16);
        }
        w.write_bytes(&data_region);

        let mut out = w.finish()?;
        let total_size = out.len() as u32;
        out[size_at..size_at + 4].copy_from_slice(&total_size.to_le_bytes());
        Ok(out)
    }
}

fn parse_struct(data: &[u8], pos: usize, kind: u8) -> Result<(Instrument, usize)> {
    match kind {
        1..=15 => {
            let note = NoteDefinition::parse(data, pos)?;
            Ok((
                Instrument::SingleNote { subtype: kind, note },
                pos + NOTE_DEF_LEN,
            ))
        }
        16 => {
            let low = *data.get(pos).ok_or(Error::OutOfBounds { pos })?;
            let high = *data.get(pos + 1).ok_or(Error::OutOfBounds { pos })?;
            if high < low {
                return Err(Error::MalformedSbnk(Context::new(pos, "range instrument high < low")));
            }
            let n = (high - low) as usize + 1;
            let mut notes = Vec::with_capacity(n);
            let mut cur = pos + 2;
            for _ in 0..n {
                notes.push(NoteDefinition::parse(data, cur)?);
                cur += NOTE_DEF_LEN;
            }
            Ok((Instrument::RangeInstrument { low, high, notes }, cur))
        }
        17 => {
            let region_count = *data.get(pos).ok_or(Error::OutOfBounds { pos })? as usize;
            let mut regions = Vec::with_capacity(region_count);
            let mut cur = pos + 1;
            for _ in 0..region_count {
                let low = *data.get(cur).ok_or(Error::OutOfBounds { pos: cur })?;
                let high = *data.get(cur + 1).ok_or(Error::OutOfBounds { pos: cur })?;
                let note = NoteDefinition::parse(data, cur + 2)?;
                regions.push((low, high, note));
                cur += 2 + NOTE_DEF_LEN;
            }
            Ok((Instrument::RegionalInstrument { regions }, cur))
        }
        _ => Err(Error::MalformedSbnk(Context::new(pos, "unknown instrument type tag"))),
    }
}

/// Serialize `instrument`'s struct payload, returning its type tag
/// alongside the bytes. `None` for `Empty` (no struct, pointer stays 0).
fn emit_struct(instrument: &Instrument) -> Option<(u8, Vec<u8>)> {
    match instrument {
        Instrument::Empty => None,
        Instrument::SingleNote { subtype, note } => {
            let mut out = Vec::with_capacity(NOTE_DEF_LEN);
            note.emit(&mut out);
            Some((*subtype, out))
        }
        Instrument::RangeInstrument { low, high, notes } => {
            let mut out = Vec::with_capacity(2 + notes.len() * NOTE_DEF_LEN);
            out.push(*low);
            out.push(*high);
            for note in notes {
                note.emit(&mut out);
            }
            Some((16, out))
        }
        Instrument::RegionalInstrument { regions } => {
            let mut out = Vec::with_capacity(1 + regions.len() * (2 + NOTE_DEF_LEN));
            out.push(regions.len() as u8);
            for (low, high, note) in regions {
                out.push(*low);
                out.push(*high);
                note.emit(&mut out);
            }
            Some((17, out))
        }
    }
}

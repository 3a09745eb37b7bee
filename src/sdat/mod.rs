//! SDAT - the root sound-archive container enclosing every asset kind.
//!
//! ## Wire layout
//! ```text
//! [0..4)   magic "SDAT"
//! [4..6)   byte-order mark
//! [6..8)   version
//! [8..12)  total file size (u32)
//! [12..14) header size (u16, always 64)
//! [14..16) section count (u16, always 4)
//! [16..24) SYMB (offset, size), 0-filled if absent
//! [24..32) INFO (offset, size)
//! [32..40) FAT  (offset, size)
//! [40..48) FILE (offset, size)
//! [48..64) reserved
//! ```
//!
//! SYMB and INFO share the same inner shape: 8 little-endian `u32` offsets
//! (one per asset kind, in canonical order, relative to the section start)
//! each pointing at a subtable of `count:u32` followed by `count` more
//! relative offsets, each pointing at that kind's payload (a name string for
//! SYMB, a record for INFO). An offset of zero means "absent" (an unnamed
//! asset in SYMB; never valid in INFO). FAT is `count:u32` followed by
//! `count` 16-byte `(offset:u32, size:u32, reserved:u64)` records, offsets
//! absolute from the start of the file.
//!
//! The byte-order mark is a property of the container: raw bytes `FE FF`
//! mean the magic-through-version prefix was written big-endian, `FF FE`
//! means little-endian. Every field from offset 8 onward stays
//! little-endian regardless, and this choice must round-trip.

pub mod group;
pub mod player;
pub mod sbnk;
pub mod ssar;
pub mod sseq;
pub mod strm;
pub mod swar;
pub mod swav;

use std::collections::HashMap;

use crate::cursor::{Reader, Writer};
use crate::error::{Context, Error, Result};

use group::Group;
use player::{SequencePlayer, StreamPlayer};
use sbnk::Sbnk;
use ssar::Ssar;
use sseq::{SequenceInfo, Sseq};
use strm::Strm;
use swar::Swar;

const MAGIC: &[u8; 4] = b"SDAT";
const BOM: u16 = 0xFEFF;
const VERSION: u16 = 0x0100;
const HEADER_SIZE: u16 = 64;
const SECTION_COUNT: u16 = 4;
const KIND_COUNT: usize = 8;

const KIND_SEQ: usize = 0;
const KIND_SSAR: usize = 1;
const KIND_BANK: usize = 2;
const KIND_WARC: usize = 3;
const KIND_SEQ_PLAYER: usize = 4;
const KIND_GROUP: usize = 5;
const KIND_STRM: usize = 6;
const KIND_STRM_PLAYER: usize = 7;

/// A named asset: SYMB supplies the name (if any), INFO/FAT supply `value`.
/// `merge_id` mirrors the source's `dataMergeOptimizationID` - assets with
/// byte-identical payloads and equal `merge_id` share one FAT slot on emit.
/// It never appears on the wire; parsed assets always get `merge_id: 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset<T> {
    pub name: Option<String>,
    pub value: T,
    pub merge_id: u32,
}

impl<T> Asset<T> {
    fn unnamed(value: T) -> Asset<T> {
        Asset {
            name: None,
            value,
            merge_id: 0,
        }
    }
}

/// Save-time layout knobs. Never modeled as mutable state on [`Sdat`]
/// itself - every emit call chooses them explicitly.
#[derive(Debug, Clone, Copy)]
pub struct EmitOptions {
    pub file_alignment: u32,
    pub first_file_alignment: Option<u32>,
    pub fat_lengths_include_padding: bool,
    pub pad_at_end: bool,
    pub pad_symb_size_to_4: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            file_alignment: 0x20,
            first_file_alignment: None,
            fat_lengths_include_padding: false,
            pad_at_end: false,
            pad_symb_size_to_4: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sdat {
    pub sequences: Vec<Asset<Sseq>>,
    pub sequence_archives: Vec<Asset<Ssar>>,
    pub banks: Vec<Asset<Sbnk>>,
    pub wave_archives: Vec<Asset<Swar>>,
    pub sequence_players: Vec<Asset<SequencePlayer>>,
    pub groups: Vec<Asset<Group>>,
    pub streams: Vec<Asset<Strm>>,
    pub stream_players: Vec<Asset<StreamPlayer>>,
    /// Whether the magic/BOM/version prefix is stored big-endian. Carried
    /// through from [`Sdat::parse`] purely so [`Sdat::emit`] reproduces it;
    /// every other field stays little-endian either way.
    pub big_endian_header: bool,
}

fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

fn read_cstr(data: &[u8], pos: usize) -> Result<String> {
    let rel_end = data
        .get(pos..)
        .ok_or(Error::OutOfBounds { pos })?
        .iter()
        .position(|&b| b == 0)
        .ok_or(Error::UnterminatedName)?;
    Ok(String::from_utf8_lossy(&data[pos..pos + rel_end]).into_owned())
}

fn parse_fat(data: &[u8], fat_offset: usize) -> Result<Vec<(u32, u32)>> {
    let mut r = Reader::new(data, true);
    r.seek(fat_offset);
    let count = r.read_u32()? as usize;
    let mut slots = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = r.read_u32()?;
        let size = r.read_u32()?;
        r.read_u64()?;
        slots.push((offset, size));
    }
    Ok(slots)
}

fn build_fat(slots: &[(u32, u32)]) -> Vec<u8> {
    let mut w = Writer::new(true);
    w.write_u32(slots.len() as u32);
    for &(offset, size) in slots {
        w.write_u32(offset);
        w.write_u32(size);
        w.write_u64(0);
    }
    w.finish().expect("FAT emit never uses anchors")
}

/// Parse a SYMB/INFO-shaped section: 8 kind offsets, each pointing at a
/// `count` + `count` offsets subtable. Returned offsets are absolute.
fn parse_section_table(data: &[u8], section_start: usize) -> Result<[Vec<Option<usize>>; KIND_COUNT]> {
    let mut r = Reader::new(data, true);
    r.seek(section_start);
    let mut kind_rel = [0u32; KIND_COUNT];
    for slot in kind_rel.iter_mut() {
        *slot = r.read_u32()?;
    }
    let mut result: [Vec<Option<usize>>; KIND_COUNT] = std::array::from_fn(|_| Vec::new());
    for (k, &rel) in kind_rel.iter().enumerate() {
        r.seek(section_start + rel as usize);
        let count = r.read_u32()? as usize;
        let mut offs = Vec::with_capacity(count);
        for _ in 0..count {
            let o = r.read_u32()?;
            offs.push(if o == 0 { None } else { Some(section_start + o as usize) });
        }
        result[k] = offs;
    }
    Ok(result)
}

/// Build a SYMB/INFO-shaped section from per-kind item bytes (`None` ->
/// offset 0). Returned bytes are relative to the section's own start.
fn build_section_table(per_kind: &[Vec<Option<Vec<u8>>>; KIND_COUNT]) -> Vec<u8> {
    let mut w = Writer::new(true);
    w.write_zeros(4 * KIND_COUNT);
    let mut kind_offsets = [0u32; KIND_COUNT];
    for (k, items) in per_kind.iter().enumerate() {
        kind_offsets[k] = w.tell() as u32;
        w.write_u32(items.len() as u32);
        let offsets_pos = w.tell();
        w.write_zeros(4 * items.len());
        let mut item_offsets = vec![0u32; items.len()];
        for (i, item) in items.iter().enumerate() {
            if let Some(bytes) = item {
                item_offsets[i] = w.tell() as u32;
                w.write_bytes(bytes);
            }
        }
        for (i, off) in item_offsets.iter().enumerate() {
            w.patch_at(offsets_pos + i * 4, &off.to_le_bytes());
        }
    }
    let mut bytes = w.finish().expect("section table emit never uses anchors");
    for (k, off) in kind_offsets.iter().enumerate() {
        bytes[k * 4..k * 4 + 4].copy_from_slice(&off.to_le_bytes());
    }
    bytes
}

fn name_bytes(name: &Option<String>) -> Option<Vec<u8>> {
    match name {
        Some(s) if !s.is_empty() => Some(s.as_bytes().to_vec()),
        _ => None,
    }
}

fn emit_seq_record(file_id: u16, info: &SequenceInfo) -> Vec<u8> {
    let mut w = Writer::new(true);
    w.write_u16(file_id);
    w.write_u16(info.bank_id);
    w.write_u8(info.volume);
    w.write_u8(info.channel_pressure);
    w.write_u8(info.polyphonic_pressure);
    w.write_u8(info.player_id);
    w.write_u8(info.unknown);
    w.write_u8(0);
    w.finish().expect("sequence record emit never uses anchors")
}

fn parse_seq_record(data: &[u8]) -> Result<(u16, SequenceInfo)> {
    let mut r = Reader::new(data, true);
    let file_id = r.read_u16()?;
    let info = SequenceInfo {
        bank_id: r.read_u16()?,
        volume: r.read_u8()?,
        channel_pressure: r.read_u8()?,
        polyphonic_pressure: r.read_u8()?,
        player_id: r.read_u8()?,
        unknown: r.read_u8()?,
    };
    Ok((file_id, info))
}

fn emit_file_id_record(file_id: u16) -> Vec<u8> {
    let mut w = Writer::new(true);
    w.write_u16(file_id);
    w.write_u16(0);
    w.finish().expect("file-id record emit never uses anchors")
}

fn parse_file_id_record(data: &[u8]) -> Result<u16> {
    Reader::new(data, true).read_u16()
}

/// Self-contained FAT payload for an SSAR asset: an entry table (name,
/// start offset, playback parameters) followed by the shared opcode blob.
/// [`Ssar::parse`]/[`Ssar::emit`] only know about the blob itself; the
/// entry table framing is this container's concern.
fn build_ssar_blob(ssar: &Ssar) -> Result<Vec<u8>> {
    let (event_bytes, offsets) = ssar.emit()?;
    let entry_count = ssar.entries.len();
    let header_len = 8 + 16 * entry_count;

    let mut name_area = Vec::new();
    let mut name_offsets = Vec::with_capacity(entry_count);
    for entry in &ssar.entries {
        match &entry.name {
            Some(name) if !name.is_empty() => {
                name_offsets.push((header_len + name_area.len()) as u32);
                name_area.extend_from_slice(name.as_bytes());
                name_area.push(0);
            }
            _ => name_offsets.push(0),
        }
    }
    let blob_offset = header_len + name_area.len();

    let mut w = Writer::new(true);
    w.write_u32(entry_count as u32);
    w.write_u32(blob_offset as u32);
    for (i, entry) in ssar.entries.iter().enumerate() {
        w.write_u32(name_offsets[i]);
        w.write_u32(offsets[i] as u32);
        w.write_u16(entry.bank_id);
        w.write_u8(entry.volume);
        w.write_u8(entry.channel_pressure);
        w.write_u8(entry.polyphonic_pressure);
        w.write_u8(entry.player_id);
        w.write_u8(0);
        w.write_u8(0);
    }
    w.write_bytes(&name_area);
    w.write_bytes(&event_bytes);
    w.finish()
}

fn parse_ssar_blob(data: &[u8]) -> Result<Ssar> {
    let mut r = Reader::new(data, true);
    let entry_count = r.read_u32()? as usize;
    let blob_offset = r.read_u32()? as usize;

    let mut name_offsets = Vec::with_capacity(entry_count);
    let mut start_offsets = Vec::with_capacity(entry_count);
    let mut params = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        let name_offset = r.read_u32()?;
        let start_offset = r.read_u32()? as usize;
        let bank_id = r.read_u16()?;
        let volume = r.read_u8()?;
        let channel_pressure = r.read_u8()?;
        let polyphonic_pressure = r.read_u8()?;
        let player_id = r.read_u8()?;
        r.read_u8()?;
        r.read_u8()?;
        name_offsets.push(name_offset);
        start_offsets.push(start_offset);
        params.push((bank_id, volume, channel_pressure, polyphonic_pressure, player_id));
    }

    let names = name_offsets
        .iter()
        .map(|&o| if o == 0 { Ok(None) } else { read_cstr(data, o as usize).map(Some) })
        .collect::<Result<Vec<_>>>()?;

    let blob = data
        .get(blob_offset..)
        .ok_or(Error::OutOfBounds { pos: blob_offset })?;
    Ssar::parse(blob, &start_offsets, &names, &params)
}

impl Sdat {
    pub fn parse(data: &[u8]) -> Result<Sdat> {
        let mut r = Reader::new(data, true);
        r.expect_magic(MAGIC)?;
        let bom_bytes: [u8; 2] = r.read_array()?;
        let big_endian_header = bom_bytes == [0xFE, 0xFF];
        r.read_array::<2>()?; // version, endianness-agnostic bytes, value unused
        r.read_u32()?; // total file size
        r.read_u16()?; // header size
        r.read_u16()?; // section count
        let symb_offset = r.read_u32()? as usize;
        r.read_u32()?; // SYMB size
        let info_offset = r.read_u32()? as usize;
        r.read_u32()?; // INFO size
        let fat_offset = r.read_u32()? as usize;
        r.read_u32()?; // FAT size
        let _file_offset = r.read_u32()? as usize;
        r.read_u32()?; // FILE size

        let fat = parse_fat(data, fat_offset)?;
        let names: [Vec<Option<usize>>; KIND_COUNT] = if symb_offset != 0 {
            parse_section_table(data, symb_offset)?
        } else {
            std::array::from_fn(|_| Vec::new())
        };
        let info = parse_section_table(data, info_offset)?;

        let name_at = |kind: usize, i: usize| -> Result<Option<String>> {
            match names[kind].get(i).copied().flatten() {
                Some(pos) => Ok(Some(read_cstr(data, pos)?)),
                None => Ok(None),
            }
        };
        let record_at = |kind: usize, i: usize, what: &'static str| -> Result<&[u8]> {
            let off = info[kind]
                .get(i)
                .copied()
                .flatten()
                .ok_or(Error::MalformedSdat(Context::new(i, what)))?;
            data.get(off..).ok_or(Error::OutOfBounds { pos: off })
        };
        let fat_blob = |file_id: u16, at: usize| -> Result<&[u8]> {
            let &(offset, size) = fat
                .get(file_id as usize)
                .ok_or(Error::MalformedSdat(Context::new(at, "file ID has no FAT slot")))?;
            data.get(offset as usize..(offset + size) as usize)
                .ok_or(Error::OutOfBounds { pos: offset as usize })
        };

        let mut sequences = Vec::with_capacity(info[KIND_SEQ].len());
        for i in 0..info[KIND_SEQ].len() {
            let (file_id, seq_info) = parse_seq_record(record_at(KIND_SEQ, i, "missing sequence record")?)?;
            let value = Sseq::parse(fat_blob(file_id, i)?, seq_info)?;
            sequences.push(Asset {
                name: name_at(KIND_SEQ, i)?,
                value,
                merge_id: 0,
            });
        }

        let mut sequence_archives = Vec::with_capacity(info[KIND_SSAR].len());
        for i in 0..info[KIND_SSAR].len() {
            let file_id = parse_file_id_record(record_at(KIND_SSAR, i, "missing archive record")?)?;
            let value = parse_ssar_blob(fat_blob(file_id, i)?)?;
            sequence_archives.push(Asset {
                name: name_at(KIND_SSAR, i)?,
                value,
                merge_id: 0,
            });
        }

        let mut banks = Vec::with_capacity(info[KIND_BANK].len());
        for i in 0..info[KIND_BANK].len() {
            let file_id = parse_file_id_record(record_at(KIND_BANK, i, "missing bank record")?)?;
            let value = Sbnk::parse(fat_blob(file_id, i)?)?;
            banks.push(Asset {
                name: name_at(KIND_BANK, i)?,
                value,
                merge_id: 0,
            });
        }

        let mut wave_archives = Vec::with_capacity(info[KIND_WARC].len());
        for i in 0..info[KIND_WARC].len() {
            let file_id = parse_file_id_record(record_at(KIND_WARC, i, "missing wave-archive record")?)?;
            let value = Swar::parse(fat_blob(file_id, i)?)?;
            wave_archives.push(Asset {
                name: name_at(KIND_WARC, i)?,
                value,
                merge_id: 0,
            });
        }

        let mut sequence_players = Vec::with_capacity(info[KIND_SEQ_PLAYER].len());
        for i in 0..info[KIND_SEQ_PLAYER].len() {
            let value = SequencePlayer::parse(record_at(KIND_SEQ_PLAYER, i, "missing sequence-player record")?)?;
            sequence_players.push(Asset::unnamed(value));
            sequence_players.last_mut().unwrap().name = name_at(KIND_SEQ_PLAYER, i)?;
        }

        let mut groups = Vec::with_capacity(info[KIND_GROUP].len());
        for i in 0..info[KIND_GROUP].len() {
            let file_id = parse_file_id_record(record_at(KIND_GROUP, i, "missing group record")?)?;
            let value = Group::parse(fat_blob(file_id, i)?)?;
            groups.push(Asset {
                name: name_at(KIND_GROUP, i)?,
                value,
                merge_id: 0,
            });
        }

        let mut streams = Vec::with_capacity(info[KIND_STRM].len());
        for i in 0..info[KIND_STRM].len() {
            let file_id = parse_file_id_record(record_at(KIND_STRM, i, "missing stream record")?)?;
            let value = Strm::parse(fat_blob(file_id, i)?)?;
            streams.push(Asset {
                name: name_at(KIND_STRM, i)?,
                value,
                merge_id: 0,
            });
        }

        let mut stream_players = Vec::with_capacity(info[KIND_STRM_PLAYER].len());
        for i in 0..info[KIND_STRM_PLAYER].len() {
            let value = StreamPlayer::parse(record_at(KIND_STRM_PLAYER, i, "missing stream-player record")?)?;
            stream_players.push(Asset::unnamed(value));
            stream_players.last_mut().unwrap().name = name_at(KIND_STRM_PLAYER, i)?;
        }

        Ok(Sdat {
            sequences,
            sequence_archives,
            banks,
            wave_archives,
            sequence_players,
            groups,
            streams,
            stream_players,
            big_endian_header,
        })
    }

    pub fn emit(&self, options: &EmitOptions) -> Result<Vec<u8>> {
        let seq_payloads = self
            .sequences
            .iter()
            .map(|a| a.value.emit())
            .collect::<Result<Vec<_>>>()?;
        let ssar_payloads = self
            .sequence_archives
            .iter()
            .map(|a| build_ssar_blob(&a.value))
            .collect::<Result<Vec<_>>>()?;
        let bank_payloads = self
            .banks
            .iter()
            .map(|a| a.value.emit())
            .collect::<Result<Vec<_>>>()?;
        let warc_payloads: Vec<Vec<u8>> = self.wave_archives.iter().map(|a| a.value.emit()).collect();
        let group_payloads: Vec<Vec<u8>> = self.groups.iter().map(|a| a.value.emit()).collect();
        let strm_payloads = self
            .streams
            .iter()
            .map(|a| a.value.emit())
            .collect::<Result<Vec<_>>>()?;

        let mut dedup: HashMap<(Vec<u8>, u32), u32> = HashMap::new();
        let mut slot_payloads: Vec<Vec<u8>> = Vec::new();
        let mut assign_slot = |payload: &[u8], merge_id: u32| -> u32 {
            let key = (payload.to_vec(), merge_id);
            if let Some(&slot) = dedup.get(&key) {
                return slot;
            }
            let slot = slot_payloads.len() as u32;
            slot_payloads.push(payload.to_vec());
            dedup.insert(key, slot);
            slot
        };

        let seq_ids: Vec<u32> = self
            .sequences
            .iter()
            .zip(&seq_payloads)
            .map(|(a, p)| assign_slot(p, a.merge_id))
            .collect();
        let ssar_ids: Vec<u32> = self
            .sequence_archives
            .iter()
            .zip(&ssar_payloads)
            .map(|(a, p)| assign_slot(p, a.merge_id))
            .collect();
        let bank_ids: Vec<u32> = self
            .banks
            .iter()
            .zip(&bank_payloads)
            .map(|(a, p)| assign_slot(p, a.merge_id))
            .collect();
        let warc_ids: Vec<u32> = self
            .wave_archives
            .iter()
            .zip(&warc_payloads)
            .map(|(a, p)| assign_slot(p, a.merge_id))
            .collect();
        let group_ids: Vec<u32> = self
            .groups
            .iter()
            .zip(&group_payloads)
            .map(|(a, p)| assign_slot(p, a.merge_id))
            .collect();
        let strm_ids: Vec<u32> = self
            .streams
            .iter()
            .zip(&strm_payloads)
            .map(|(a, p)| assign_slot(p, a.merge_id))
            .collect();
        drop(assign_slot);

        // FILE layout: one pass, honoring alignment and padding options.
        let mut cursor = 0usize;
        let mut file_bytes = Vec::new();
        let mut fat_relative: Vec<(u32, u32)> = Vec::with_capacity(slot_payloads.len());
        let n = slot_payloads.len();
        for (i, payload) in slot_payloads.iter().enumerate() {
            let align = if i == 0 {
                options.first_file_alignment.unwrap_or(options.file_alignment)
            } else {
                options.file_alignment
            } as usize;
            let aligned = align_up(cursor, align);
            file_bytes.extend(std::iter::repeat_n(0u8, aligned - cursor));
            cursor = aligned;
            let start = cursor;
            file_bytes.extend_from_slice(payload);
            cursor += payload.len();

            let is_last = i + 1 == n;
            let size = if options.fat_lengths_include_padding && (!is_last || options.pad_at_end) {
                let padded = align_up(cursor, options.file_alignment as usize);
                file_bytes.extend(std::iter::repeat_n(0u8, padded - cursor));
                cursor = padded;
                (cursor - start) as u32
            } else {
                payload.len() as u32
            };
            fat_relative.push((start as u32, size));
        }

        // INFO + SYMB tables.
        let mut info_items: [Vec<Option<Vec<u8>>>; KIND_COUNT] = std::array::from_fn(|_| Vec::new());
        let mut name_items: [Vec<Option<Vec<u8>>>; KIND_COUNT] = std::array::from_fn(|_| Vec::new());
        let mut any_name = false;

        for (i, a) in self.sequences.iter().enumerate() {
            info_items[KIND_SEQ].push(Some(emit_seq_record(seq_ids[i] as u16, &a.value.info)));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_SEQ].push(nb);
        }
        for (i, a) in self.sequence_archives.iter().enumerate() {
            info_items[KIND_SSAR].push(Some(emit_file_id_record(ssar_ids[i] as u16)));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_SSAR].push(nb);
        }
        for (i, a) in self.banks.iter().enumerate() {
            info_items[KIND_BANK].push(Some(emit_file_id_record(bank_ids[i] as u16)));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_BANK].push(nb);
        }
        for (i, a) in self.wave_archives.iter().enumerate() {
            info_items[KIND_WARC].push(Some(emit_file_id_record(warc_ids[i] as u16)));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_WARC].push(nb);
        }
        for a in &self.sequence_players {
            info_items[KIND_SEQ_PLAYER].push(Some(a.value.emit()));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_SEQ_PLAYER].push(nb);
        }
        for (i, a) in self.groups.iter().enumerate() {
            info_items[KIND_GROUP].push(Some(emit_file_id_record(group_ids[i] as u16)));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_GROUP].push(nb);
        }
        for (i, a) in self.streams.iter().enumerate() {
            info_items[KIND_STRM].push(Some(emit_file_id_record(strm_ids[i] as u16)));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_STRM].push(nb);
        }
        for a in &self.stream_players {
            info_items[KIND_STRM_PLAYER].push(Some(a.value.emit()));
            let nb = name_bytes(&a.name);
            any_name |= nb.is_some();
            name_items[KIND_STRM_PLAYER].push(nb);
        }

        let info_bytes = build_section_table(&info_items);
        let symb_bytes = any_name.then(|| build_section_table(&name_items));

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
        w.write_u16(SECTION_COUNT);
        let symb_offset_at = w.tell();
        w.write_u32(0);
        let symb_size_at = w.tell();
        w.write_u32(0);
        let info_offset_at = w.tell();
        w.write_u32(0);
        let info_size_at = w.tell();
        w.write_u32(0);
        let fat_offset_at = w.tell();
        w.write_u32(0);
        let fat_size_at = w.tell();
        w.write_u32(0);
        let file_offset_at = w.tell();
        w.write_u32(0);
        let file_size_at = w.tell();
        w.write_u32(0);
        w.write_zeros(16);
        debug_assert_eq!(w.tell(), HEADER_SIZE as usize);

        let (symb_offset, symb_size) = match &symb_bytes {
            Some(bytes) => {
                let offset = w.tell();
                w.write_bytes(bytes);
                let raw_len = bytes.len();
                w.align(4);
                let size = if options.pad_symb_size_to_4 { w.tell() - offset } else { raw_len };
                (offset as u32, size as u32)
            }
            None => (0, 0),
        };

        let info_offset = w.tell();
        w.write_bytes(&info_bytes);
        w.align(4);
        let info_size = (w.tell() - info_offset) as u32;

        let fat_offset = w.tell();
        let fat_len = 4 + 16 * fat_relative.len();
        let file_offset_base = fat_offset + fat_len;
        let fat_absolute: Vec<(u32, u32)> = fat_relative
            .iter()
            .map(|&(start, size)| (file_offset_base as u32 + start, size))
            .collect();
        w.write_bytes(&build_fat(&fat_absolute));
        let fat_size = (w.tell() - fat_offset) as u32;

        let file_offset = w.tell();
        debug_assert_eq!(file_offset, file_offset_base);
        w.write_bytes(&file_bytes);
        let file_size = (w.tell() - file_offset) as u32;

        let total_size = w.tell() as u32;

        w.patch_at(total_size_at, &total_size.to_le_bytes());
        w.patch_at(symb_offset_at, &symb_offset.to_le_bytes());
        w.patch_at(symb_size_at, &symb_size.to_le_bytes());
        w.patch_at(info_offset_at, &(info_offset as u32).to_le_bytes());
        w.patch_at(info_size_at, &info_size.to_le_bytes());
        w.patch_at(fat_offset_at, &(fat_offset as u32).to_le_bytes());
        w.patch_at(fat_size_at, &fat_size.to_le_bytes());
        w.patch_at(file_offset_at, &(file_offset as u32).to_le_bytes());
        w.patch_at(file_size_at, &file_size.to_le_bytes());

        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seq;

    fn minimal_sseq(rest_len: u8) -> Sseq {
        let data = vec![0x80, rest_len, 0xFF];
        Sseq::parse(&data, SequenceInfo::default()).unwrap()
    }

    #[test]
    fn roundtrips_a_named_sequence_and_bank() {
        let sdat = Sdat {
            sequences: vec![Asset {
                name: Some("bgm_title".into()),
                value: minimal_sseq(5),
                merge_id: 0,
            }],
            banks: vec![Asset {
                name: Some("bank_main".into()),
                value: Sbnk::default(),
                merge_id: 0,
            }],
            ..Default::default()
        };
        let bytes = sdat.emit(&EmitOptions::default()).unwrap();
        let parsed = Sdat::parse(&bytes).unwrap();
        assert_eq!(parsed, sdat);
    }

    #[test]
    fn roundtrips_without_any_names() {
        let sdat = Sdat {
            sequences: vec![Asset::unnamed(minimal_sseq(1)), Asset::unnamed(minimal_sseq(2))],
            ..Default::default()
        };
        let bytes = sdat.emit(&EmitOptions::default()).unwrap();
        let parsed = Sdat::parse(&bytes).unwrap();
        assert_eq!(parsed, sdat);
    }

    #[test]
    fn dedup_merges_identical_sequences_into_one_fat_slot() {
        let sdat = Sdat {
            sequences: vec![
                Asset::unnamed(minimal_sseq(7)),
                Asset::unnamed(minimal_sseq(7)),
            ],
            ..Default::default()
        };
        let bytes = sdat.emit(&EmitOptions::default()).unwrap();

        let fat = parse_fat(&bytes, {
            let mut r = Reader::new(&bytes, true);
            r.seek(32);
            r.read_u32().unwrap() as usize
        })
        .unwrap();
        assert_eq!(fat.len(), 1);

        let parsed = Sdat::parse(&bytes).unwrap();
        assert_eq!(parsed.sequences.len(), 2);
        assert_eq!(parsed.sequences[0].value, parsed.sequences[1].value);
    }

    #[test]
    fn distinct_merge_ids_keep_identical_payloads_in_separate_slots() {
        let sdat = Sdat {
            sequences: vec![
                Asset {
                    name: None,
                    value: minimal_sseq(9),
                    merge_id: 0,
                },
                Asset {
                    name: None,
                    value: minimal_sseq(9),
                    merge_id: 1,
                },
            ],
            ..Default::default()
        };
        let bytes = sdat.emit(&EmitOptions::default()).unwrap();
        let fat = parse_fat(&bytes, {
            let mut r = Reader::new(&bytes, true);
            r.seek(32);
            r.read_u32().unwrap() as usize
        })
        .unwrap();
        assert_eq!(fat.len(), 2);
    }

    #[test]
    fn roundtrips_every_asset_kind_at_once() {
        let (events, notable) = seq::lift(&[0xFF], &[0]).unwrap();
        let group_value = Group {
            entries: vec![group::GroupEntry {
                kind: group::AssetKind::Sseq,
                flags: group::LoadFlags::default(),
                id: 0,
            }],
        };
        let sdat = Sdat {
            sequences: vec![Asset::unnamed(Sseq {
                events: events.clone(),
                entry: notable[0],
                info: SequenceInfo::default(),
            })],
            sequence_archives: vec![Asset::unnamed(Ssar {
                events,
                entries: vec![ssar::SequenceEntry {
                    name: Some("entry0".into()),
                    start: notable[0],
                    bank_id: 0,
                    volume: 127,
                    channel_pressure: 0,
                    polyphonic_pressure: 0,
                    player_id: 0,
                }],
            })],
            banks: vec![Asset::unnamed(Sbnk::default())],
            wave_archives: vec![Asset::unnamed(Swar {
                reserved_prefix: [0; 8],
                waves: vec![],
            })],
            sequence_players: vec![Asset::unnamed(SequencePlayer {
                max_sequences: 4,
                channel_bitmask: 0xFFFF,
                heap_size: 0,
            })],
            groups: vec![Asset::unnamed(group_value)],
            streams: vec![Asset::unnamed(Strm {
                wave_type: swav::WaveType::Pcm8,
                sample_rate: 8000,
                timer: 0,
                loop_start_samples: 0,
                block_size: 4,
                final_block_used_bytes: 4,
                channels: vec![vec![vec![1, 2, 3, 4]]],
            })],
            stream_players: vec![Asset::unnamed(StreamPlayer { channels: vec![0, 1] })],
            big_endian_header: false,
        };
        let bytes = sdat.emit(&EmitOptions::default()).unwrap();
        let parsed = Sdat::parse(&bytes).unwrap();
        assert_eq!(parsed, sdat);
    }

    #[test]
    fn big_endian_header_flag_roundtrips() {
        let sdat = Sdat {
            sequences: vec![Asset::unnamed(minimal_sseq(3))],
            big_endian_header: true,
            ..Default::default()
        };
        let bytes = sdat.emit(&EmitOptions::default()).unwrap();
        assert_eq!(&bytes[4..6], [0xFE, 0xFF]);
        let parsed = Sdat::parse(&bytes).unwrap();
        assert!(parsed.big_endian_header);
        assert_eq!(parsed, sdat);
    }
}

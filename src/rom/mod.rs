//! ROM composite: the full NDS cartridge image.
//!
//! ## Layout assumptions beyond the header table
//! A handful of sub-blobs have no header field locating them and are
//! positioned by convention rather than by a pointer:
//! - The ARM9 "post-data" trailer is detected by a `0xDEC00621` magic word
//!   immediately following the ARM9 binary (the devkitPro/NitroCode
//!   convention); if absent, there is no trailer.
//! - The icon/banner blob has a fixed size (`BANNER_SIZE`, the version-1
//!   banner length) since the header carries only its offset.
//! - `debug_rom` is whatever lies between `used_rom_size` and a trailing
//!   `RSA_SIGNATURE_LEN`-byte block; if the file is shorter than that, both
//!   are empty.
//! - `sorted_file_ids` has no on-disk location at all - it is a save-side
//!   hint, so it always parses back empty (mirrors how `sdat::Asset::merge_id`
//!   defaults to 0 on parse).

pub mod exec;
pub mod header;
pub mod overlay;

use crate::cursor::Writer;
use crate::error::{Error, Result};
use crate::fat;
use crate::fnt::Fnt;
use exec::MainCode;
use header::{Header, OverlayTable};
use overlay::{Overlay, OverlayRecord};

const NITROCODE_MAGIC: u32 = 0xDEC0_0621;
const BANNER_SIZE: usize = 0x840;
const RSA_SIGNATURE_LEN: usize = 0x88;

fn slice(data: &[u8], start: usize, end: usize) -> Result<&[u8]> {
    data.get(start..end).ok_or(Error::OutOfBounds { pos: start })
}

/// A fully parsed cartridge image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    pub header: Header,
    pub arm9: MainCode,
    pub arm9_postdata: Vec<u8>,
    pub arm7: MainCode,
    pub arm9_overlays: Vec<Overlay>,
    pub arm7_overlays: Vec<Overlay>,
    pub icon_banner: Vec<u8>,
    pub fnt: Fnt,
    pub files: Vec<Vec<u8>>,
    pub debug_rom: Vec<u8>,
    pub rsa_signature: Vec<u8>,
    /// File-ID ordering hint for [`Rom::emit`]'s FAT layout; always empty
    /// after [`Rom::parse`] since the ROM carries no trace of it.
    pub sorted_file_ids: Vec<u32>,
}

/// Save-time flags, kept off `Rom` itself per the emit-options convention
/// used by [`crate::sdat::EmitOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitOptions {
    pub update_device_capacity: bool,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions {
            update_device_capacity: true,
        }
    }
}

impl Rom {
    pub fn parse(data: &[u8]) -> Result<Rom> {
        let header = Header::parse(data)?;

        let arm9_start = header.arm9.rom_offset as usize;
        let arm9_end = arm9_start + header.arm9.size as usize;
        let arm9_raw = slice(data, arm9_start, arm9_end)?;
        let arm9 = MainCode::parse(arm9_raw, header.arm9.ram_address, header.arm9_code_settings_pointer_address)?;
        let arm9_postdata = match data.get(arm9_end..arm9_end + 4) {
            Some(word) if u32::from_le_bytes(word.try_into().unwrap()) == NITROCODE_MAGIC => {
                slice(data, arm9_end + 4, arm9_end + 16)?.to_vec()
            }
            _ => Vec::new(),
        };

        let arm7_start = header.arm7.rom_offset as usize;
        let arm7_end = arm7_start + header.arm7.size as usize;
        let arm7_raw = slice(data, arm7_start, arm7_end)?;
        let arm7 = MainCode::parse(arm7_raw, header.arm7.ram_address, header.arm7_code_settings_pointer_address)?;

        let fnt_start = header.fnt_offset as usize;
        let fnt_end = fnt_start + header.fnt_size as usize;
        let fnt = Fnt::parse(slice(data, fnt_start, fnt_end)?)?;

        let fat_start = header.fat_offset as usize;
        let fat_end = fat_start + header.fat_size as usize;
        let fat_entries = fat::parse(slice(data, fat_start, fat_end)?)?;
        let mut files = Vec::with_capacity(fat_entries.len());
        for &(start, end) in &fat_entries {
            files.push(slice(data, start as usize, end as usize)?.to_vec());
        }

        let arm9_overlays = parse_overlay_table(data, header.arm9_overlay, &files)?;
        let arm7_overlays = parse_overlay_table(data, header.arm7_overlay, &files)?;

        let banner_start = header.banner_offset as usize;
        let icon_banner = match data.get(banner_start..banner_start + BANNER_SIZE) {
            Some(bytes) => bytes.to_vec(),
            None => data.get(banner_start..).unwrap_or(&[]).to_vec(),
        };

        let used = header.used_rom_size as usize;
        let (debug_rom, rsa_signature) = if data.len() > used {
            let trailer = &data[used..];
            if trailer.len() >= RSA_SIGNATURE_LEN {
                let split = trailer.len() - RSA_SIGNATURE_LEN;
                (trailer[..split].to_vec(), trailer[split..].to_vec())
            } else {
                (trailer.to_vec(), Vec::new())
            }
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(Rom {
            header,
            arm9,
            arm9_postdata,
            arm7,
            arm9_overlays,
            arm7_overlays,
            icon_banner,
            fnt,
            files,
            debug_rom,
            rsa_signature,
            sorted_file_ids: Vec::new(),
        })
    }

    pub fn emit(&self, options: &EmitOptions) -> Result<Vec<u8>> {
        let mut w = Writer::new(true);
        w.write_zeros(header::HEADER_SIZE);

        let (arm9_bytes, arm9_code_settings_pointer_address) =
            self.arm9.emit(self.header.arm9.ram_address, self.arm9.was_compressed, true);
        let arm9_rom_offset = w.tell() as u32;
        w.write_bytes(&arm9_bytes);
        if !self.arm9_postdata.is_empty() {
            w.write_u32(NITROCODE_MAGIC);
            w.write_bytes(&self.arm9_postdata);
        }
        w.align(4);

        let arm9_overlay_offset = w.tell() as u32;
        for overlay in &self.arm9_overlays {
            w.write_bytes(&overlay.emit_record());
        }
        w.align(4);

        let (arm7_bytes, arm7_code_settings_pointer_address) =
            self.arm7.emit(self.header.arm7.ram_address, self.arm7.was_compressed, false);
        let arm7_rom_offset = w.tell() as u32;
        w.write_bytes(&arm7_bytes);
        w.align(4);

        let arm7_overlay_offset = w.tell() as u32;
        for overlay in &self.arm7_overlays {
            w.write_bytes(&overlay.emit_record());
        }
        w.align(4);

        let fnt_bytes = self.fnt.emit()?;
        let fnt_offset = w.tell() as u32;
        w.write_bytes(&fnt_bytes);
        w.align(4);

        let banner_offset = w.tell() as u32;
        w.write_bytes(&self.icon_banner);
        w.align(4);

        let order = self.fat_emission_order();
        let mut fat_entries = vec![(0u32, 0u32); self.files.len()];
        for &id in &order {
            let start = w.tell() as u32;
            w.write_bytes(&self.files[id as usize]);
            let end = w.tell() as u32;
            fat_entries[id as usize] = (start, end);
            w.align(4);
        }
        let fat_bytes = fat::emit(&fat_entries);
        let fat_offset = w.tell() as u32;
        w.write_bytes(&fat_bytes);
        w.align(4);

        w.write_bytes(&self.debug_rom);
        let used_rom_size = w.tell() as u32;
        w.write_bytes(&self.rsa_signature);

        let total_rom_size = w.tell() as u32;

        let mut header = self.header.clone();
        header.arm9.rom_offset = arm9_rom_offset;
        header.arm9.size = arm9_bytes.len() as u32;
        header.arm9_code_settings_pointer_address = arm9_code_settings_pointer_address;
        header.arm7.rom_offset = arm7_rom_offset;
        header.arm7.size = arm7_bytes.len() as u32;
        header.arm7_code_settings_pointer_address = arm7_code_settings_pointer_address;
        header.fnt_offset = fnt_offset;
        header.fnt_size = fnt_bytes.len() as u32;
        header.fat_offset = fat_offset;
        header.fat_size = fat_bytes.len() as u32;
        header.arm9_overlay = OverlayTable {
            offset: arm9_overlay_offset,
            size: (self.arm9_overlays.len() * overlay::RECORD_LEN) as u32,
        };
        header.arm7_overlay = OverlayTable {
            offset: arm7_overlay_offset,
            size: (self.arm7_overlays.len() * overlay::RECORD_LEN) as u32,
        };
        header.banner_offset = banner_offset;
        header.used_rom_size = used_rom_size;
        header.header_size = header::HEADER_SIZE as u32;
        if options.update_device_capacity {
            header.device_capacity = device_capacity_for(total_rom_size);
        }
        header.header_crc16 = header.compute_crc16();

        let mut bytes = w.finish().expect("rom emit never uses anchors");
        bytes[..header::HEADER_SIZE].copy_from_slice(&header.emit());
        Ok(bytes)
    }

    fn fat_emission_order(&self) -> Vec<u32> {
        let mut order = Vec::with_capacity(self.files.len());
        let mut seen = vec![false; self.files.len()];
        for &id in &self.sorted_file_ids {
            if let Some(flag) = seen.get_mut(id as usize) {
                if !*flag {
                    *flag = true;
                    order.push(id);
                }
            }
        }
        for (id, flag) in seen.iter().enumerate() {
            if !flag {
                order.push(id as u32);
            }
        }
        order
    }
}

fn parse_overlay_table(data: &[u8], table: OverlayTable, files: &[Vec<u8>]) -> Result<Vec<Overlay>> {
    let count = table.size as usize / overlay::RECORD_LEN;
    let start = table.offset as usize;
    let mut overlays = Vec::with_capacity(count);
    for i in 0..count {
        let at = start + i * overlay::RECORD_LEN;
        let record: OverlayRecord = Overlay::parse_record(slice(data, at, at + overlay::RECORD_LEN)?)?;
        let file_bytes = files
            .get(record.file_id as usize)
            .ok_or(Error::OutOfBounds { pos: at })?;
        overlays.push(Overlay::load(record, file_bytes)?);
    }
    Ok(overlays)
}

fn device_capacity_for(total_rom_size: u32) -> u8 {
    let chunks = total_rom_size.max(1) as f64 / 0x20000 as f64;
    let capacity = chunks.log2().ceil();
    if capacity < 0.0 {
        0
    } else {
        capacity as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fnt::Folder;
    use header::ExecBlock;

    fn sample_header() -> Header {
        let mut title = [0u8; 12];
        title[..9].copy_from_slice(b"NEW MARIO");
        Header {
            title,
            id_code: *b"A2DE",
            developer_code: [0x30, 0x31],
            unit_code: 0,
            encryption_seed: 0,
            device_capacity: 0,
            region: 0,
            version: 0,
            autostart: 0,
            arm9: ExecBlock {
                rom_offset: 0,
                entry_address: 0x0200_0000,
                ram_address: 0x0200_0000,
                size: 0,
            },
            arm7: ExecBlock {
                rom_offset: 0,
                entry_address: 0x0380_0000,
                ram_address: 0x0380_0000,
                size: 0,
            },
            fnt_offset: 0,
            fnt_size: 0,
            fat_offset: 0,
            fat_size: 0,
            arm9_overlay: OverlayTable::default(),
            arm7_overlay: OverlayTable::default(),
            normal_card_control: 0,
            secure_card_control: 0,
            banner_offset: 0,
            secure_area_crc: 0,
            secure_transfer_delay: 0,
            arm9_code_settings_pointer_address: 0,
            arm7_code_settings_pointer_address: 0,
            secure_area_disable: [0; 8],
            used_rom_size: 0,
            header_size: header::HEADER_SIZE as u32,
            nintendo_logo: [0xAB; 0x9C],
            header_crc16: 0,
        }
    }

    fn sample_rom() -> Rom {
        Rom {
            header: sample_header(),
            arm9: MainCode {
                implicit: vec![1u8; 64],
                sections: Vec::new(),
                was_compressed: false,
            },
            arm9_postdata: Vec::new(),
            arm7: MainCode {
                implicit: vec![2u8; 32],
                sections: Vec::new(),
                was_compressed: false,
            },
            arm9_overlays: Vec::new(),
            arm7_overlays: Vec::new(),
            icon_banner: vec![3u8; BANNER_SIZE],
            fnt: Fnt {
                root: Folder {
                    first_id: 0,
                    files: vec!["a.bin".into(), "b.bin".into()],
                    subfolders: vec![],
                },
            },
            files: vec![vec![0xAAu8; 10], vec![0xBBu8; 20]],
            debug_rom: Vec::new(),
            rsa_signature: Vec::new(),
            sorted_file_ids: Vec::new(),
        }
    }

    #[test]
    fn roundtrips_basic_rom() {
        let rom = sample_rom();
        let bytes = rom.emit(&EmitOptions::default()).unwrap();
        assert_eq!(&bytes[0..16], b"NEW MARIO\0\0\0A2DE");
        let parsed = Rom::parse(&bytes).unwrap();
        assert_eq!(parsed.arm9, rom.arm9);
        assert_eq!(parsed.arm7, rom.arm7);
        assert_eq!(parsed.fnt, rom.fnt);
        assert_eq!(parsed.files, rom.files);
    }

    #[test]
    fn header_crc16_is_self_consistent() {
        let rom = sample_rom();
        let bytes = rom.emit(&EmitOptions::default()).unwrap();
        let expected = crate::crc::crc16(&bytes[..0x15C]);
        assert_eq!(u16::from_le_bytes([bytes[0x15C], bytes[0x15D]]), expected);
    }

    #[test]
    fn sorted_file_ids_drive_fat_order_only() {
        let mut rom = sample_rom();
        rom.sorted_file_ids = vec![1, 0];
        let bytes = rom.emit(&EmitOptions::default()).unwrap();
        let header = Header::parse(&bytes).unwrap();
        let fat_bytes = &bytes[header.fat_offset as usize..(header.fat_offset + header.fat_size) as usize];
        let entries = fat::parse(fat_bytes).unwrap();
        assert!(entries[1].0 < entries[0].0);
        let parsed = Rom::parse(&bytes).unwrap();
        assert_eq!(parsed.files, rom.files);
        assert!(parsed.sorted_file_ids.is_empty());
    }

    #[test]
    fn overlays_roundtrip_with_decompression() {
        let mut rom = sample_rom();
        let payload = vec![7u8; 40];
        let compressed = crate::lz::code::compress(&payload, true);
        rom.files.push(compressed.clone());
        let file_id = (rom.files.len() - 1) as u32;
        rom.arm9_overlays.push(Overlay {
            id: 0,
            ram_address: 0x0238_0000,
            ram_size: payload.len() as u32,
            bss_size: 0,
            static_init_start: 0,
            static_init_end: 0,
            file_id,
            compressed_size: compressed.len() as u32,
            compressed: true,
            verify_hash: false,
            data: payload.clone(),
        });
        let bytes = rom.emit(&EmitOptions::default()).unwrap();
        let parsed = Rom::parse(&bytes).unwrap();
        assert_eq!(parsed.arm9_overlays.len(), 1);
        assert_eq!(parsed.arm9_overlays[0].data, payload);
    }

    #[test]
    fn compressed_main_code_roundtrips_through_the_rom() {
        let mut rom = sample_rom();
        rom.arm9 = MainCode {
            implicit: vec![0u8; 32],
            sections: vec![exec::Section {
                ram_dest: 0x0200_1000,
                bss_size: 8,
                data: vec![9u8; 20],
            }],
            was_compressed: true,
        };
        let bytes = rom.emit(&EmitOptions::default()).unwrap();
        let header = Header::parse(&bytes).unwrap();
        assert_ne!(header.arm9_code_settings_pointer_address, 0);
        let parsed = Rom::parse(&bytes).unwrap();
        assert_eq!(parsed.arm9, rom.arm9);
    }
}

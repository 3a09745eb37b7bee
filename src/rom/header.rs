//! The 0x200-byte DS cartridge header.

use crate::crc;
use crate::cursor::{Reader, Writer};
use crate::error::Result;

pub const HEADER_SIZE: usize = 0x200;
const LOGO_LEN: usize = 0x9C;
const CRC_COVERAGE_END: usize = 0x15C;

/// Offset/entry/RAM-address/size quad shared by the ARM9 and ARM7 slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecBlock {
    pub rom_offset: u32,
    pub entry_address: u32,
    pub ram_address: u32,
    pub size: u32,
}

impl ExecBlock {
    fn parse(r: &mut Reader) -> Result<Self> {
        Ok(ExecBlock {
            rom_offset: r.read_u32()?,
            entry_address: r.read_u32()?,
            ram_address: r.read_u32()?,
            size: r.read_u32()?,
        })
    }

    fn emit(&self, w: &mut Writer) {
        w.write_u32(self.rom_offset);
        w.write_u32(self.entry_address);
        w.write_u32(self.ram_address);
        w.write_u32(self.size);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayTable {
    pub offset: u32,
    pub size: u32,
}

/// The cartridge header. Every field round-trips verbatim except
/// `device_capacity` and the two CRC16 fields, which [`super::Rom::emit`]
/// recomputes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub title: [u8; 12],
    pub id_code: [u8; 4],
    pub developer_code: [u8; 2],
    pub unit_code: u8,
    pub encryption_seed: u8,
    pub device_capacity: u8,
    pub region: u8,
    pub version: u8,
    pub autostart: u8,
    pub arm9: ExecBlock,
    pub arm7: ExecBlock,
    pub fnt_offset: u32,
    pub fnt_size: u32,
    pub fat_offset: u32,
    pub fat_size: u32,
    pub arm9_overlay: OverlayTable,
    pub arm7_overlay: OverlayTable,
    pub normal_card_control: u32,
    pub secure_card_control: u32,
    pub banner_offset: u32,
    pub secure_area_crc: u16,
    pub secure_transfer_delay: u16,
    pub arm9_code_settings_pointer_address: u32,
    pub arm7_code_settings_pointer_address: u32,
    pub secure_area_disable: [u8; 8],
    pub used_rom_size: u32,
    pub header_size: u32,
    pub nintendo_logo: [u8; LOGO_LEN],
    pub header_crc16: u16,
}

impl Header {
    pub fn parse(data: &[u8]) -> Result<Header> {
        let mut r = Reader::new(data, true);
        let title = r.read_array()?;
        let id_code = r.read_array()?;
        let developer_code = r.read_array()?;
        let unit_code = r.read_u8()?;
        let encryption_seed = r.read_u8()?;
        let device_capacity = r.read_u8()?;
        r.seek(0x015 + 8);
        let region = r.read_u8()?;
        let version = r.read_u8()?;
        let autostart = r.read_u8()?;
        let arm9 = ExecBlock::parse(&mut r)?;
        let arm7 = ExecBlock::parse(&mut r)?;
        let fnt_offset = r.read_u32()?;
        let fnt_size = r.read_u32()?;
        let fat_offset = r.read_u32()?;
        let fat_size = r.read_u32()?;
        let arm9_overlay = OverlayTable {
            offset: r.read_u32()?,
            size: r.read_u32()?,
        };
        let arm7_overlay = OverlayTable {
            offset: r.read_u32()?,
            size: r.read_u32()?,
        };
        let normal_card_control = r.read_u32()?;
        let secure_card_control = r.read_u32()?;
        let banner_offset = r.read_u32()?;
        let secure_area_crc = r.read_u16()?;
        let secure_transfer_delay = r.read_u16()?;
        let arm9_code_settings_pointer_address = r.read_u32()?;
        let arm7_code_settings_pointer_address = r.read_u32()?;
        let secure_area_disable = r.read_array()?;
        let used_rom_size = r.read_u32()?;
        let header_size = r.read_u32()?;
        r.seek(0x0C0);
        let nintendo_logo = r.read_array()?;
        let header_crc16 = r.read_u16()?;

        Ok(Header {
            title,
            id_code,
            developer_code,
            unit_code,
            encryption_seed,
            device_capacity,
            region,
            version,
            autostart,
            arm9,
            arm7,
            fnt_offset,
            fnt_size,
            fat_offset,
            fat_size,
            arm9_overlay,
            arm7_overlay,
            normal_card_control,
            secure_card_control,
            banner_offset,
            secure_area_crc,
            secure_transfer_delay,
            arm9_code_settings_pointer_address,
            arm7_code_settings_pointer_address,
            secure_area_disable,
            used_rom_size,
            header_size,
            nintendo_logo,
            header_crc16,
        })
    }

    /// Emit the first `0x200` bytes. `header_crc16` is written verbatim;
    /// callers that want a freshly computed checksum should patch the
    /// result with [`Header::compute_crc16`] first (this is what
    /// [`super::Rom::emit`] does).
    pub fn emit(&self) -> Vec<u8> {
        let mut w = Writer::new(true);
        w.write_bytes(&self.title);
        w.write_bytes(&self.id_code);
        w.write_bytes(&self.developer_code);
        w.write_u8(self.unit_code);
        w.write_u8(self.encryption_seed);
        w.write_u8(self.device_capacity);
        w.write_zeros(8);
        w.write_u8(self.region);
        w.write_u8(self.version);
        w.write_u8(self.autostart);
        self.arm9.emit(&mut w);
        self.arm7.emit(&mut w);
        w.write_u32(self.fnt_offset);
        w.write_u32(self.fnt_size);
        w.write_u32(self.fat_offset);
        w.write_u32(self.fat_size);
        w.write_u32(self.arm9_overlay.offset);
        w.write_u32(self.arm9_overlay.size);
        w.write_u32(self.arm7_overlay.offset);
        w.write_u32(self.arm7_overlay.size);
        w.write_u32(self.normal_card_control);
        w.write_u32(self.secure_card_control);
        w.write_u32(self.banner_offset);
        w.write_u16(self.secure_area_crc);
        w.write_u16(self.secure_transfer_delay);
        w.write_u32(self.arm9_code_settings_pointer_address);
        w.write_u32(self.arm7_code_settings_pointer_address);
        w.write_bytes(&self.secure_area_disable);
        w.write_u32(self.used_rom_size);
        w.write_u32(self.header_size);
        debug_assert_eq!(w.tell(), 0x88);
        w.write_zeros(0x0C0 - 0x88);
        w.write_bytes(&self.nintendo_logo);
        w.write_u16(self.header_crc16);
        w.write_zeros(HEADER_SIZE - w.tell());
        w.finish().expect("header emit never uses anchors")
    }

    /// CRC16 over bytes `0x000..0x15C` - what [`Header::header_crc16`]
    /// should equal after a save.
    pub fn compute_crc16(&self) -> u16 {
        let bytes = self.emit();
        crc::crc16(&bytes[..CRC_COVERAGE_END])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Header {
        let mut title = [0u8; 12];
        title[..9].copy_from_slice(b"NEW MARIO");
        Header {
            title,
            id_code: *b"A2DE",
            developer_code: [0x30, 0x31],
            unit_code: 0,
            encryption_seed: 0,
            device_capacity: 9,
            region: 0,
            version: 0,
            autostart: 0,
            arm9: ExecBlock {
                rom_offset: 0x4000,
                entry_address: 0x0200_0000,
                ram_address: 0x0200_0000,
                size: 0x1000,
            },
            arm7: ExecBlock {
                rom_offset: 0x8000,
                entry_address: 0x0380_0000,
                ram_address: 0x0380_0000,
                size: 0x800,
            },
            fnt_offset: 0x9000,
            fnt_size: 0x100,
            fat_offset: 0x9100,
            fat_size: 0x80,
            arm9_overlay: OverlayTable::default(),
            arm7_overlay: OverlayTable::default(),
            normal_card_control: 0x0058_6000,
            secure_card_control: 0x0018_08F8,
            banner_offset: 0,
            secure_area_crc: 0,
            secure_transfer_delay: 0x0D7E,
            arm9_code_settings_pointer_address: 0,
            arm7_code_settings_pointer_address: 0,
            secure_area_disable: [0; 8],
            used_rom_size: 0x10000,
            header_size: HEADER_SIZE as u32,
            nintendo_logo: [0xAB; LOGO_LEN],
            header_crc16: 0,
        }
    }

    #[test]
    fn roundtrip_preserves_every_field() {
        let header = sample();
        let bytes = header.emit();
        assert_eq!(&bytes[0..16], b"NEW MARIO\0\0\0A2DE");
        let parsed = Header::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn crc16_covers_bytes_up_to_0x15c() {
        let mut header = sample();
        header.header_crc16 = header.compute_crc16();
        let bytes = header.emit();
        let expected = crc::crc16(&bytes[..CRC_COVERAGE_END]);
        assert_eq!(u16::from_le_bytes([bytes[0x15C], bytes[0x15D]]), expected);
    }
}

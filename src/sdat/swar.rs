//! SWAR - a packed archive of SWAVs, indexed by ordinal.
//!
//! ## Wire layout
//! ```text
//! [0..8]  fixed prefix (reserved, preserved verbatim)
//! [8..12] wave count (u32)
//! [12..]  wave count * u32 offsets, each pointing at a SWAV's "DATA"
//!         region (i.e. the bytes from `Swav::parse`'s offset 0 onward -
//!         the outer "SWAV" chunk framing real files carry is not stored,
//!         and is synthesized on access).
//! ```

use crate::cursor::{Reader, Writer};
use crate::error::Result;
use crate::sdat::swav::Swav;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swar {
    pub reserved_prefix: [u8; 8],
    pub waves: Vec<Swav>,
}

impl Swar {
    pub fn parse(data: &[u8]) -> Result<Swar> {
        let mut r = Reader::new(data, true);
        let reserved_prefix: [u8; 8] = r.read_array()?;
        let count = r.read_u32()? as usize;
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(r.read_u32()? as usize);
        }
        let waves = offsets
            .iter()
            .map(|&offset| Swav::parse(&data[offset..]))
            .collect::<Result<Vec<_>>>()?;
        Ok(Swar {
            reserved_prefix,
            waves,
        })
    }

    pub fn emit(&self) -> Vec<u8> {
        let payloads: Vec<Vec<u8>> = self.waves.iter().map(Swav::emit).collect();
        let header_len = 8 + 4 + 4 * self.waves.len();
        let mut offsets = Vec::with_capacity(self.waves.len());
        let mut cursor = header_len;
        for payload in &payloads {
            offsets.push(cursor as u32);
            cursor += payload.len();
        }

        let mut w = Writer::new(true);
        w.write_bytes(&self.reserved_prefix);
        w.write_u32(self.waves.len() as u32);
        for offset in offsets {
            w.write_u32(offset);
        }
        for payload in &payloads {
            w.write_bytes(payload);
        }
        w.finish().expect("SWAR emit never uses anchors")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdat::swav::WaveType;

    #[test]
    fn roundtrip_archive_of_two_waves() {
        let swar = Swar {
            reserved_prefix: [0xAA; 8],
            waves: vec![
                Swav {
                    wave_type: WaveType::Pcm8,
                    looping: false,
                    sample_rate: 8000,
                    timer: 0,
                    loop_start_words: 0,
                    samples: vec![1, 2, 3, 4],
                },
                Swav {
                    wave_type: WaveType::Pcm16,
                    looping: true,
                    sample_rate: 22050,
                    timer: 0,
                    loop_start_words: 1,
                    samples: vec![0xAA; 16],
                },
            ],
        };
        let bytes = swar.emit();
        assert_eq!(Swar::parse(&bytes).unwrap(), swar);
    }
}

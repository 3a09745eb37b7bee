//! SWAV - a single PCM/ADPCM wave clip.
//!
//! ## Wire layout
//! ```text
//! [0]    wave type (0=PCM8, 1=PCM16, 2=ADPCM)
//! [1]    loop flag (0/1)
//! [2..4] sample rate (u16)
//! [4..6] timer value (u16)
//! [6..8] loop-start offset, in 4-byte words (u16)
//! [8..10] total length, in 4-byte words, including the loop start (u16)
//! [10..] sample data
//! ```

use crate::cursor::{Reader, Writer};
use crate::error::{Context, Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveType {
    Pcm8,
    Pcm16,
    Adpcm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swav {
    pub wave_type: WaveType,
    pub looping: bool,
    pub sample_rate: u16,
    pub timer: u16,
    pub loop_start_words: u16,
    pub samples: Vec<u8>,
}

impl Swav {
    pub fn parse(data: &[u8]) -> Result<Swav> {
        let mut r = Reader::new(data, true);
        let wave_type = match r.read_u8()? {
            0 => WaveType::Pcm8,
            1 => WaveType::Pcm16,
            2 => WaveType::Adpcm,
            _ => return Err(Error::MalformedSdat(Context::new(0, "unknown wave type"))),
        };
        let looping = r.read_u8()? != 0;
        let sample_rate = r.read_u16()?;
        let timer = r.read_u16()?;
        let loop_start_words = r.read_u16()?;
        let total_words = r.read_u16()?;
        let total_bytes = (total_words as usize) * 4;
        let samples = r.read_bytes(total_bytes)?.to_vec();
        Ok(Swav {
            wave_type,
            looping,
            sample_rate,
            timer,
            loop_start_words,
            samples,
        })
    }

    pub fn emit(&self) -> Vec<u8> {
        let mut w = Writer::new(true);
        w.write_u8(match self.wave_type {
            WaveType::Pcm8 => 0,
            WaveType::Pcm16 => 1,
            WaveType::Adpcm => 2,
        });
        w.write_u8(self.looping as u8);
        w.write_u16(self.sample_rate);
        w.write_u16(self.timer);
        w.write_u16(self.loop_start_words);
        w.write_u16((self.samples.len() / 4) as u16);
        w.write_bytes(&self.samples);
        w.finish().expect("SWAV emit never uses anchors")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_pcm8() {
        let swav = Swav {
            wave_type: WaveType::Pcm8,
            looping: true,
            sample_rate: 16000,
            timer: 0xFC5C,
            loop_start_words: 2,
            samples: vec![0u8; 64],
        };
        let bytes = swav.emit();
        assert_eq!(Swav::parse(&bytes).unwrap(), swav);
    }

    #[test]
    fn rejects_unknown_wave_type() {
        let mut bytes = Swav {
            wave_type: WaveType::Pcm16,
            looping: false,
            sample_rate: 8000,
            timer: 0,
            loop_start_words: 0,
            samples: vec![0u8; 8],
        }
        .emit();
        bytes[0] = 9;
        assert!(matches!(Swav::parse(&bytes), Err(Error::MalformedSdat(_))));
    }
}

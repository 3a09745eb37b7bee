//! STRM - a multi-channel, multi-block streaming waveform.
//!
//! Every channel has the same number of blocks; within a channel every
//! block is `block_size` bytes except the last, which may be shorter; the
//! i-th block is the same size across channels. For ADPCM streams each
//! block carries its own 4-byte initial-predictor/step-index header.
//!
//! ## Wire layout
//! ```text
//! [0]     wave type (0=PCM8, 1=PCM16, 2=ADPCM)
//! [1]     channel count
//! [2..4]  sample rate (u16)
//! [4..6]  timer value (u16)
//! [6..8]  loop-start offset, in samples (u16)
//! [8..10] block count (u16)
//! [10..12] block size in bytes (u16)
//! [12..14] bytes used in the final block (u16)
//! [14..]  channel_count * block_count blocks, channel-major
//! ```

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use crate::sdat::swav::WaveType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strm {
    pub wave_type: WaveType,
    pub sample_rate: u16,
    pub timer: u16,
    pub loop_start_samples: u16,
    pub block_size: u16,
    pub final_block_used_bytes: u16,
    /// `channels[c][b]` is channel `c`'s `b`-th block.
    pub channels: Vec<Vec<Vec<u8>>>,
}

impl Strm {
    pub fn parse(data: &[u8]) -> Result<Strm> {
        let mut r = Reader::new(data, true);
        let wave_type = match r.read_u8()? {
            0 => WaveType::Pcm8,
            1 => WaveType::Pcm16,
            2 => WaveType::Adpcm,
            _ => return Err(Error::MalformedSdat(crate::error::Context::new(0, "unknown wave type"))),
        };
        let channel_count = r.read_u8()? as usize;
        let sample_rate = r.read_u16()?;
        let timer = r.read_u16()?;
        let loop_start_samples = r.read_u16()?;
        let block_count = r.read_u16()? as usize;
        let block_size = r.read_u16()?;
        let final_block_used_bytes = r.read_u16()?;

        let mut channels = vec![Vec::with_capacity(block_count); channel_count];
        for block_index in 0..block_count {
            let this_block_size = if block_index + 1 == block_count {
                final_block_used_bytes as usize
            } else {
                block_size as usize
            };
            for channel in channels.iter_mut() {
                channel.push(r.read_bytes(this_block_size)?.to_vec());
            }
        }

        Ok(Strm {
            wave_type,
            sample_rate,
            timer,
            loop_start_samples,
            block_size,
            final_block_used_bytes,
            channels,
        })
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        let block_count = self.channels.first().map_or(0, |c| c.len());
        for channel in &self.channels {
            if channel.len() != block_count {
                return Err(Error::PreconditionFailed(
                    "every STRM channel must have the same number of blocks",
                ));
            }
        }

        let mut w = Writer::new(true);
        w.write_u8(match self.wave_type {
            WaveType::Pcm8 => 0,
            WaveType::Pcm16 => 1,
            WaveType::Adpcm => 2,
        });
        w.write_u8(self.channels.len() as u8);
        w.write_u16(self.sample_rate);
        w.write_u16(self.timer);
        w.write_u16(self.loop_start_samples);
        w.write_u16(block_count as u16);
        w.write_u16(self.block_size);
        w.write_u16(self.final_block_used_bytes);
        for block_index in 0..block_count {
            for channel in &self.channels {
                w.write_bytes(&channel[block_index]);
            }
        }
        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_two_channel_stream() {
        let strm = Strm {
            wave_type: WaveType::Pcm16,
            sample_rate: 32000,
            timer: 0,
            loop_start_samples: 0,
            block_size: 4,
            final_block_used_bytes: 2,
            channels: vec![
                vec![vec![1, 2, 3, 4], vec![5, 6]],
                vec![vec![7, 8, 9, 10], vec![11, 12]],
            ],
        };
        let bytes = strm.emit().unwrap();
        assert_eq!(Strm::parse(&bytes).unwrap(), strm);
    }

    #[test]
    fn rejects_mismatched_channel_block_counts() {
        let strm = Strm {
            wave_type: WaveType::Pcm8,
            sample_rate: 8000,
            timer: 0,
            loop_start_samples: 0,
            block_size: 2,
            final_block_used_bytes: 2,
            channels: vec![vec![vec![1, 2]], vec![vec![1, 2], vec![3, 4]]],
        };
        assert!(matches!(strm.emit(), Err(Error::PreconditionFailed(_))));
    }
}

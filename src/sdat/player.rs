//! Sequence-player and stream-player INFO records. Both are small enough
//! that the INFO record *is* the whole object - there is no associated
//! FAT/FILE payload.

use crate::cursor::{Reader, Writer};
use crate::error::Result;

/// A sequence-player: how many simultaneous sequences it may run, which of
/// the 16 channels it may use, and how much heap it needs. A zero
/// `heap_size` or empty `channel_bitmask` means "determined at runtime".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencePlayer {
    pub max_sequences: u8,
    pub channel_bitmask: u16,
    pub heap_size: u32,
}

impl SequencePlayer {
    pub fn parse(data: &[u8]) -> Result<SequencePlayer> {
        let mut r = Reader::new(data, true);
        Ok(SequencePlayer {
            max_sequences: r.read_u8()?,
            channel_bitmask: r.read_u16()?,
            heap_size: r.read_u32()?,
        })
    }

    pub fn emit(&self) -> Vec<u8> {
        let mut w = Writer::new(true);
        w.write_u8(self.max_sequences);
        w.write_u16(self.channel_bitmask);
        w.write_u32(self.heap_size);
        w.finish().expect("sequence-player emit never uses anchors")
    }
}

/// A stream-player: an ordered, order-significant list of channel indices
/// (`0..=15`) it drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamPlayer {
    pub channels: Vec<u8>,
}

impl StreamPlayer {
    pub fn parse(data: &[u8]) -> Result<StreamPlayer> {
        let mut r = Reader::new(data, true);
        let count = r.read_u8()? as usize;
        let mut channels = Vec::with_capacity(count);
        for _ in 0..count {
            channels.push(r.read_u8()?);
        }
        Ok(StreamPlayer { channels })
    }

    pub fn emit(&self) -> Vec<u8> {
        let mut w = Writer::new(true);
        w.write_u8(self.channels.len() as u8);
        for &channel in &self.channels {
            w.write_u8(channel);
        }
        w.finish().expect("stream-player emit never uses anchors")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_sequence_player() {
        let player = SequencePlayer {
            max_sequences: 8,
            channel_bitmask: 0xFFFF,
            heap_size: 0,
        };
        assert_eq!(SequencePlayer::parse(&player.emit()).unwrap(), player);
    }

    #[test]
    fn roundtrip_stream_player_preserves_order() {
        let player = StreamPlayer {
            channels: vec![3, 1, 2],
        };
        assert_eq!(StreamPlayer::parse(&player.emit()).unwrap(), player);
    }
}

//! SSEQ - a single sequence: an opcode blob plus six bytes of INFO-record
//! playback metadata. The opcode blob itself is handled by [`crate::seq`].

use crate::error::Result;
use crate::seq::{self, EventId, EventList};

/// Playback metadata an SSEQ's SDAT INFO record carries alongside the blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SequenceInfo {
    pub bank_id: u16,
    pub volume: u8,
    pub channel_pressure: u8,
    pub polyphonic_pressure: u8,
    pub player_id: u8,
    pub unknown: u8,
}

/// A parsed sequence: its event arena, the entry event, and its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sseq {
    pub events: EventList,
    pub entry: EventId,
    pub info: SequenceInfo,
}

impl Sseq {
    /// Parse an opcode blob; playback always starts at offset 0.
    pub fn parse(data: &[u8], info: SequenceInfo) -> Result<Sseq> {
        let (events, notable) = seq::lift(data, &[0])?;
        Ok(Sseq {
            events,
            entry: notable[0],
            info,
        })
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        let (bytes, _) = seq::lower(&self.events, &[self.entry])?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_minimal_sequence() {
        let data = vec![0x80, 5, 0xFF]; // Rest(5), EndTrack
        let info = SequenceInfo {
            bank_id: 2,
            volume: 127,
            channel_pressure: 64,
            polyphonic_pressure: 0,
            player_id: 1,
            unknown: 0,
        };
        let sseq = Sseq::parse(&data, info).unwrap();
        assert_eq!(sseq.emit().unwrap(), data);
        assert_eq!(sseq.info, info);
    }

    #[test]
    fn define_tracks_begin_track_and_jump_form_a_cycle() {
        use crate::seq::Event;

        // @0  DefineTracks{0,1}           (3 bytes)
        // @3  BeginTrack 1 -> @12         (5 bytes)
        // @8  Jump -> @0                  (4 bytes)
        // @12 Note, Note                  (3 bytes each)
        // @18 EndTrack                    (1 byte)
        let mut data = vec![0xFE, 0x03, 0x00, 0x93, 1, 0, 0, 0, 0x94, 0, 0, 0, 60, 100, 10, 60, 100, 10, 0xFF];
        data[5..8].copy_from_slice(&12u32.to_le_bytes()[..3]);
        data[9..12].copy_from_slice(&0u32.to_le_bytes()[..3]);

        let info = SequenceInfo::default();
        let sseq = Sseq::parse(&data, info).unwrap();
        assert_eq!(sseq.events.events.len(), 6);

        let define_tracks = sseq.entry;
        assert!(matches!(
            sseq.events.get(define_tracks),
            Some(Event::DefineTracks { mask: 0x0003 })
        ));

        let jump_target = sseq.events.events.iter().find_map(|e| match e {
            Event::Jump { target } => Some(*target),
            _ => None,
        });
        assert_eq!(jump_target, Some(define_tracks));

        let begin_track_target = sseq.events.events.iter().find_map(|e| match e {
            Event::BeginTrack { target, .. } => Some(*target),
            _ => None,
        });
        assert!(matches!(
            begin_track_target.and_then(|id| sseq.events.get(id)),
            Some(Event::Note { pitch: 60, .. })
        ));

        assert_eq!(sseq.emit().unwrap(), data);
    }
}

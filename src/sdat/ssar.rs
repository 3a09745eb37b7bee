//! SSAR - a sequence archive: several named sequence entries sharing one
//! opcode blob.

use crate::error::Result;
use crate::seq::{self, EventId, EventList};

/// One named entry within an SSAR: where playback starts plus the same
/// five playback parameters an SSEQ carries (minus the unused byte).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEntry {
    pub name: Option<String>,
    pub start: EventId,
    pub bank_id: u16,
    pub volume: u8,
    pub channel_pressure: u8,
    pub polyphonic_pressure: u8,
    pub player_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ssar {
    pub events: EventList,
    pub entries: Vec<SequenceEntry>,
}

impl Ssar {
    /// Parse an opcode blob shared by all `entry_offsets` (named, in order).
    pub fn parse(
        data: &[u8],
        entry_offsets: &[usize],
        entry_names: &[Option<String>],
        entry_params: &[(u16, u8, u8, u8, u8)],
    ) -> Result<Ssar> {
        let (events, notable) = seq::lift(data, entry_offsets)?;
        let entries = notable
            .into_iter()
            .enumerate()
            .map(|(i, start)| {
                let (bank_id, volume, channel_pressure, polyphonic_pressure, player_id) =
                    entry_params[i];
                SequenceEntry {
                    name: entry_names[i].clone(),
                    start,
                    bank_id,
                    volume,
                    channel_pressure,
                    polyphonic_pressure,
                    player_id,
                }
            })
            .collect();
        Ok(Ssar { events, entries })
    }

    pub fn emit(&self) -> Result<(Vec<u8>, Vec<usize>)> {
        let notable: Vec<EventId> = self.entries.iter().map(|e| e.start).collect();
        seq::lower(&self.events, &notable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_two_entries_sharing_one_blob() {
        // Entry A at 0: Rest(5), EndTrack. Entry B at 3: EndTrack.
        let data = vec![0x80, 5, 0xFF, 0xFF];
        let ssar = Ssar::parse(
            &data,
            &[0, 3],
            &[Some("intro".into()), Some("loop".into())],
            &[(0, 127, 0, 0, 0), (1, 100, 0, 0, 0)],
        )
        .unwrap();
        assert_eq!(ssar.entries.len(), 2);
        let (bytes, offsets) = ssar.emit().unwrap();
        assert_eq!(bytes, data);
        assert_eq!(offsets, vec![0, 3]);
    }
}

//! The SSEQ/SSAR event codec: decode an opcode blob into an arena of
//! [`Event`]s with address operands resolved to in-arena references
//! ([`lift`]), and serialize an arena back to bytes ([`lower`]).
//!
//! Both directions are driven from a caller-supplied set of "notable"
//! offsets: the single entry point for an SSEQ, or the per-entry start
//! offsets of an SSAR. See [`event`] for the opcode table and [`varint`]
//! for the duration/packed-id integer encoding.

pub mod event;
pub mod varint;

pub use event::Event;

use crate::cursor::{Reader, Writer};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// A reference to an event within an [`EventList`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub usize);

/// An arena of events produced by [`lift`] (or built up by hand) and
/// consumed by [`lower`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventList {
    pub events: Vec<Event>,
}

impl EventList {
    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(id.0)
    }
}

/// Decode `data` starting from each of `notable_offsets`, following every
/// address operand reachable from them, and return the resulting arena plus
/// each notable offset's resolved [`EventId`] (same order as the input).
///
/// Bytes never reached from any notable offset - internal gaps as well as a
/// trailing run - are preserved as [`Event::RawData`] so `lower` can
/// reproduce them.
pub fn lift(data: &[u8], notable_offsets: &[usize]) -> Result<(EventList, Vec<EventId>)> {
    let mut worklist: VecDeque<usize> = notable_offsets.iter().copied().collect();
    let mut queued: HashSet<usize> = notable_offsets.iter().copied().collect();
    // start offset -> (end offset, decoded event)
    let mut spans: BTreeMap<usize, (usize, event::RawEvent)> = BTreeMap::new();

    while let Some(offset) = worklist.pop_front() {
        if spans.contains_key(&offset) {
            continue;
        }
        if let Some((_, &(pend, _))) = spans.range(..offset).next_back() {
            if offset < pend {
                return Err(Error::OverlappingEvents { offset });
            }
        }

        let mut r = Reader::new(data, true);
        r.seek(offset);
        let raw = event::decode_raw(&mut r)?;
        let end = r.tell();

        if let Some((&nstart, _)) = spans.range(offset..).next() {
            if nstart < end {
                return Err(Error::OverlappingEvents { offset: nstart });
            }
        }

        if let Some(target) = raw.address_target() {
            if queued.insert(target) {
                worklist.push_back(target);
            }
        }
        if raw.falls_through() && end < data.len() && queued.insert(end) {
            worklist.push_back(end);
        }

        spans.insert(offset, (end, raw));
    }

    enum Slot<'a> {
        Gap(std::ops::Range<usize>),
        Decoded(&'a event::RawEvent),
    }

    let mut slots: Vec<Slot> = Vec::new();
    let mut offset_to_id: HashMap<usize, EventId> = HashMap::new();
    let mut cursor = 0usize;
    for (&start, (end, raw)) in spans.iter() {
        if start > cursor {
            slots.push(Slot::Gap(cursor..start));
        }
        offset_to_id.insert(start, EventId(slots.len()));
        slots.push(Slot::Decoded(raw));
        cursor = *end;
    }
    if cursor < data.len() {
        slots.push(Slot::Gap(cursor..data.len()));
    }

    let events = slots
        .iter()
        .map(|slot| match slot {
            Slot::Gap(range) => Event::RawData(data[range.clone()].to_vec()),
            Slot::Decoded(raw) => raw.resolve(&offset_to_id),
        })
        .collect();

    let notable_ids = notable_offsets
        .iter()
        .map(|offset| {
            *offset_to_id
                .get(offset)
                .expect("every notable offset is decoded before this map is built")
        })
        .collect();

    Ok((EventList { events }, notable_ids))
}

/// Serialize `list` back to bytes and return the final byte offset of each
/// entry in `notable` (same order as the input).
///
/// Two passes: the first computes each event's encoded length (which may
/// depend on its current operand values, e.g. varint width) and turns that
/// into a byte offset per event via a running prefix sum; the second emits
/// the bytes, substituting each address operand with its target's offset
/// from the first pass. Distinct events always land at distinct offsets
/// (every encoding is at least one byte), so address operands resolved
/// through an [`EventId`] can never alias two different targets onto the
/// same offset.
pub fn lower(list: &EventList, notable: &[EventId]) -> Result<(Vec<u8>, Vec<usize>)> {
    let mut offsets = Vec::with_capacity(list.events.len());
    let mut cursor = 0usize;
    for event in &list.events {
        offsets.push(cursor);
        cursor += event::encoded_len(event)?;
    }

    let mut w = Writer::new(true);
    for (i, event) in list.events.iter().enumerate() {
        let here = offsets[i];
        event::write_event(&mut w, event, |target| {
            offsets
                .get(target.0)
                .map(|&o| o as u32)
                .ok_or(Error::DanglingReference { offset: here })
        })?;
    }

    let notable_offsets = notable
        .iter()
        .map(|id| {
            offsets
                .get(id.0)
                .copied()
                .ok_or(Error::DanglingReference { offset: w.tell() })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((w.finish()?, notable_offsets))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lift_then_lower_reproduces_a_linear_track() {
        // Note(60, vel=100, dur=10), Rest(dur=5), EndTrack
        let data: Vec<u8> = vec![60, 100, 10, 0x80, 5, 0xFF];
        let (list, notable) = lift(&data, &[0]).unwrap();
        assert_eq!(list.events.len(), 3);
        assert!(matches!(list.events[0], Event::Note { pitch: 60, .. }));
        assert!(matches!(list.events[2], Event::EndTrack));

        let (bytes, offsets) = lower(&list, &notable).unwrap();
        assert_eq!(bytes, data);
        assert_eq!(offsets, vec![0]);
    }

    #[test]
    fn jump_target_resolves_to_a_reference_not_an_offset() {
        // Jump(target=4), EndTrack at offset 4.
        let mut data = vec![0x94, 0, 0, 0, 0xFF];
        data[1..4].copy_from_slice(&4u32.to_le_bytes()[..3]);
        let (list, notable) = lift(&data, &[0]).unwrap();
        match &list.events[0] {
            Event::Jump { target } => assert!(matches!(list.get(*target), Some(Event::EndTrack))),
            other => panic!("expected Jump, got {other:?}"),
        }
        let (bytes, _) = lower(&list, &notable).unwrap();
        assert_eq!(bytes, data);
    }

    #[test]
    fn shared_jump_target_is_not_an_overlap() {
        // Two jumps to the same EndTrack are fine; re-decoding a span isn't.
        let mut data = vec![0x94, 0, 0, 0, 0x94, 0, 0, 0, 0xFF];
        data[1..4].copy_from_slice(&8u32.to_le_bytes()[..3]);
        data[5..8].copy_from_slice(&8u32.to_le_bytes()[..3]);
        let (list, notable) = lift(&data, &[0, 4]).unwrap();
        assert_eq!(notable.len(), 2);
        match (&list.events[notable[0].0], &list.events[notable[1].0]) {
            (Event::Jump { target: a }, Event::Jump { target: b }) => assert_eq!(a, b),
            other => panic!("expected two Jumps, got {other:?}"),
        }
    }

    #[test]
    fn overlapping_target_is_rejected() {
        // Jump(target=1) lands inside the 4-byte Jump at offset 0.
        let mut data = vec![0x94, 0, 0, 0];
        data[1..4].copy_from_slice(&1u32.to_le_bytes()[..3]);
        assert!(matches!(
            lift(&data, &[0]),
            Err(Error::OverlappingEvents { .. })
        ));
    }

    #[test]
    fn trailing_unreachable_bytes_become_raw_data() {
        let data = vec![0xFF, 0xDE, 0xAD, 0xBE, 0xEF];
        let (list, notable) = lift(&data, &[0]).unwrap();
        assert_eq!(list.events.len(), 2);
        assert_eq!(list.events[1], Event::RawData(vec![0xDE, 0xAD, 0xBE, 0xEF]));
        let (bytes, _) = lower(&list, &notable).unwrap();
        assert_eq!(bytes, data);
    }

    #[test]
    fn dangling_reference_on_lower_is_rejected() {
        let list = EventList {
            events: vec![Event::Jump {
                target: EventId(5),
            }],
        };
        assert!(matches!(
            lower(&list, &[]),
            Err(Error::DanglingReference { .. })
        ));
    }

    #[test]
    fn random_wrapper_roundtrips_its_fixed_args_and_bounds() {
        // Random wrapping a ByteController (0xC0), fixed arg 0x40, bounds -2..=2.
        let data: Vec<u8> = vec![0xA0, 0xC0, 0x40, 0xFE, 0xFF, 0x02, 0x00, 0xFF];
        let (list, notable) = lift(&data, &[0]).unwrap();
        match &list.events[0] {
            Event::Random {
                sub_opcode,
                fixed_args,
                min,
                max,
            } => {
                assert_eq!(*sub_opcode, 0xC0);
                assert_eq!(fixed_args, &[0x40]);
                assert_eq!(*min, -2);
                assert_eq!(*max, 2);
            }
            other => panic!("expected Random, got {other:?}"),
        }
        let (bytes, _) = lower(&list, &notable).unwrap();
        assert_eq!(bytes, data);
    }

    #[test]
    fn self_targeting_jump_does_not_loop_forever() {
        // Jump(target=0) pointing at itself: a one-event cycle.
        let mut data = vec![0x94, 0, 0, 0];
        data[1..4].copy_from_slice(&0u32.to_le_bytes()[..3]);
        let (list, notable) = lift(&data, &[0]).unwrap();
        assert_eq!(list.events.len(), 1);
        match &list.events[0] {
            Event::Jump { target } => assert_eq!(*target, notable[0]),
            other => panic!("expected Jump, got {other:?}"),
        }
        let (bytes, _) = lower(&list, &notable).unwrap();
        assert_eq!(bytes, data);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        let data = vec![0x96];
        assert!(matches!(lift(&data, &[0]), Err(Error::MalformedSseq(_))));
    }
}

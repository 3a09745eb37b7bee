//! The SSEQ/SSAR opcode table: one tagged record per event, with operand
//! layout determined by the discriminant byte.
//!
//! | Discriminant | Event | Operands |
//! |---|---|---|
//! | `0x00..=0x7F` | Note | pitch is the discriminant; velocity byte (MSB = flag) + varint duration |
//! | `0x80` | Rest | varint duration |
//! | `0x81` | InstrumentSwitch | varint packed `(bankId<<7)\|instrument` |
//! | `0x93` | BeginTrack | track number byte + 24-bit event offset |
//! | `0x94` | Jump | 24-bit event offset |
//! | `0x95` | Call | 24-bit event offset |
//! | `0xA0` | Random | sub-opcode + its fixed args + i16 min + i16 max |
//! | `0xA1` | FromVariable | sub-opcode + its fixed args + variable id byte |
//! | `0xA2` | If | none |
//! | `0xB0..=0xBD` | VarOp | variable id byte + signed 16-bit value |
//! | `0xC0..=0xCF`, `0xD0..=0xD6` | ByteController | single byte value |
//! | `0xE0..=0xE3` | WordController | signed 16-bit value |
//! | `0xFC` | EndLoop | none |
//! | `0xFD` | Return | none |
//! | `0xFE` | DefineTracks | 16-bit track bitmask |
//! | `0xFF` | EndTrack | none |
//!
//! `Random`/`FromVariable` wrap a *fixed-width* sub-opcode; the wrapped
//! opcode's operand bytes are captured verbatim rather than further
//! decoded, since the format never wraps a variable-length or
//! address-carrying opcode. [`fixed_operand_len`] is the authority for
//! which opcodes qualify.

use crate::cursor::{Reader, Writer};
use crate::error::{Context, Error, Result};
use crate::seq::{varint, EventId};
use std::collections::HashMap;

/// One decoded event, with address operands resolved to [`EventId`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Note {
        pitch: u8,
        velocity: u8,
        unknown_flag: bool,
        duration: u32,
    },
    Rest {
        duration: u32,
    },
    InstrumentSwitch {
        packed_id: u32,
    },
    BeginTrack {
        track_no: u8,
        target: EventId,
    },
    Jump {
        target: EventId,
    },
    Call {
        target: EventId,
    },
    Random {
        sub_opcode: u8,
        fixed_args: Vec<u8>,
        min: i16,
        max: i16,
    },
    FromVariable {
        sub_opcode: u8,
        fixed_args: Vec<u8>,
        var_id: u8,
    },
    If,
    VarOp {
        op: u8,
        var_id: u8,
        value: i16,
    },
    ByteController {
        op: u8,
        value: u8,
    },
    WordController {
        op: u8,
        value: i16,
    },
    EndLoop,
    Return,
    DefineTracks {
        mask: u16,
    },
    EndTrack,
    /// Bytes unreachable from any notable offset, kept verbatim so emit can
    /// reproduce the original blob exactly.
    RawData(Vec<u8>),
}

/// Byte length of `event` were it written now, given its current operand
/// values (varint-bearing operands vary in width with magnitude).
pub(crate) fn encoded_len(event: &Event) -> Result<usize> {
    Ok(match event {
        Event::Note { duration, .. } => 2 + varint::encoded_len(*duration)?,
        Event::Rest { duration } => 1 + varint::encoded_len(*duration)?,
        Event::InstrumentSwitch { packed_id } => 1 + varint::encoded_len(*packed_id)?,
        Event::BeginTrack { .. } => 5,
        Event::Jump { .. } | Event::Call { .. } => 4,
        Event::Random { fixed_args, .. } => 6 + fixed_args.len(),
        Event::FromVariable { fixed_args, .. } => 3 + fixed_args.len(),
        Event::If => 1,
        Event::VarOp { .. } => 4,
        Event::ByteController { .. } => 2,
        Event::WordController { .. } => 3,
        Event::EndLoop | Event::Return | Event::EndTrack => 1,
        Event::DefineTracks { .. } => 3,
        Event::RawData(bytes) => bytes.len(),
    })
}

/// Write `event`, resolving its address operand (if any) through `offset_of`.
pub(crate) fn write_event(
    w: &mut Writer,
    event: &Event,
    offset_of: impl Fn(EventId) -> Result<u32>,
) -> Result<()> {
    match event {
        Event::Note {
            pitch,
            velocity,
            unknown_flag,
            duration,
        } => {
            w.write_u8(*pitch);
            w.write_u8(velocity | if *unknown_flag { 0x80 } else { 0 });
            varint::write(w, *duration)?;
        }
        Event::Rest { duration } => {
            w.write_u8(0x80);
            varint::write(w, *duration)?;
        }
        Event::InstrumentSwitch { packed_id } => {
            w.write_u8(0x81);
            varint::write(w, *packed_id)?;
        }
        Event::BeginTrack { track_no, target } => {
            w.write_u8(0x93);
            w.write_u8(*track_no);
            w.write_u24(offset_of(*target)?);
        }
        Event::Jump { target } => {
            w.write_u8(0x94);
            w.write_u24(offset_of(*target)?);
        }
        Event::Call { target } => {
            w.write_u8(0x95);
            w.write_u24(offset_of(*target)?);
        }
        Event::Random {
            sub_opcode,
            fixed_args,
            min,
            max,
        } => {
            w.write_u8(0xA0);
            w.write_u8(*sub_opcode);
            w.write_bytes(fixed_args);
            w.write_i16(*min);
            w.write_i16(*max);
        }
        Event::FromVariable {
            sub_opcode,
            fixed_args,
            var_id,
        } => {
            w.write_u8(0xA1);
            w.write_u8(*sub_opcode);
            w.write_bytes(fixed_args);
            w.write_u8(*var_id);
        }
        Event::If => w.write_u8(0xA2),
        Event::VarOp { op, var_id, value } => {
            w.write_u8(*op);
            w.write_u8(*var_id);
            w.write_i16(*value);
        }
        Event::ByteController { op, value } => {
            w.write_u8(*op);
            w.write_u8(*value);
        }
        Event::WordController { op, value } => {
            w.write_u8(*op);
            w.write_i16(*value);
        }
        Event::EndLoop => w.write_u8(0xFC),
        Event::Return => w.write_u8(0xFD),
        Event::DefineTracks { mask } => {
            w.write_u8(0xFE);
            w.write_u16(*mask);
        }
        Event::EndTrack => w.write_u8(0xFF),
        Event::RawData(bytes) => w.write_bytes(bytes),
    }
    Ok(())
}

/// An event as freshly decoded, before address operands are resolved to
/// [`EventId`]s - they are still raw byte offsets at this stage.
#[derive(Debug, Clone)]
pub(crate) enum RawEvent {
    Note {
        pitch: u8,
        velocity: u8,
        unknown_flag: bool,
        duration: u32,
    },
    Rest {
        duration: u32,
    },
    InstrumentSwitch {
        packed_id: u32,
    },
    BeginTrack {
        track_no: u8,
        target: usize,
    },
    Jump {
        target: usize,
    },
    Call {
        target: usize,
    },
    Random {
        sub_opcode: u8,
        fixed_args: Vec<u8>,
        min: i16,
        max: i16,
    },
    FromVariable {
        sub_opcode: u8,
        fixed_args: Vec<u8>,
        var_id: u8,
    },
    If,
    VarOp {
        op: u8,
        var_id: u8,
        value: i16,
    },
    ByteController {
        op: u8,
        value: u8,
    },
    WordController {
        op: u8,
        value: i16,
    },
    EndLoop,
    Return,
    DefineTracks {
        mask: u16,
    },
    EndTrack,
}

impl RawEvent {
    /// The byte offset this event's address operand targets, if it has one.
    pub(crate) fn address_target(&self) -> Option<usize> {
        match self {
            RawEvent::BeginTrack { target, .. } => Some(*target),
            RawEvent::Jump { target } => Some(*target),
            RawEvent::Call { target } => Some(*target),
            _ => None,
        }
    }

    /// Whether decoding should continue at the byte immediately after this
    /// event. `Jump` does not (it unconditionally transfers control);
    /// `EndTrack`/`Return` halt that path; everything else, including
    /// `BeginTrack`/`Call`, falls through.
    pub(crate) fn falls_through(&self) -> bool {
        !matches!(self, RawEvent::Jump { .. } | RawEvent::EndTrack | RawEvent::Return)
    }

    /// Convert to the public [`Event`], resolving any address operand
    /// through `offset_to_id`.
    ///
    /// Panics if an address operand's target offset is absent from the map;
    /// that cannot happen for an `offset_to_id` built by [`super::lift`],
    /// since every target this event carries was pushed onto and drained
    /// from the same worklist that produced the map.
    pub(crate) fn resolve(&self, offset_to_id: &HashMap<usize, EventId>) -> Event {
        let id = |offset: usize| {
            *offset_to_id
                .get(&offset)
                .expect("lift() resolves every pushed worklist offset before building this map")
        };
        match self {
            RawEvent::Note {
                pitch,
                velocity,
                unknown_flag,
                duration,
            } => Event::Note {
                pitch: *pitch,
                velocity: *velocity,
                unknown_flag: *unknown_flag,
                duration: *duration,
            },
            RawEvent::Rest { duration } => Event::Rest { duration: *duration },
            RawEvent::InstrumentSwitch { packed_id } => Event::InstrumentSwitch {
                packed_id: *packed_id,
            },
            RawEvent::BeginTrack { track_no, target } => Event::BeginTrack {
                track_no: *track_no,
                target: id(*target),
            },
            RawEvent::Jump { target } => Event::Jump { target: id(*target) },
            RawEvent::Call { target } => Event::Call { target: id(*target) },
            RawEvent::Random {
                sub_opcode,
                fixed_args,
                min,
                max,
            } => Event::Random {
                sub_opcode: *sub_opcode,
                fixed_args: fixed_args.clone(),
                min: *min,
                max: *max,
            },
            RawEvent::FromVariable {
                sub_opcode,
                fixed_args,
                var_id,
            } => Event::FromVariable {
                sub_opcode: *sub_opcode,
                fixed_args: fixed_args.clone(),
                var_id: *var_id,
            },
            RawEvent::If => Event::If,
            RawEvent::VarOp { op, var_id, value } => Event::VarOp {
                op: *op,
                var_id: *var_id,
                value: *value,
            },
            RawEvent::ByteController { op, value } => Event::ByteController {
                op: *op,
                value: *value,
            },
            RawEvent::WordController { op, value } => Event::WordController {
                op: *op,
                value: *value,
            },
            RawEvent::EndLoop => Event::EndLoop,
            RawEvent::Return => Event::Return,
            RawEvent::DefineTracks { mask } => Event::DefineTracks { mask: *mask },
            RawEvent::EndTrack => Event::EndTrack,
        }
    }
}

/// Decode one event at the cursor's current position.
pub(crate) fn decode_raw(r: &mut Reader) -> Result<RawEvent> {
    let pos = r.tell();
    let opcode = r.read_u8()?;
    match opcode {
        0x00..=0x7F => {
            let velocity_byte = r.read_u8()?;
            Ok(RawEvent::Note {
                pitch: opcode,
                velocity: velocity_byte & 0x7F,
                unknown_flag: velocity_byte & 0x80 != 0,
                duration: varint::read(r)?,
            })
        }
        0x80 => Ok(RawEvent::Rest {
            duration: varint::read(r)?,
        }),
        0x81 => Ok(RawEvent::InstrumentSwitch {
            packed_id: varint::read(r)?,
        }),
        0x93 => {
            let track_no = r.read_u8()?;
            let target = r.read_u24()? as usize;
            Ok(RawEvent::BeginTrack { track_no, target })
        }
        0x94 => Ok(RawEvent::Jump {
            target: r.read_u24()? as usize,
        }),
        0x95 => Ok(RawEvent::Call {
            target: r.read_u24()? as usize,
        }),
        0xA0 => {
            let sub_opcode = r.read_u8()?;
            let fixed_args = read_fixed_args(r, sub_opcode, pos)?;
            let min = r.read_i16()?;
            let max = r.read_i16()?;
            Ok(RawEvent::Random {
                sub_opcode,
                fixed_args,
                min,
                max,
            })
        }
        0xA1 => {
            let sub_opcode = r.read_u8()?;
            let fixed_args = read_fixed_args(r, sub_opcode, pos)?;
            let var_id = r.read_u8()?;
            Ok(RawEvent::FromVariable {
                sub_opcode,
                fixed_args,
                var_id,
            })
        }
        0xA2 => Ok(RawEvent::If),
        0xB0..=0xBD => Ok(RawEvent::VarOp {
            op: opcode,
            var_id: r.read_u8()?,
            value: r.read_i16()?,
        }),
        0xC0..=0xCF | 0xD0..=0xD6 => Ok(RawEvent::ByteController {
            op: opcode,
            value: r.read_u8()?,
        }),
        0xE0..=0xE3 => Ok(RawEvent::WordController {
            op: opcode,
            value: r.read_i16()?,
        }),
        0xFC => Ok(RawEvent::EndLoop),
        0xFD => Ok(RawEvent::Return),
        0xFE => Ok(RawEvent::DefineTracks { mask: r.read_u16()? }),
        0xFF => Ok(RawEvent::EndTrack),
        _ => Err(Error::MalformedSseq(Context::new(pos, "unknown opcode"))),
    }
}

fn read_fixed_args(r: &mut Reader, sub_opcode: u8, wrapper_pos: usize) -> Result<Vec<u8>> {
    let len = fixed_operand_len(sub_opcode).ok_or_else(|| {
        Error::MalformedSseq(Context::new(
            wrapper_pos,
            "opcode cannot be wrapped by Random/FromVariable",
        ))
    })?;
    Ok(r.read_bytes(len)?.to_vec())
}

/// Byte width of `opcode`'s operand when it is *not* variable-length or
/// address-carrying - the only kind `Random`/`FromVariable` may wrap.
fn fixed_operand_len(opcode: u8) -> Option<usize> {
    match opcode {
        0xA2 | 0xFC | 0xFD | 0xFF => Some(0),
        0xB0..=0xBD => Some(3),
        0xC0..=0xCF | 0xD0..=0xD6 => Some(1),
        0xE0..=0xE3 | 0xFE => Some(2),
        _ => None,
    }
}

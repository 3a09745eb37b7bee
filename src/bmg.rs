//! BMG - message/subtitle container. Message text and any embedded escape
//! sequences are carried as opaque bytes; decoding/interpreting the text
//! itself (beyond locating it in `DAT1`) and the `FLW1`/`FLI1` script
//! instructions is out of scope here.
//!
//! ## Wire layout
//! ```text
//! [0..8)   magic "MESGbmg1"
//! [8..12)  total file size
//! [12..16) section count
//! [16]     encoding byte (1=cp1252, 2=UTF-16, 3=Shift-JIS, 4=UTF-8)
//! [17..32) reserved
//! INF1 chunk: magic "INF1", chunk_size, message_count:u16, info_size:u16,
//!             message_count * info_size-byte records; each record's first
//!             4 bytes are a byte offset into DAT1's data region, any
//!             trailing bytes are an opaque per-message info payload
//! DAT1 chunk: magic "DAT1", chunk_size, concatenated per-message byte
//!             strings, each terminated by encoding-width zero bytes
//! FLW1 chunk (optional): magic "FLW1", chunk_size, opaque instruction bytes
//! FLI1 chunk (optional): magic "FLI1", chunk_size, opaque index bytes
//! ```
//! Every chunk is zero-padded to a multiple of 4; multi-byte integers
//! follow the container's declared endianness.

use crate::cursor::{Reader, Writer};
use crate::error::{Context, Error, Result};

const MAGIC: &[u8; 8] = b"MESGbmg1";
const HEADER_SIZE: usize = 0x20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Cp1252,
    Utf16,
    ShiftJis,
    Utf8,
}

impl Encoding {
    fn to_byte(self) -> u8 {
        match self {
            Encoding::Cp1252 => 1,
            Encoding::Utf16 => 2,
            Encoding::ShiftJis => 3,
            Encoding::Utf8 => 4,
        }
    }

    fn from_byte(b: u8) -> Result<Encoding> {
        match b {
            1 => Ok(Encoding::Cp1252),
            2 => Ok(Encoding::Utf16),
            3 => Ok(Encoding::ShiftJis),
            4 => Ok(Encoding::Utf8),
            _ => Err(Error::MalformedBmg(Context::new(16, "unknown encoding byte"))),
        }
    }

    fn terminator_width(self) -> usize {
        match self {
            Encoding::Utf16 => 2,
            _ => 1,
        }
    }
}

/// One message: its raw (still-encoded) text bytes and an opaque per-record
/// info payload whose length must be the same across every message in a
/// [`Bmg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: Vec<u8>,
    pub info: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bmg {
    pub encoding: Encoding,
    pub big_endian: bool,
    pub messages: Vec<Message>,
    pub flow: Option<Vec<u8>>,
    pub flow_index: Option<Vec<u8>>,
}

struct ChunkHeader {
    magic: [u8; 4],
    size: usize,
    body_start: usize,
}

fn read_chunk_header(data: &[u8], pos: usize, le: bool) -> Result<ChunkHeader> {
    let mut r = Reader::new(data, le);
    r.seek(pos);
    let magic = r.read_array()?;
    let size = r.read_u32()? as usize;
    Ok(ChunkHeader {
        magic,
        size,
        body_start: r.tell(),
    })
}

fn read_terminated(data: &[u8], start: usize, unit: usize) -> Result<Vec<u8>> {
    let mut end = start;
    loop {
        let chunk = data.get(end..end + unit).ok_or(Error::OutOfBounds { pos: end })?;
        if chunk.iter().all(|&b| b == 0) {
            break;
        }
        end += unit;
    }
    Ok(data[start..end].to_vec())
}

impl Bmg {
    pub fn parse(data: &[u8]) -> Result<Bmg> {
        let mut r = Reader::new(data, true);
        r.expect_magic(MAGIC)?;
        r.read_u32()?; // total size
        let section_count = r.read_u32()? as usize;
        let encoding = Encoding::from_byte(r.read_u8()?)?;

        // BMG carries no byte-order mark of its own; every DS-era BMG on
        // disk is little-endian, so that's what's assumed here.
        let big_endian = false;

        let mut pos = HEADER_SIZE;
        let mut inf1: Option<(usize, usize, &[u8])> = None;
        let mut dat1: Option<&[u8]> = None;
        let mut flow = None;
        let mut flow_index = None;

        for _ in 0..section_count {
            let chunk = read_chunk_header(data, pos, !big_endian)?;
            let body = data
                .get(chunk.body_start..pos + chunk.size)
                .ok_or(Error::OutOfBounds { pos: chunk.body_start })?;
            match &chunk.magic {
                b"INF1" => {
                    let mut ir = Reader::new(body, !big_endian);
                    let count = ir.read_u16()? as usize;
                    let info_size = ir.read_u16()? as usize;
                    inf1 = Some((count, info_size, &body[4..]));
                }
                b"DAT1" => dat1 = Some(body),
                b"FLW1" => flow = Some(body.to_vec()),
                b"FLI1" => flow_index = Some(body.to_vec()),
                _ => return Err(Error::MalformedBmg(Context::new(pos, "unknown BMG chunk magic"))),
            }
            pos += chunk.size;
        }

        let (count, info_size, records) =
            inf1.ok_or(Error::MalformedBmg(Context::new(HEADER_SIZE, "missing INF1 chunk")))?;
        let dat1 = dat1.ok_or(Error::MalformedBmg(Context::new(HEADER_SIZE, "missing DAT1 chunk")))?;
        if info_size < 4 {
            return Err(Error::MalformedBmg(Context::new(HEADER_SIZE, "INF1 info size below 4")));
        }

        let unit = encoding.terminator_width();
        let mut messages = Vec::with_capacity(count);
        for i in 0..count {
            let rec = records
                .get(i * info_size..(i + 1) * info_size)
                .ok_or(Error::OutOfBounds { pos: i * info_size })?;
            let mut rr = Reader::new(rec, !big_endian);
            let offset = rr.read_u32()? as usize;
            let info = rec[4..].to_vec();
            let text = read_terminated(dat1, offset, unit)?;
            messages.push(Message { text, info });
        }

        Ok(Bmg {
            encoding,
            big_endian,
            messages,
            flow,
            flow_index,
        })
    }

    pub fn emit(&self) -> Result<Vec<u8>> {
        let le = !self.big_endian;

        let info_size = match self.messages.first() {
            Some(first) => {
                if self.messages.iter().any(|m| m.info.len() != first.info.len()) {
                    return Err(Error::PreconditionFailed(
                        "every BMG message must carry the same info-field length",
                    ));
                }
                4 + first.info.len()
            }
            None => 4,
        };

        let mut dat1_body = Writer::new(le);
        let mut offsets = Vec::with_capacity(self.messages.len());
        for m in &self.messages {
            offsets.push(dat1_body.tell() as u32);
            dat1_body.write_bytes(&m.text);
            for _ in 0..self.encoding.terminator_width() {
                dat1_body.write_u8(0);
            }
        }
        let dat1_bytes = dat1_body.finish().expect("BMG DAT1 emit never uses anchors");

        let mut records = Writer::new(le);
        for (i, m) in self.messages.iter().enumerate() {
            records.write_u32(offsets[i]);
            records.write_bytes(&m.info);
        }
        let records_bytes = records.finish().expect("BMG INF1 records emit never uses anchors");

        let mut section_count = 2u32;
        if self.flow.is_some() {
            section_count += 1;
        }
        if self.flow_index.is_some() {
            section_count += 1;
        }

        let mut w = Writer::new(le);
        w.write_bytes(MAGIC);
        let total_size_at = w.tell();
        w.write_u32(0);
        w.write_u32(section_count);
        w.write_u8(self.encoding.to_byte());
        w.write_zeros(HEADER_SIZE - w.tell());
        debug_assert_eq!(w.tell(), HEADER_SIZE);

        write_chunk(&mut w, b"INF1", &{
            let mut body = Vec::new();
            body.extend_from_slice(&(self.messages.len() as u16).to_le_bytes());
            body.extend_from_slice(&(info_size as u16).to_le_bytes());
            body.extend_from_slice(&records_bytes);
            body
        });
        write_chunk(&mut w, b"DAT1", &dat1_bytes);
        if let Some(flow) = &self.flow {
            write_chunk(&mut w, b"FLW1", flow);
        }
        if let Some(idx) = &self.flow_index {
            write_chunk(&mut w, b"FLI1", idx);
        }

        let total = w.tell() as u32;
        let total_bytes = if le { total.to_le_bytes() } else { total.to_be_bytes() };
        w.patch_at(total_size_at, &total_bytes);

        w.finish()
    }
}

fn write_chunk(w: &mut Writer, magic: &[u8; 4], body: &[u8]) {
    w.write_bytes(magic);
    let raw_size = 8 + body.len();
    let padded_size = raw_size.div_ceil(4) * 4;
    w.write_u32(padded_size as u32);
    w.write_bytes(body);
    w.write_zeros(padded_size - raw_size);
}

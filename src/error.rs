//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout nitrokit.
pub type Result<T> = std::result::Result<T, Error>;

/// A byte offset or list index plus a static message, attached to most
/// structural errors so callers can locate the offending field.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    /// Byte offset or list index at which the problem was detected.
    pub pos: usize,
    /// Static description of the violated invariant.
    pub what: &'static str,
}

impl Context {
    pub(crate) fn new(pos: usize, what: &'static str) -> Self {
        Self { pos, what }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {:#x})", self.what, self.pos)
    }
}

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug)]
pub enum Error {
    /// A read or write would cross the end of the addressed buffer.
    OutOfBounds { pos: usize },
    /// A magic/signature field did not match the expected value.
    InvalidMagic {
        pos: usize,
        expected: &'static [u8],
        found: Vec<u8>,
    },
    /// A format version is present in the data but not supported here.
    UnknownVersion { pos: usize, version: u32 },
    /// A null-terminated string had no null terminator within the buffer.
    UnterminatedName,
    /// The FNT tree violates one of its structural invariants.
    MalformedFnt(Context),
    /// The SDAT container violates one of its structural invariants.
    MalformedSdat(Context),
    /// The ROM violates one of its structural invariants.
    MalformedRom(Context),
    /// The BMG container violates one of its structural invariants.
    MalformedBmg(Context),
    /// The SBNK violates one of its structural invariants.
    MalformedSbnk(Context),
    /// The SSEQ/SSAR event blob violates one of its structural invariants.
    MalformedSseq(Context),
    /// An address operand resolved to the middle of a previously decoded
    /// event during lift.
    OverlappingEvents { offset: usize },
    /// An address operand did not resolve to any event in the list during
    /// lower.
    DanglingReference { offset: usize },
    /// Caller-provided object state violates an emit-time invariant.
    PreconditionFailed(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfBounds { pos } => write!(f, "out of bounds at {pos:#x}"),
            Error::InvalidMagic {
                pos,
                expected,
                found,
            } => write!(
                f,
                "bad magic at {pos:#x}: expected {expected:02x?}, found {found:02x?}"
            ),
            Error::UnknownVersion { pos, version } => {
                write!(f, "unsupported version {version} at {pos:#x}")
            }
            Error::UnterminatedName => write!(f, "unterminated string"),
            Error::MalformedFnt(c) => write!(f, "malformed FNT: {c}"),
            Error::MalformedSdat(c) => write!(f, "malformed SDAT: {c}"),
            Error::MalformedRom(c) => write!(f, "malformed ROM: {c}"),
            Error::MalformedBmg(c) => write!(f, "malformed BMG: {c}"),
            Error::MalformedSbnk(c) => write!(f, "malformed SBNK: {c}"),
            Error::MalformedSseq(c) => write!(f, "malformed SSEQ: {c}"),
            Error::OverlappingEvents { offset } => {
                write!(f, "address operand targets the middle of an event at {offset:#x}")
            }
            Error::DanglingReference { offset } => {
                write!(f, "address operand at {offset:#x} has no matching event")
            }
            Error::PreconditionFailed(s) => write!(f, "precondition failed: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

use rootcause::Report;
use thiserror::Error;

use crate::data::Magic;

/// Everything that can go wrong while loading or saving a CGFX file.
///
/// None of these are recovered locally: a load or save that hits one is
/// abandoned as a whole.
#[derive(Error, Debug)]
pub enum CgfxError {
    #[error("bad magic at 0x{offset:X}: expected '{expected}', got '{actual}'")]
    BadMagic {
        offset: u32,
        expected: Magic,
        actual: Magic,
    },
    #[error("invalid endianness marker {marker:02X?}")]
    InvalidEndianMarker { marker: [u8; 2] },
    #[error("unsupported {what}: 0x{actual:X} (expected at least 0x{minimum:X})")]
    UnsupportedVersion {
        what: &'static str,
        actual: u32,
        minimum: u32,
    },
    #[error("file header says the file is {expected} bytes, but it is actually {actual} bytes")]
    FileSizeMismatch { expected: u32, actual: u32 },
    #[error("unexpected end of data at 0x{offset:X}: need {needed} bytes, have {available}")]
    UnexpectedEof {
        offset: u32,
        needed: usize,
        available: usize,
    },
    #[error("chunk '{magic}' at 0x{offset:X} declares size {size}, which does not fit the stream")]
    InvalidChunkSize { magic: Magic, offset: u32, size: u32 },
    #[error("position 0x{offset:X} is outside the stream (length 0x{len:X})")]
    OutOfBounds { offset: u32, len: u32 },
    #[error("seek to position 0 (null reference dereferenced)")]
    NullSeek,
    #[error("stream position exceeds the 32-bit offset range")]
    OffsetOverflow,
    #[error("position stack underflow: pop without a matching push")]
    PositionStackUnderflow,
    #[error("string {value:?} cannot be stored as single-byte text")]
    UnencodableString { value: String },
    #[error("unresolved reference to a {type_name} from placeholder at 0x{location:X}")]
    UnresolvedReference {
        type_name: &'static str,
        location: u32,
    },
    #[error("a {type_name} was already committed at 0x{position:X}")]
    DuplicateCommit {
        type_name: &'static str,
        position: u32,
    },
    #[error("queued payload requested with alignment {requested}, but {existing} was used before")]
    AlignmentConflict { existing: u32, requested: u32 },
    #[error("null payload passed to the {queue} queue, which does not accept null")]
    NullPayload { queue: &'static str },
    #[error("{count} raw blob(s) were queued but no IMAG chunk was written to hold them")]
    PendingBlobs { count: usize },
    #[error("{count} {what} left unwritten when the save finished")]
    Unflushed { what: &'static str, count: usize },
    #[error("dictionary name {name:?} cannot be placed in the lookup trie")]
    DuplicateName { name: String },
    #[error("dictionary entry {index} has no name")]
    UnnamedEntry { index: usize },
    #[error("unknown {context} type tag 0x{tag:08X}")]
    UnknownTypeTag { context: &'static str, tag: u32 },
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("parse error at 0x{offset:X}: {detail}")]
    ParseError { offset: u32, detail: String },
}

impl CgfxError {
    pub fn unsupported(detail: impl Into<String>) -> Self {
        CgfxError::UnsupportedFeature(detail.into())
    }
}

pub type CgfxResult<T> = Result<T, Report<CgfxError>>;

/// Shorthand for returning a bare [`CgfxError`] as a report.
pub fn fail<T>(err: CgfxError) -> CgfxResult<T> {
    Err(Report::new(err))
}

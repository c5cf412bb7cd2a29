//! Shared winnow-based parsing utilities used by the cursor and the record loaders.

use rootcause::Report;
use winnow::Parser;
use winnow::binary::{self, Endianness};
use winnow::error::ContextError;

use crate::error::CgfxError;

/// Common result type for winnow parsers.
pub type WResult<T> = Result<T, winnow::error::ErrMode<ContextError>>;

/// Resolve a self-relative pointer: the stored value is the distance from the
/// pointer field's own position to the target.
///
/// Back-references are stored as two's complement, so the addition wraps.
pub fn resolve_relptr(field_pos: u32, rel_value: u32) -> u32 {
    field_pos.wrapping_add(rel_value)
}

/// Inverse of [`resolve_relptr`].
pub fn make_relptr(field_pos: u32, target: u32) -> u32 {
    target.wrapping_sub(field_pos)
}

pub fn parse_u16(endian: Endianness, input: &mut &[u8]) -> WResult<u16> {
    binary::u16(endian).parse_next(input)
}

pub fn parse_u32(endian: Endianness, input: &mut &[u8]) -> WResult<u32> {
    binary::u32(endian).parse_next(input)
}

pub fn parse_f32(endian: Endianness, input: &mut &[u8]) -> WResult<f32> {
    binary::f32(endian).parse_next(input)
}

/// Wrap a winnow failure into a [`CgfxError::ParseError`] tagged with its stream offset.
pub fn winnow_report(offset: u32, err: winnow::error::ErrMode<ContextError>) -> Report<CgfxError> {
    Report::new(CgfxError::ParseError {
        offset,
        detail: format!("{err}"),
    })
}

/// Read a NUL-terminated string from `file_data` starting at `offset`.
///
/// Returns `None` when no terminator exists before the end of the data.
/// Bytes map one-to-one onto chars so that any byte string survives a round trip.
pub fn read_null_terminated_string(file_data: &[u8], offset: usize) -> Option<String> {
    let remaining = file_data.get(offset..)?;
    let end = remaining.iter().position(|&b| b == 0)?;
    Some(remaining[..end].iter().map(|&b| b as char).collect())
}

/// Encode a string as single-byte text, the inverse of [`read_null_terminated_string`].
pub fn encode_single_byte(value: &str) -> Result<Vec<u8>, Report<CgfxError>> {
    value
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| {
            Report::new(CgfxError::UnencodableString {
                value: value.to_string(),
            })
        })
}

//! Seekable byte cursors.
//!
//! Every pointer in a CGFX file is a self-relative offset, so both loading and
//! saving constantly jump away from the sequential position and come back.
//! [`Reader`] and [`Writer`] each keep a LIFO stack of saved positions for
//! that; [`Reader::follow`] and [`Writer::at`] wrap the push/seek/pop dance so
//! the stack stays balanced even when the nested work fails.

use rootcause::Report;
use tracing::trace;

use crate::data::parser_utils::{
    self, encode_single_byte, make_relptr, read_null_terminated_string, resolve_relptr,
    winnow_report,
};
use crate::data::{Endianness, Magic};
use crate::error::{CgfxError, CgfxResult, fail};

/// Read cursor over a fully loaded file.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: u32,
    stack: Vec<u32>,
    endianness: Endianness,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> CgfxResult<Self> {
        if u32::try_from(data.len()).is_err() {
            return fail(CgfxError::OffsetOverflow);
        }
        Ok(Reader {
            data,
            pos: 0,
            stack: Vec::new(),
            endianness: Endianness::Little,
        })
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    pub fn position(&self) -> u32 {
        self.pos
    }

    /// Total stream length.
    pub fn len(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn at_end(&self) -> bool {
        self.pos as usize >= self.data.len()
    }

    /// Number of saved positions; used to indent trace output.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Move to an absolute position. Position 0 is reserved for null and is rejected.
    pub fn seek(&mut self, pos: u32) -> CgfxResult<()> {
        if pos == 0 {
            return fail(CgfxError::NullSeek);
        }
        if pos as usize > self.data.len() {
            return fail(CgfxError::OutOfBounds {
                offset: pos,
                len: self.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn push(&mut self) {
        self.stack.push(self.pos);
    }

    pub fn pop(&mut self) -> CgfxResult<()> {
        let pos = self
            .stack
            .pop()
            .ok_or_else(|| Report::new(CgfxError::PositionStackUnderflow))?;
        // The saved position may legitimately be 0 (start of stream), so bypass `seek`.
        self.pos = pos;
        Ok(())
    }

    /// Jump to `target`, run `f`, and come back, restoring the position even if `f` fails.
    pub fn follow<T>(
        &mut self,
        target: u32,
        f: impl FnOnce(&mut Reader<'a>) -> CgfxResult<T>,
    ) -> CgfxResult<T> {
        self.push();
        let result = self.seek(target).and_then(|()| f(self));
        self.pop()?;
        result
    }

    fn take(&mut self, n: usize) -> CgfxResult<&'a [u8]> {
        let start = self.pos as usize;
        let available = self.data.len().saturating_sub(start);
        if n > available {
            return fail(CgfxError::UnexpectedEof {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        self.pos += n as u32;
        Ok(&self.data[start..start + n])
    }

    pub fn read_bytes(&mut self, n: usize) -> CgfxResult<&'a [u8]> {
        self.take(n)
    }

    pub fn read_u8(&mut self) -> CgfxResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> CgfxResult<u16> {
        let offset = self.pos;
        let mut input = self.take(2)?;
        parser_utils::parse_u16(self.endianness.to_winnow(), &mut input)
            .map_err(|e| winnow_report(offset, e))
    }

    pub fn read_u32(&mut self) -> CgfxResult<u32> {
        let offset = self.pos;
        let mut input = self.take(4)?;
        parser_utils::parse_u32(self.endianness.to_winnow(), &mut input)
            .map_err(|e| winnow_report(offset, e))
    }

    pub fn read_i32(&mut self) -> CgfxResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> CgfxResult<f32> {
        let offset = self.pos;
        let mut input = self.take(4)?;
        parser_utils::parse_f32(self.endianness.to_winnow(), &mut input)
            .map_err(|e| winnow_report(offset, e))
    }

    pub fn read_magic(&mut self) -> CgfxResult<Magic> {
        let bytes = self.take(4)?;
        Ok(Magic([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn peek_magic(&mut self) -> CgfxResult<Magic> {
        let pos = self.pos;
        let magic = self.read_magic();
        self.pos = pos;
        magic
    }

    /// Read a magic and fail unless it matches `expected`.
    pub fn expect_magic(&mut self, expected: Magic) -> CgfxResult<()> {
        let offset = self.pos;
        let actual = self.read_magic()?;
        if actual != expected {
            return fail(CgfxError::BadMagic {
                offset,
                expected,
                actual,
            });
        }
        Ok(())
    }

    /// Read a self-relative offset. `None` is the null pointer.
    ///
    /// The result is relative to the field's own start; the cursor ends up past the field either way.
    pub fn read_offset(&mut self) -> CgfxResult<Option<u32>> {
        let field_pos = self.pos;
        let value = self.read_u32()?;
        Ok((value != 0).then(|| resolve_relptr(field_pos, value)))
    }

    /// Read a string-table offset and the string it points to.
    pub fn read_string(&mut self) -> CgfxResult<Option<String>> {
        let Some(target) = self.read_offset()? else {
            return Ok(None);
        };
        match read_null_terminated_string(self.data, target as usize) {
            Some(s) => Ok(Some(s)),
            None => fail(CgfxError::OutOfBounds {
                offset: target,
                len: self.len(),
            }),
        }
    }

    /// Skip padding up to the next multiple of `block`.
    pub fn align(&mut self, block: u32) -> CgfxResult<()> {
        let rem = self.pos % block;
        if rem != 0 {
            self.take((block - rem) as usize)?;
        }
        Ok(())
    }
}

/// Write cursor over an in-memory, seekable output buffer.
///
/// Writing at a position before the end overwrites; writing at the end appends.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    pos: u32,
    stack: Vec<u32>,
    endianness: Endianness,
}

impl Writer {
    pub fn new(endianness: Endianness) -> Self {
        Writer {
            endianness,
            ..Default::default()
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn position(&self) -> u32 {
        self.pos
    }

    pub fn len(&self) -> u32 {
        self.buf.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Move to an absolute position. Position 0 is reserved for null and is rejected.
    pub fn seek(&mut self, pos: u32) -> CgfxResult<()> {
        if pos == 0 {
            return fail(CgfxError::NullSeek);
        }
        if pos > self.len() {
            return fail(CgfxError::OutOfBounds {
                offset: pos,
                len: self.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn push(&mut self) {
        self.stack.push(self.pos);
    }

    pub fn pop(&mut self) -> CgfxResult<()> {
        let pos = self
            .stack
            .pop()
            .ok_or_else(|| Report::new(CgfxError::PositionStackUnderflow))?;
        self.pos = pos;
        Ok(())
    }

    /// Jump to `pos`, run `f`, and come back, restoring the position even if `f` fails.
    pub fn at<T>(&mut self, pos: u32, f: impl FnOnce(&mut Writer) -> CgfxResult<T>) -> CgfxResult<T> {
        self.push();
        let result = self.seek(pos).and_then(|()| f(self));
        self.pop()?;
        result
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> CgfxResult<()> {
        let start = self.pos as usize;
        let end = start + bytes.len();
        let Ok(end32) = u32::try_from(end) else {
            return fail(CgfxError::OffsetOverflow);
        };
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[start..end].copy_from_slice(bytes);
        self.pos = end32;
        Ok(())
    }

    pub fn write_zeros(&mut self, n: usize) -> CgfxResult<()> {
        self.write_bytes(&vec![0u8; n])
    }

    pub fn write_u8(&mut self, value: u8) -> CgfxResult<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> CgfxResult<()> {
        match self.endianness {
            Endianness::Little => self.write_bytes(&value.to_le_bytes()),
            Endianness::Big => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_u32(&mut self, value: u32) -> CgfxResult<()> {
        match self.endianness {
            Endianness::Little => self.write_bytes(&value.to_le_bytes()),
            Endianness::Big => self.write_bytes(&value.to_be_bytes()),
        }
    }

    pub fn write_i32(&mut self, value: i32) -> CgfxResult<()> {
        self.write_u32(value as u32)
    }

    pub fn write_f32(&mut self, value: f32) -> CgfxResult<()> {
        self.write_u32(value.to_bits())
    }

    pub fn write_magic(&mut self, magic: Magic) -> CgfxResult<()> {
        self.write_bytes(magic.as_bytes())
    }

    /// Write `s` as single-byte text followed by a NUL terminator.
    pub fn write_cstring(&mut self, s: &str) -> CgfxResult<()> {
        let bytes = encode_single_byte(s)?;
        self.write_bytes(&bytes)?;
        self.write_u8(0)
    }

    /// Store at `field_pos` the self-relative offset to `target` (0 when `target` is null),
    /// leaving the cursor where it was.
    pub fn write_offset_at(&mut self, field_pos: u32, target: Option<u32>) -> CgfxResult<()> {
        let value = target.map_or(0, |target| make_relptr(field_pos, target));
        trace!(field_pos, ?target, value, "patch offset");
        self.at(field_pos, |w| w.write_u32(value))
    }

    /// Point the offset field at `field_pos` to the current position.
    pub fn patch_offset_to_here(&mut self, field_pos: u32) -> CgfxResult<()> {
        self.write_offset_at(field_pos, Some(self.pos))
    }

    /// Zero-pad until `position + step_back` would land on a multiple of `block`.
    ///
    /// Nothing is written when the position is already aligned to `block`, or when
    /// the gap to the next boundary is not larger than `step_back`.
    pub fn align(&mut self, block: u32, step_back: u32) -> CgfxResult<()> {
        let rem = self.pos % block;
        if rem != 0 {
            let gap = block - rem;
            if gap > step_back {
                self.write_zeros((gap - step_back) as usize)?;
            }
        }
        Ok(())
    }
}

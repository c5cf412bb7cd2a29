//! `{magic, size}` chunk envelopes.
//!
//! `size` counts the 8-byte header plus the payload. Loading always leaves the
//! cursor at the declared end of the chunk, however much of the payload the
//! parser understood; saving patches the size once the payload is written.

use tracing::{trace, warn};

use crate::data::Magic;
use crate::data::context::SaveContext;
use crate::data::cursor::Reader;
use crate::error::{CgfxError, CgfxResult, fail};

pub const CHUNK_HEADER_SIZE: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub magic: Magic,
    /// Absolute position of the magic.
    pub start: u32,
    pub size: u32,
}

impl ChunkHeader {
    pub fn end(&self) -> u32 {
        self.start + self.size
    }

    pub fn payload_len(&self) -> u32 {
        self.size - CHUNK_HEADER_SIZE
    }
}

/// Read a chunk header, hand the payload to `parse`, then seek to the chunk's declared end.
pub fn load_chunk<'a, T>(
    reader: &mut Reader<'a>,
    parse: impl FnOnce(&mut Reader<'a>, &ChunkHeader) -> CgfxResult<T>,
) -> CgfxResult<T> {
    let start = reader.position();
    let magic = reader.read_magic()?;
    let size = reader.read_u32()?;
    let fits = start
        .checked_add(size)
        .is_some_and(|end| end <= reader.len());
    if size < CHUNK_HEADER_SIZE || !fits {
        return fail(CgfxError::InvalidChunkSize {
            magic,
            offset: start,
            size,
        });
    }
    let header = ChunkHeader { magic, start, size };
    trace!(
        position = format_args!("0x{start:04X}"),
        depth = reader.depth(),
        %magic,
        size,
        "load chunk"
    );

    let value = parse(reader, &header)?;

    let consumed = reader.position();
    if consumed > header.end() {
        warn!(%magic, start, consumed, end = header.end(), "chunk parser read past the chunk end");
    }
    reader.seek(header.end())?;
    Ok(value)
}

/// Like [`load_chunk`], but first checks the chunk's magic.
pub fn load_chunk_expecting<'a, T>(
    reader: &mut Reader<'a>,
    expected: Magic,
    parse: impl FnOnce(&mut Reader<'a>, &ChunkHeader) -> CgfxResult<T>,
) -> CgfxResult<T> {
    let offset = reader.position();
    let actual = reader.peek_magic()?;
    if actual != expected {
        return fail(CgfxError::BadMagic {
            offset,
            expected,
            actual,
        });
    }
    load_chunk(reader, parse)
}

/// Write `magic` and a size placeholder, run `write` for the payload, then
/// patch the size. Returns the final chunk size.
pub fn save_chunk<'a>(
    ctx: &mut SaveContext<'a>,
    magic: Magic,
    write: impl FnOnce(&mut SaveContext<'a>) -> CgfxResult<()>,
) -> CgfxResult<u32> {
    let start = ctx.position();
    trace!(
        position = format_args!("0x{start:04X}"),
        depth = ctx.writer.depth(),
        %magic,
        "save chunk"
    );
    ctx.writer.write_magic(magic)?;
    ctx.writer.write_u32(0)?;

    write(ctx)?;

    let size = ctx.position() - start;
    ctx.writer.at(start + 4, |w| w.write_u32(size))?;
    Ok(size)
}

/// A chunk whose magic is not understood, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RawChunk {
    pub magic: Magic,
    pub data: Vec<u8>,
}

impl RawChunk {
    pub fn load(reader: &mut Reader<'_>) -> CgfxResult<Self> {
        load_chunk(reader, |r, header| {
            let data = r.read_bytes(header.payload_len() as usize)?.to_vec();
            Ok(RawChunk {
                magic: header.magic,
                data,
            })
        })
    }

    pub fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        save_chunk(ctx, self.magic, |ctx| ctx.writer.write_bytes(&self.data))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Endianness;
    use crate::options::SaveOptions;

    #[test]
    fn saved_size_matches_stream() {
        let mut ctx = SaveContext::new(Endianness::Little, &SaveOptions::default());
        ctx.writer.write_u32(0xAAAA_AAAA).unwrap();
        let size = save_chunk(&mut ctx, Magic::new(b"TEST"), |ctx| {
            ctx.writer.write_bytes(&[1, 2, 3, 4, 5])
        })
        .unwrap();
        assert_eq!(size, 13);
        assert_eq!(ctx.position(), 17);

        let data = ctx.finish().unwrap();
        assert_eq!(&data[4..8], b"TEST");
        assert_eq!(&data[8..12], &13u32.to_le_bytes());
        assert_eq!(data.len() as u32 - 4, size);
    }

    #[test]
    fn load_skips_unparsed_payload() {
        let mut data = Vec::new();
        data.extend_from_slice(b"ABCD");
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&[9; 8]);
        data.extend_from_slice(b"NEXT");

        let mut r = Reader::new(&data).unwrap();
        let first = load_chunk(&mut r, |r, header| {
            assert_eq!(header.payload_len(), 8);
            r.read_u8()
        })
        .unwrap();
        assert_eq!(first, 9);
        assert_eq!(r.position(), 16);
        assert_eq!(r.read_magic().unwrap(), Magic::new(b"NEXT"));
    }

    #[test]
    fn oversized_chunk_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(b"ABCD");
        data.extend_from_slice(&64u32.to_le_bytes());
        let mut r = Reader::new(&data).unwrap();
        let err = RawChunk::load(&mut r).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::InvalidChunkSize { size: 64, .. }
        ));
    }

    #[test]
    fn raw_chunk_round_trips() {
        let mut data = Vec::new();
        data.extend_from_slice(b"\x00\x00\x00\x00");
        data.extend_from_slice(b"MISC");
        data.extend_from_slice(&11u32.to_le_bytes());
        data.extend_from_slice(b"xyz");

        let mut r = Reader::new(&data).unwrap();
        r.seek(4).unwrap();
        let chunk = RawChunk::load(&mut r).unwrap();
        assert_eq!(chunk.data, b"xyz");

        let mut ctx = SaveContext::new(Endianness::Little, &SaveOptions::default());
        ctx.writer.write_u32(0).unwrap();
        chunk.save(&mut ctx).unwrap();
        assert_eq!(ctx.finish().unwrap(), data);
    }

    #[test]
    fn wrong_magic_is_reported() {
        let mut data = Vec::new();
        data.extend_from_slice(b"ABCD");
        data.extend_from_slice(&8u32.to_le_bytes());
        let mut r = Reader::new(&data).unwrap();
        let err = load_chunk_expecting(&mut r, Magic::DICT, |_, _| Ok(())).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::BadMagic { offset: 0, .. }
        ));
    }
}

//! The top-level CGFX container: a small header followed by chunks.

use rootcause::Report;
use tracing::{debug, warn};
use variantly::Variantly;

use crate::data::chunk::RawChunk;
use crate::data::context::SaveContext;
use crate::data::cursor::Reader;
use crate::data::{Endianness, Magic};
use crate::error::{CgfxError, CgfxResult, fail};
use crate::models::data_chunk::DataChunk;
use crate::models::image_chunk::ImageChunk;
use crate::models::texture::Texture;
use crate::options::SaveOptions;

/// Smallest header that holds every field.
pub const MIN_HEADER_SIZE: u16 = 0x14;
const FILE_SIZE_FIELD: u32 = 0x0C;

#[derive(Debug, Clone, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Chunk {
    Data(DataChunk),
    Image(ImageChunk),
    Raw(RawChunk),
}

impl Chunk {
    pub fn magic(&self) -> Magic {
        match self {
            Chunk::Data(_) => Magic::DATA,
            Chunk::Image(_) => Magic::IMAG,
            Chunk::Raw(raw) => raw.magic,
        }
    }

    fn load(reader: &mut Reader<'_>) -> CgfxResult<Self> {
        Ok(match reader.peek_magic()? {
            Magic::DATA => Chunk::Data(DataChunk::load(reader)?),
            Magic::IMAG => Chunk::Image(ImageChunk::load(reader)?),
            _ => Chunk::Raw(RawChunk::load(reader)?),
        })
    }

    fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        match self {
            Chunk::Data(data) => data.save(ctx),
            Chunk::Image(image) => image.save(ctx),
            Chunk::Raw(raw) => raw.save(ctx),
        }
    }
}

/// A whole CGFX file.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Cgfx {
    pub endianness: Endianness,
    pub header_size: u16,
    pub revision: u32,
    pub chunks: Vec<Chunk>,
}

impl Cgfx {
    /// An empty little-endian file with a DATA and an IMAG chunk.
    pub fn new(revision: u32) -> Self {
        Cgfx {
            endianness: Endianness::Little,
            header_size: MIN_HEADER_SIZE,
            revision,
            chunks: vec![
                Chunk::Data(DataChunk::default()),
                Chunk::Image(ImageChunk),
            ],
        }
    }

    pub fn load(data: &[u8]) -> CgfxResult<Self> {
        let mut reader = Reader::new(data)?;
        reader.expect_magic(Magic::CGFX)?;
        let marker = reader.read_bytes(2)?;
        let marker = [marker[0], marker[1]];
        let Some(endianness) = Endianness::from_marker(marker) else {
            return fail(CgfxError::InvalidEndianMarker { marker });
        };
        reader.set_endianness(endianness);

        let header_size = reader.read_u16()?;
        if header_size < MIN_HEADER_SIZE {
            return fail(CgfxError::UnsupportedVersion {
                what: "header size",
                actual: header_size.into(),
                minimum: MIN_HEADER_SIZE.into(),
            });
        }
        let revision = reader.read_u32()?;
        let file_size = reader.read_u32()?;
        if file_size != reader.len() {
            return fail(CgfxError::FileSizeMismatch {
                expected: file_size,
                actual: reader.len(),
            });
        }
        let chunk_count = reader.read_u32()?;
        debug!(?endianness, header_size, revision, file_size, chunk_count, "loading CGFX");

        reader.seek(header_size.into())?;
        let mut chunks = Vec::new();
        while !reader.at_end() {
            chunks.push(Chunk::load(&mut reader)?);
        }
        if chunks.len() != chunk_count as usize {
            warn!(
                declared = chunk_count,
                found = chunks.len(),
                "chunk count in header does not match the file"
            );
        }

        Ok(Cgfx {
            endianness,
            header_size,
            revision,
            chunks,
        })
    }

    pub fn save(&self) -> CgfxResult<Vec<u8>> {
        self.save_with(&SaveOptions::default())
    }

    pub fn save_with(&self, options: &SaveOptions) -> CgfxResult<Vec<u8>> {
        let header_size = options.header_size.unwrap_or(self.header_size);
        if header_size < MIN_HEADER_SIZE {
            return fail(CgfxError::UnsupportedVersion {
                what: "header size",
                actual: header_size.into(),
                minimum: MIN_HEADER_SIZE.into(),
            });
        }
        let chunk_count =
            u32::try_from(self.chunks.len()).map_err(|_| Report::new(CgfxError::OffsetOverflow))?;

        let mut ctx = SaveContext::new(self.endianness, options);
        ctx.writer.write_magic(Magic::CGFX)?;
        ctx.writer.write_bytes(&self.endianness.marker())?;
        ctx.writer.write_u16(header_size)?;
        ctx.writer.write_u32(self.revision)?;
        ctx.writer.write_u32(0)?;
        ctx.writer.write_u32(chunk_count)?;
        let pad = u32::from(header_size) - ctx.position();
        ctx.writer.write_zeros(pad as usize)?;

        for chunk in &self.chunks {
            chunk.save(&mut ctx)?;
        }

        let file_size = ctx.writer.len();
        ctx.writer.at(FILE_SIZE_FIELD, |w| w.write_u32(file_size))?;
        ctx.finish()
    }

    pub fn data(&self) -> Option<&DataChunk> {
        self.chunks.iter().find_map(|c| c.data_ref())
    }

    pub fn data_mut(&mut self) -> Option<&mut DataChunk> {
        self.chunks.iter_mut().find_map(|c| c.data_mut())
    }

    pub fn textures(&self) -> impl Iterator<Item = (&str, &Texture)> {
        self.data()
            .and_then(|d| d.textures.as_ref())
            .into_iter()
            .flat_map(|dict| dict.iter())
    }
}

//! The `IMAG` chunk: raw texel and buffer data, addressed only through
//! offsets from records in the DATA chunk.

use crate::data::Magic;
use crate::data::chunk::{load_chunk_expecting, save_chunk};
use crate::data::context::SaveContext;
use crate::data::cursor::Reader;
use crate::error::CgfxResult;

/// Loading keeps nothing: the records that own the data have already read it
/// through their offsets. Saving writes whatever the blob queue holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ImageChunk;

impl ImageChunk {
    pub fn load(reader: &mut Reader<'_>) -> CgfxResult<Self> {
        load_chunk_expecting(reader, Magic::IMAG, |_, _| Ok(ImageChunk))
    }

    pub fn save(&self, ctx: &mut SaveContext<'_>) -> CgfxResult<()> {
        save_chunk(ctx, Magic::IMAG, |ctx| ctx.flush_blobs())?;
        Ok(())
    }
}

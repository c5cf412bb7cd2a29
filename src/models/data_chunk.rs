//! The `DATA` chunk: a fixed table of dictionary headers, followed by the
//! dictionaries, every record they own, and finally the string table.

use tracing::debug;

use crate::data::Magic;
use crate::data::chunk::{load_chunk_expecting, save_chunk};
use crate::data::context::{SaveContext, Saveable};
use crate::data::cursor::Reader;
use crate::data::dict::Dict;
use crate::error::{CgfxError, CgfxResult, fail};
use crate::models::texture::Texture;

/// The chunk ends so that the IMAG payload after it starts on this boundary.
const IMAG_PAYLOAD_ALIGNMENT: u32 = 128;

/// Dictionary slots of the DATA table, in file order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DictSlot {
    Models,
    Textures,
    Luts,
    Materials,
    Shaders,
    Cameras,
    Lights,
    Fogs,
    Environments,
    SkeletonAnims,
    TextureAnims,
    VisibilityAnims,
    CameraAnims,
    LightAnims,
    Emitters,
    Unknown,
}

impl DictSlot {
    pub const ALL: [DictSlot; 16] = [
        DictSlot::Models,
        DictSlot::Textures,
        DictSlot::Luts,
        DictSlot::Materials,
        DictSlot::Shaders,
        DictSlot::Cameras,
        DictSlot::Lights,
        DictSlot::Fogs,
        DictSlot::Environments,
        DictSlot::SkeletonAnims,
        DictSlot::TextureAnims,
        DictSlot::VisibilityAnims,
        DictSlot::CameraAnims,
        DictSlot::LightAnims,
        DictSlot::Emitters,
        DictSlot::Unknown,
    ];

    /// Position of this slot's `{count, offset}` header in the table.
    pub fn table_offset(self) -> u32 {
        self as u32 * 8
    }
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DataChunk {
    pub textures: Option<Dict<Texture>>,
}

impl DataChunk {
    pub fn load(reader: &mut Reader<'_>) -> CgfxResult<Self> {
        load_chunk_expecting(reader, Magic::DATA, |r, _| {
            let mut chunk = DataChunk::default();
            for slot in DictSlot::ALL {
                match slot {
                    DictSlot::Textures => chunk.textures = Dict::load_from_header(r)?,
                    _ => {
                        let count = r.read_u32()?;
                        r.read_offset()?;
                        if count > 0 {
                            return fail(CgfxError::unsupported(format!(
                                "{slot:?} dictionary with {count} entries"
                            )));
                        }
                    }
                }
            }
            debug!(
                textures = chunk.textures.as_ref().map_or(0, Dict::len),
                "loaded DATA chunk"
            );
            Ok(chunk)
        })
    }

    pub fn entry_count(&self, slot: DictSlot) -> usize {
        match slot {
            DictSlot::Textures => self.textures.as_ref().map_or(0, Dict::len),
            _ => 0,
        }
    }

    pub fn texture(&self, name: &str) -> Option<&Texture> {
        self.textures.as_ref()?.find(name)
    }

    pub fn texture_mut(&mut self, name: &str) -> Option<&mut Texture> {
        self.textures.as_mut()?.find_mut(name)
    }

    fn non_empty_textures(&self) -> Option<&Dict<Texture>> {
        self.textures.as_ref().filter(|d| !d.is_empty())
    }

    /// Write the chunk. Strings are flushed at its end; raw blobs stay queued
    /// for the IMAG chunk.
    pub fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        save_chunk(ctx, Magic::DATA, |ctx| {
            let table = ctx.position();
            for slot in DictSlot::ALL {
                ctx.writer.write_u32(self.entry_count(slot) as u32)?;
                ctx.writer.write_u32(0)?;
            }

            if let Some(textures) = self.non_empty_textures() {
                let field = table + DictSlot::Textures.table_offset() + 4;
                ctx.writer.patch_offset_to_here(field)?;
                textures.save(ctx)?;
            }

            if let Some(textures) = self.non_empty_textures() {
                textures.save_entries(ctx)?;
            }

            ctx.resolve_references()?;
            ctx.flush_strings()?;
            ctx.writer.align(IMAG_PAYLOAD_ALIGNMENT, 8)
        })?;
        Ok(())
    }
}

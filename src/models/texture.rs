//! Image textures (`TXOB`).
//!
//! The texel data is kept in its native, possibly block-compressed layout; it
//! lives in the IMAG chunk and is reached through a length and an offset.

use std::fmt;

use rootcause::Report;

use crate::data::Magic;
use crate::data::context::{Loadable, SaveContext, Saveable};
use crate::data::cursor::Reader;
use crate::data::ledger::{Identified, RecordId};
use crate::error::{CgfxError, CgfxResult, fail};
use crate::models::object::{ObjectHeader, Record, load_record, save_record};
use crate::recognized::{RawEnum, Recognized};

pub const TYPE_IMAGE_TEXTURE: u32 = 0x2000_0011;
pub const TYPE_CUBE_TEXTURE: u32 = 0x2000_0009;

/// Texel data is placed on this boundary inside the IMAG chunk.
pub const DATA_ALIGNMENT: u32 = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum TextureFormat {
    Rgba8,
    Rgb8,
    Rgba5551,
    Rgb565,
    Rgba4,
    La8,
    Hilo8,
    L8,
    A8,
    La4,
    L4,
    A4,
    Etc1,
    Etc1A4,
}

impl TextureFormat {
    const ALL: [TextureFormat; 14] = [
        TextureFormat::Rgba8,
        TextureFormat::Rgb8,
        TextureFormat::Rgba5551,
        TextureFormat::Rgb565,
        TextureFormat::Rgba4,
        TextureFormat::La8,
        TextureFormat::Hilo8,
        TextureFormat::L8,
        TextureFormat::A8,
        TextureFormat::La4,
        TextureFormat::L4,
        TextureFormat::A4,
        TextureFormat::Etc1,
        TextureFormat::Etc1A4,
    ];
}

impl RawEnum for TextureFormat {
    type Raw = u32;

    fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    fn to_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextureFormat::Rgba8 => "RGBA8",
            TextureFormat::Rgb8 => "RGB8",
            TextureFormat::Rgba5551 => "RGBA5551",
            TextureFormat::Rgb565 => "RGB565",
            TextureFormat::Rgba4 => "RGBA4",
            TextureFormat::La8 => "LA8",
            TextureFormat::Hilo8 => "HILO8",
            TextureFormat::L8 => "L8",
            TextureFormat::A8 => "A8",
            TextureFormat::La4 => "LA4",
            TextureFormat::L4 => "L4",
            TextureFormat::A4 => "A4",
            TextureFormat::Etc1 => "ETC1",
            TextureFormat::Etc1A4 => "ETC1A4",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Texture {
    pub header: ObjectHeader,
    pub height: u32,
    pub width: u32,
    pub gl_format: u32,
    pub gl_type: u32,
    pub mipmap_levels: u32,
    pub texture_object: u32,
    pub location_flags: u32,
    pub format: Recognized<TextureFormat>,
    // Meaning unknown. Usually bits per pixel, height and width again.
    pub unknown1: u32,
    pub unknown2: u32,
    pub unknown3: u32,
    #[cfg_attr(feature = "serde", serde(skip))]
    data: Vec<u8>,
    pub dynamic_allocator: u32,
    pub bits_per_pixel: u32,
    pub location_address: u32,
    pub memory_address: u32,
}

impl Texture {
    pub fn name(&self) -> Option<&str> {
        self.header.name.as_deref()
    }

    /// Texel data in its native layout.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Swap in new native texel data. The length must not change: width,
    /// height and format are left as they are.
    pub fn replace_data(&mut self, data: Vec<u8>) -> CgfxResult<()> {
        if data.len() != self.data.len() {
            return fail(CgfxError::unsupported(format!(
                "replacing {} bytes of texture data with {} bytes",
                self.data.len(),
                data.len()
            )));
        }
        self.data = data;
        Ok(())
    }

    fn check_supported(&self) -> CgfxResult<()> {
        check_layout(self.mipmap_levels, self.texture_object)
    }
}

fn check_layout(mipmap_levels: u32, texture_object: u32) -> CgfxResult<()> {
    if mipmap_levels > 1 {
        return fail(CgfxError::unsupported(format!(
            "texture with {mipmap_levels} mipmap levels"
        )));
    }
    if texture_object != 0 {
        return fail(CgfxError::unsupported(format!(
            "texture with a runtime texture object (0x{texture_object:X})"
        )));
    }
    Ok(())
}

impl Identified for Texture {
    fn record_id(&self) -> RecordId {
        self.header.id
    }

    fn type_name(&self) -> &'static str {
        "Texture"
    }
}

impl Record for Texture {
    const MAGIC: Magic = Magic::new(b"TXOB");

    fn check_type_id(type_id: u32) -> CgfxResult<()> {
        match type_id {
            TYPE_IMAGE_TEXTURE => Ok(()),
            TYPE_CUBE_TEXTURE => fail(CgfxError::unsupported("cube texture")),
            tag => fail(CgfxError::UnknownTypeTag {
                context: "texture",
                tag,
            }),
        }
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn load_body(header: ObjectHeader, reader: &mut Reader<'_>) -> CgfxResult<Self> {
        let height = reader.read_u32()?;
        let width = reader.read_u32()?;
        let gl_format = reader.read_u32()?;
        let gl_type = reader.read_u32()?;
        let mipmap_levels = reader.read_u32()?;
        let texture_object = reader.read_u32()?;
        let location_flags = reader.read_u32()?;
        check_layout(mipmap_levels, texture_object)?;
        let format = Recognized::from_raw(reader.read_u32()?);
        let unknown1 = reader.read_u32()?;
        let unknown2 = reader.read_u32()?;
        let unknown3 = reader.read_u32()?;

        let data_len = reader.read_u32()?;
        let data_offset = reader.read_offset()?;
        let data = match data_offset {
            Some(offset) => reader.follow(offset, |r| Ok(r.read_bytes(data_len as usize)?.to_vec()))?,
            None if data_len == 0 => Vec::new(),
            None => {
                return fail(CgfxError::unsupported(format!(
                    "texture with {data_len} bytes of data but no data offset"
                )));
            }
        };

        Ok(Texture {
            header,
            height,
            width,
            gl_format,
            gl_type,
            mipmap_levels,
            texture_object,
            location_flags,
            format,
            unknown1,
            unknown2,
            unknown3,
            data,
            dynamic_allocator: reader.read_u32()?,
            bits_per_pixel: reader.read_u32()?,
            location_address: reader.read_u32()?,
            memory_address: reader.read_u32()?,
        })
    }

    fn save_body<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        self.check_supported()?;
        let w = &mut ctx.writer;
        w.write_u32(self.height)?;
        w.write_u32(self.width)?;
        w.write_u32(self.gl_format)?;
        w.write_u32(self.gl_type)?;
        w.write_u32(self.mipmap_levels)?;
        w.write_u32(self.texture_object)?;
        w.write_u32(self.location_flags)?;
        w.write_u32(self.format.raw())?;
        w.write_u32(self.unknown1)?;
        w.write_u32(self.unknown2)?;
        w.write_u32(self.unknown3)?;
        let data_len = u32::try_from(self.data.len()).map_err(|_| Report::new(CgfxError::OffsetOverflow))?;
        w.write_u32(data_len)?;
        ctx.write_blob(&self.data, DATA_ALIGNMENT)?;
        let w = &mut ctx.writer;
        w.write_u32(self.dynamic_allocator)?;
        w.write_u32(self.bits_per_pixel)?;
        w.write_u32(self.location_address)?;
        w.write_u32(self.memory_address)
    }
}

impl Loadable for Texture {
    fn load(reader: &mut Reader<'_>) -> CgfxResult<Self> {
        load_record(reader)
    }
}

impl Saveable for Texture {
    fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        save_record(self, ctx)
    }
}

/// Builder-style constructor for textures created in memory.
#[bon::bon]
impl Texture {
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        width: u32,
        height: u32,
        format: TextureFormat,
        data: Vec<u8>,
        #[builder(default)] gl_format: u32,
        #[builder(default)] gl_type: u32,
        #[builder(default = 1)] mipmap_levels: u32,
        #[builder(default)] location_flags: u32,
        #[builder(default)] bits_per_pixel: u32,
        #[builder(default = 5)] revision: u32,
    ) -> Self {
        Texture {
            header: ObjectHeader::new(TYPE_IMAGE_TEXTURE, revision, Some(name)),
            height,
            width,
            gl_format,
            gl_type,
            mipmap_levels,
            texture_object: 0,
            location_flags,
            format: Recognized::Known(format),
            unknown1: bits_per_pixel,
            unknown2: height,
            unknown3: width,
            data,
            dynamic_allocator: 0,
            bits_per_pixel,
            location_address: 0,
            memory_address: 0,
        }
    }
}

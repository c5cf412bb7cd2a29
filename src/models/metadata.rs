//! User metadata attached to records through their metadata dictionary.
//!
//! Each value list is introduced by a leading type tag; the tag alone decides
//! how the rest of the record is laid out.

use tracing::trace;
use variantly::Variantly;

use crate::data::context::{Loadable, SaveContext, Saveable};
use crate::data::cursor::Reader;
use crate::data::ledger::{Identified, RecordId};
use crate::error::{CgfxError, CgfxResult, fail};

pub const TAG_SINGLE: u32 = 0x8000_0000;
pub const TAG_COLOR: u32 = 0x4000_0000;
pub const TAG_INTEGER: u32 = 0x2000_0000;
pub const TAG_STRING: u32 = 0x1000_0000;

#[derive(Debug, Clone, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum MetaDataValues {
    Single(Vec<f32>),
    /// RGBA
    Color(Vec<[f32; 4]>),
    Integer(Vec<i32>),
}

type ValueLoader = fn(&mut Reader<'_>) -> CgfxResult<MetaDataValues>;

/// Every metadata type tag this crate knows about, and how to load its values.
/// A tag with no loader is recognized but not supported.
const REGISTRY: &[(u32, &str, Option<ValueLoader>)] = &[
    (TAG_SINGLE, "single", Some(load_singles)),
    (TAG_COLOR, "color", Some(load_colors)),
    (TAG_INTEGER, "integer", Some(load_integers)),
    (TAG_STRING, "string", None),
];

fn read_count(reader: &mut Reader<'_>) -> CgfxResult<usize> {
    let count = reader.read_u32()? as usize;
    // Every value is at least four bytes.
    let remaining = (reader.len() - reader.position()) as usize / 4;
    if count > remaining {
        return fail(CgfxError::UnexpectedEof {
            offset: reader.position(),
            needed: count.saturating_mul(4),
            available: remaining * 4,
        });
    }
    Ok(count)
}

fn load_singles(reader: &mut Reader<'_>) -> CgfxResult<MetaDataValues> {
    let count = read_count(reader)?;
    let values = (0..count)
        .map(|_| reader.read_f32())
        .collect::<CgfxResult<_>>()?;
    Ok(MetaDataValues::Single(values))
}

fn load_colors(reader: &mut Reader<'_>) -> CgfxResult<MetaDataValues> {
    let count = read_count(reader)?;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push([
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        ]);
    }
    Ok(MetaDataValues::Color(values))
}

fn load_integers(reader: &mut Reader<'_>) -> CgfxResult<MetaDataValues> {
    let count = read_count(reader)?;
    let values = (0..count)
        .map(|_| reader.read_i32())
        .collect::<CgfxResult<_>>()?;
    Ok(MetaDataValues::Integer(values))
}

impl MetaDataValues {
    pub fn tag(&self) -> u32 {
        match self {
            MetaDataValues::Single(_) => TAG_SINGLE,
            MetaDataValues::Color(_) => TAG_COLOR,
            MetaDataValues::Integer(_) => TAG_INTEGER,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MetaDataValues::Single(v) => v.len(),
            MetaDataValues::Color(v) => v.len(),
            MetaDataValues::Integer(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn save(&self, ctx: &mut SaveContext<'_>) -> CgfxResult<()> {
        ctx.writer.write_u32(self.len() as u32)?;
        match self {
            MetaDataValues::Single(values) => {
                for &v in values {
                    ctx.writer.write_f32(v)?;
                }
            }
            MetaDataValues::Color(values) => {
                for rgba in values {
                    for &c in rgba {
                        ctx.writer.write_f32(c)?;
                    }
                }
            }
            MetaDataValues::Integer(values) => {
                for &v in values {
                    ctx.writer.write_i32(v)?;
                }
            }
        }
        Ok(())
    }
}

/// One named metadata value list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MetaData {
    #[cfg_attr(feature = "serde", serde(skip))]
    pub id: RecordId,
    pub name: Option<String>,
    /// Value kind word stored after the name. Kept verbatim.
    pub kind: u32,
    pub values: MetaDataValues,
}

impl MetaData {
    pub fn new(name: impl Into<String>, kind: u32, values: MetaDataValues) -> Self {
        MetaData {
            id: RecordId::new(),
            name: Some(name.into()),
            kind,
            values,
        }
    }
}

impl Identified for MetaData {
    fn record_id(&self) -> RecordId {
        self.id
    }

    fn type_name(&self) -> &'static str {
        "MetaData"
    }
}

impl Loadable for MetaData {
    fn load(reader: &mut Reader<'_>) -> CgfxResult<Self> {
        let position = reader.position();
        let tag = reader.read_u32()?;
        let Some(&(_, kind_name, loader)) = REGISTRY.iter().find(|(t, _, _)| *t == tag) else {
            return fail(CgfxError::UnknownTypeTag {
                context: "metadata",
                tag,
            });
        };
        let Some(loader) = loader else {
            return fail(CgfxError::unsupported(format!("{kind_name} metadata")));
        };
        trace!(
            position = format_args!("0x{position:04X}"),
            depth = reader.depth(),
            kind = kind_name,
            "load metadata"
        );

        let name = reader.read_string()?;
        let kind = reader.read_u32()?;
        let values = loader(reader)?;
        Ok(MetaData {
            id: RecordId::new(),
            name,
            kind,
            values,
        })
    }
}

impl Saveable for MetaData {
    fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        ctx.trace_save("metadata");
        ctx.writer.write_u32(self.values.tag())?;
        ctx.write_string(self.name.as_deref())?;
        ctx.writer.write_u32(self.kind)?;
        self.values.save(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Endianness;
    use crate::options::SaveOptions;

    fn save_one(meta: &MetaData) -> Vec<u8> {
        let mut ctx = SaveContext::new(Endianness::Little, &SaveOptions::default());
        ctx.writer.write_u32(0).unwrap();
        meta.save(&mut ctx).unwrap();
        ctx.flush_strings().unwrap();
        ctx.finish().unwrap()
    }

    fn load_one(data: &[u8]) -> CgfxResult<MetaData> {
        let mut r = Reader::new(data).unwrap();
        r.seek(4)?;
        MetaData::load(&mut r)
    }

    #[test]
    fn each_supported_kind_round_trips() {
        let cases = [
            MetaData::new("Scale", 0, MetaDataValues::Single(vec![1.5, -2.0])),
            MetaData::new(
                "Tint",
                4,
                MetaDataValues::Color(vec![[1.0, 0.5, 0.25, 1.0]]),
            ),
            MetaData::new("Flags", 1, MetaDataValues::Integer(vec![-1, 0, 7])),
        ];
        for meta in cases {
            let data = save_one(&meta);
            let loaded = load_one(&data).unwrap();
            assert_eq!(loaded.name, meta.name);
            assert_eq!(loaded.kind, meta.kind);
            assert_eq!(loaded.values, meta.values);
            assert_eq!(save_one(&loaded), data);
        }
    }

    #[test]
    fn layout_is_tag_name_kind_values() {
        let meta = MetaData::new("Id", 1, MetaDataValues::Integer(vec![5]));
        let data = save_one(&meta);
        assert_eq!(&data[4..8], &TAG_INTEGER.to_le_bytes());
        // name offset from 8 to the string table at 24
        assert_eq!(&data[8..12], &16u32.to_le_bytes());
        assert_eq!(&data[12..16], &1u32.to_le_bytes());
        assert_eq!(&data[16..20], &1u32.to_le_bytes());
        assert_eq!(&data[20..24], &5u32.to_le_bytes());
        assert_eq!(&data[24..], b"Id\0");
    }

    #[test]
    fn string_metadata_is_unsupported() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&TAG_STRING.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        let err = load_one(&data).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::UnsupportedFeature(_)
        ));
    }

    #[test]
    fn unknown_tag_is_reported() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&0x0800_0000u32.to_le_bytes());
        let err = load_one(&data).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::UnknownTypeTag {
                context: "metadata",
                tag: 0x0800_0000
            }
        ));
    }

    #[test]
    fn values_accessors() {
        let values = MetaDataValues::Integer(vec![1, 2]);
        assert!(values.is_integer());
        assert_eq!(values.clone().integer(), Some(vec![1, 2]));
        assert_eq!(values.len(), 2);
    }
}

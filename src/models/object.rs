//! The header shared by every dictionary-addressable record, and the plumbing
//! that wraps a record body with it.

use tracing::trace;

use crate::data::Magic;
use crate::data::context::SaveContext;
use crate::data::cursor::Reader;
use crate::data::dict::{Dict, write_dict_header};
use crate::data::ledger::RecordId;
use crate::error::CgfxResult;
use crate::models::metadata::MetaData;

/// `{type_id, magic, revision, name, metadata}` at the start of every record.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ObjectHeader {
    #[cfg_attr(feature = "serde", serde(skip))]
    pub id: RecordId,
    pub type_id: u32,
    pub revision: u32,
    pub name: Option<String>,
    pub metadata: Option<Dict<MetaData>>,
}

impl ObjectHeader {
    pub fn new(type_id: u32, revision: u32, name: Option<String>) -> Self {
        ObjectHeader {
            id: RecordId::new(),
            type_id,
            revision,
            name,
            metadata: None,
        }
    }
}

/// A record kind with its own type tag check, magic and body layout.
pub trait Record: Sized {
    const MAGIC: Magic;

    /// Reject type tags this record kind cannot represent.
    fn check_type_id(type_id: u32) -> CgfxResult<()>;

    fn header(&self) -> &ObjectHeader;

    fn load_body(header: ObjectHeader, reader: &mut Reader<'_>) -> CgfxResult<Self>;

    fn save_body<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()>;
}

/// Read the object header at the cursor, then the record body.
pub fn load_record<R: Record>(reader: &mut Reader<'_>) -> CgfxResult<R> {
    trace!(
        position = format_args!("0x{:04X}", reader.position()),
        depth = reader.depth(),
        magic = %R::MAGIC,
        "load record"
    );
    let type_id = reader.read_u32()?;
    R::check_type_id(type_id)?;
    reader.expect_magic(R::MAGIC)?;
    let revision = reader.read_u32()?;
    let name = reader.read_string()?;
    let metadata = Dict::load_from_header(reader)?;

    let header = ObjectHeader {
        id: RecordId::new(),
        type_id,
        revision,
        name,
        metadata,
    };
    R::load_body(header, reader)
}

/// Write the object header and body, then the record's metadata dictionary and its entries.
pub fn save_record<'a, R: Record>(record: &'a R, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
    let header = record.header();
    ctx.trace_save(&format!("record {}", R::MAGIC));
    ctx.writer.write_u32(header.type_id)?;
    ctx.writer.write_magic(R::MAGIC)?;
    ctx.writer.write_u32(header.revision)?;
    ctx.write_string(header.name.as_deref())?;
    write_dict_header(ctx, header.metadata.as_ref())?;

    record.save_body(ctx)?;

    if let Some(metadata) = header.metadata.as_ref().filter(|m| !m.is_empty()) {
        ctx.save_and_mark(metadata)?;
        metadata.save_entries(ctx)?;
    }
    Ok(())
}

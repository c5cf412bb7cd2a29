use tracing::trace;

use crate::data::cursor::{Reader, Writer};
use crate::data::ledger::{Identified, ObjectRef, ReferenceLedger};
use crate::data::relocation::{BlobTable, StringStyle, StringTable};
use crate::data::Endianness;
use crate::error::{CgfxError, CgfxResult, fail};
use crate::options::SaveOptions;

/// A record that can be decoded from the current reader position.
pub trait Loadable: Sized {
    fn load(reader: &mut Reader<'_>) -> CgfxResult<Self>;
}

/// A record that can write itself through a [`SaveContext`].
///
/// Every field that is a pointer, a string or a raw blob must go through the
/// context so it can be patched later; the context knows nothing else about
/// the record's layout.
pub trait Saveable {
    fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()>;
}

/// Everything one save session accumulates: the output cursor, the string and
/// raw-blob relocation queues, and the reference ledger.
///
/// Strings and blobs are borrowed from the graph being saved, which must stay
/// untouched until the session ends.
#[derive(Debug)]
pub struct SaveContext<'a> {
    pub writer: Writer,
    pub strings: StringTable<'a>,
    pub blobs: BlobTable<'a>,
    pub ledger: ReferenceLedger,
}

impl<'a> SaveContext<'a> {
    pub fn new(endianness: Endianness, options: &SaveOptions) -> Self {
        SaveContext {
            writer: Writer::new(endianness),
            strings: StringTable::strings(),
            blobs: BlobTable::blobs(options.dedup_blobs),
            ledger: ReferenceLedger::new(),
        }
    }

    pub fn position(&self) -> u32 {
        self.writer.position()
    }

    pub(crate) fn trace_save(&self, what: &str) {
        trace!(
            position = format_args!("0x{:04X}", self.writer.position()),
            depth = self.writer.depth(),
            "save {what}"
        );
    }

    /// Queue a NUL-terminated string and write its placeholder (null for `None`).
    pub fn write_string(&mut self, text: Option<&'a str>) -> CgfxResult<()> {
        self.strings
            .enqueue_str(&mut self.writer, text, StringStyle::Terminated)
    }

    /// Queue a string with no terminator and write its placeholder. The caller
    /// stores the length next to the pointer.
    pub fn write_bare_string(&mut self, text: Option<&'a str>) -> CgfxResult<()> {
        self.strings.enqueue_str(&mut self.writer, text, StringStyle::Bare)
    }

    /// Queue a raw blob for the IMAG chunk and write its placeholder.
    pub fn write_blob(&mut self, data: &'a [u8], alignment: u32) -> CgfxResult<()> {
        self.blobs.enqueue_blob(&mut self.writer, data, alignment)
    }

    pub fn write_pointer_placeholder(&mut self, target: Option<ObjectRef>) -> CgfxResult<()> {
        self.ledger.write_placeholder(&mut self.writer, target)
    }

    pub fn mark_reference(&mut self, target: ObjectRef) -> CgfxResult<u32> {
        self.ledger.mark_reference(&self.writer, target)
    }

    /// Commit `obj` at the current position and write it.
    pub fn save_and_mark<T: Saveable + Identified>(&mut self, obj: &'a T) -> CgfxResult<()> {
        self.mark_reference(obj.object_ref())?;
        obj.save(self)
    }

    pub fn resolve_references(&mut self) -> CgfxResult<()> {
        self.ledger.resolve_all(&mut self.writer)
    }

    pub fn flush_strings(&mut self) -> CgfxResult<()> {
        self.strings.flush(&mut self.writer)
    }

    pub fn flush_blobs(&mut self) -> CgfxResult<()> {
        self.blobs.flush(&mut self.writer)
    }

    /// End the session, returning the output. Anything still queued would be a
    /// dangling zero pointer in the output, so it is an error.
    pub fn finish(self) -> CgfxResult<Vec<u8>> {
        if !self.blobs.is_empty() {
            return fail(CgfxError::PendingBlobs {
                count: self.blobs.len(),
            });
        }
        if self.ledger.pending_len() > 0 {
            return fail(CgfxError::Unflushed {
                what: "pointer placeholder(s)",
                count: self.ledger.pending_len(),
            });
        }
        if !self.strings.is_empty() {
            return fail(CgfxError::Unflushed {
                what: "string(s)",
                count: self.strings.len(),
            });
        }
        Ok(self.writer.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_and_terminated_strings_share_the_table() {
        let mut ctx = SaveContext::new(Endianness::Little, &SaveOptions::default());
        ctx.writer.write_u32(4).unwrap();
        ctx.write_bare_string(Some("Beta")).unwrap();
        ctx.write_string(Some("Beta")).unwrap();
        ctx.write_bare_string(None).unwrap();
        ctx.flush_strings().unwrap();
        let data = ctx.finish().unwrap();

        assert_eq!(&data[16..], b"BetaBeta\0");
        let mut r = Reader::new(&data).unwrap();
        r.seek(4).unwrap();
        assert_eq!(r.read_offset().unwrap(), Some(16));
        assert_eq!(r.read_offset().unwrap(), Some(20));
        assert_eq!(r.read_offset().unwrap(), None);
    }
}

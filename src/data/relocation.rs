//! Relocation queues for payloads that live in a shared section rather than
//! inline with the record that points at them.
//!
//! A record writes a zero placeholder where the pointer goes and queues the
//! payload. When the owning section is reached, [`RelocationQueue::flush`]
//! writes each payload once and patches every placeholder that asked for it.

use std::borrow::Cow;
use std::hash::Hash;

use indexmap::IndexMap;
use rootcause::Report;
use tracing::debug;

use crate::data::cursor::Writer;
use crate::data::parser_utils::encode_single_byte;
use crate::error::{CgfxError, CgfxResult, fail};

/// A payload that can sit in a [`RelocationQueue`].
///
/// Equality is by value: two equal payloads are the same payload as far as
/// deduplication is concerned.
pub trait QueuedPayload: Eq + Hash {
    fn write_to(&self, writer: &mut Writer) -> CgfxResult<()>;
}

/// How a queued string is laid out in the string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringStyle {
    /// Bytes followed by a single NUL.
    Terminated,
    /// Bytes only; the referrer stores the length itself.
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueuedString<'a> {
    pub text: Cow<'a, str>,
    pub style: StringStyle,
}

impl QueuedPayload for QueuedString<'_> {
    fn write_to(&self, writer: &mut Writer) -> CgfxResult<()> {
        writer.write_bytes(&encode_single_byte(&self.text)?)?;
        if self.style == StringStyle::Terminated {
            writer.write_u8(0)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueuedBlob<'a>(pub Cow<'a, [u8]>);

impl QueuedPayload for QueuedBlob<'_> {
    fn write_to(&self, writer: &mut Writer) -> CgfxResult<()> {
        writer.write_bytes(&self.0)
    }
}

#[derive(Debug)]
struct Pending<P> {
    position: u32,
    payload: P,
    alignment: u32,
}

#[derive(Debug)]
pub struct RelocationQueue<P> {
    label: &'static str,
    null_ok: bool,
    dedup: bool,
    pending: Vec<Pending<P>>,
}

pub type StringTable<'a> = RelocationQueue<QueuedString<'a>>;
pub type BlobTable<'a> = RelocationQueue<QueuedBlob<'a>>;

impl<'a> StringTable<'a> {
    /// The string table: nulls allowed (written as a null pointer), equal strings shared.
    pub fn strings() -> Self {
        RelocationQueue::new("string", true, true)
    }

    pub fn enqueue_str(
        &mut self,
        writer: &mut Writer,
        text: Option<&'a str>,
        style: StringStyle,
    ) -> CgfxResult<()> {
        let payload = text.map(|text| QueuedString {
            text: Cow::Borrowed(text),
            style,
        });
        self.enqueue_and_write_placeholder(writer, payload, 0)
    }
}

impl<'a> BlobTable<'a> {
    /// The raw-blob table destined for the IMAG chunk.
    pub fn blobs(dedup: bool) -> Self {
        RelocationQueue::new("raw blob", false, dedup)
    }

    pub fn enqueue_blob(&mut self, writer: &mut Writer, data: &'a [u8], alignment: u32) -> CgfxResult<()> {
        self.enqueue_and_write_placeholder(writer, Some(QueuedBlob(Cow::Borrowed(data))), alignment)
    }
}

impl<P: QueuedPayload> RelocationQueue<P> {
    pub fn new(label: &'static str, null_ok: bool, dedup: bool) -> Self {
        RelocationQueue {
            label,
            null_ok,
            dedup,
            pending: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Remember `payload` for the pointer field at the current position and
    /// write its zero placeholder, keeping the caller's layout sequential.
    ///
    /// A null payload just writes the null pointer, if this queue accepts nulls.
    pub fn enqueue_and_write_placeholder(
        &mut self,
        writer: &mut Writer,
        payload: Option<P>,
        alignment: u32,
    ) -> CgfxResult<()> {
        match payload {
            Some(payload) => self.pending.push(Pending {
                position: writer.position(),
                payload,
                alignment,
            }),
            None if !self.null_ok => {
                return fail(CgfxError::NullPayload { queue: self.label });
            }
            None => {}
        }
        writer.write_u32(0)
    }

    /// Write every queued payload at the current position and patch all placeholders.
    ///
    /// With deduplication, each distinct payload is written once, in order of first
    /// request. Alignment is applied before the target position is taken.
    /// The queue is empty afterwards, so a second flush writes nothing.
    pub fn flush(&mut self, writer: &mut Writer) -> CgfxResult<()> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }
        debug!(
            queue = self.label,
            requests = pending.len(),
            position = writer.position(),
            "flushing relocation queue"
        );

        if self.dedup {
            let mut groups: IndexMap<P, (u32, Vec<u32>)> = IndexMap::new();
            for item in pending {
                let (alignment, positions) = groups
                    .entry(item.payload)
                    .or_insert_with(|| (item.alignment, Vec::new()));
                if *alignment != item.alignment {
                    return Err(Report::new(CgfxError::AlignmentConflict {
                        existing: *alignment,
                        requested: item.alignment,
                    }));
                }
                positions.push(item.position);
            }
            for (payload, (alignment, positions)) in groups {
                place(writer, &payload, alignment, &positions)?;
            }
        } else {
            for item in pending {
                place(writer, &item.payload, item.alignment, &[item.position])?;
            }
        }
        Ok(())
    }
}

fn place<P: QueuedPayload>(
    writer: &mut Writer,
    payload: &P,
    alignment: u32,
    referrers: &[u32],
) -> CgfxResult<()> {
    if alignment > 0 {
        writer.align(alignment, 0)?;
    }
    let target = writer.position();
    for &field_pos in referrers {
        writer.write_offset_at(field_pos, Some(target))?;
    }
    payload.write_to(writer)
}

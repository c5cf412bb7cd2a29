//! The reference ledger: the linker half of saving.
//!
//! Records form an arbitrary graph, so a pointer is often written before the
//! record it points to. Writing an object commits its identity to a final
//! position; writing a pointer to it leaves a placeholder. Once the whole graph
//! has been written, [`ReferenceLedger::resolve_all`] patches every placeholder.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use rootcause::Report;
use tracing::{debug, trace};

use crate::data::cursor::Writer;
use crate::error::{CgfxError, CgfxResult};

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a record in an in-memory graph.
///
/// Identity is independent of contents: two records with equal fields but
/// separately generated ids are never merged. Copying an id (including by
/// cloning the record that owns it) shares the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(NonZeroU64);

impl RecordId {
    pub fn new() -> RecordId {
        let id = NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and a u64 does not wrap in practice.
        RecordId(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        RecordId::new()
    }
}

/// A reference to a record: its identity plus a type name for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub id: RecordId,
    pub type_name: &'static str,
}

/// Anything that can be the target of a pointer.
pub trait Identified {
    fn record_id(&self) -> RecordId;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            id: self.record_id(),
            type_name: self.type_name(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PendingPatch {
    location: u32,
    target: ObjectRef,
}

#[derive(Debug, Default)]
pub struct ReferenceLedger {
    committed: HashMap<RecordId, u32>,
    pending: Vec<PendingPatch>,
}

impl ReferenceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit `target` to the writer's current position. The caller writes the
    /// object's bytes immediately afterwards.
    ///
    /// Committing the same identity twice means the graph walk serialized one
    /// node twice, which would leave one set of pointers aimed at a stale copy.
    pub fn mark_reference(&mut self, writer: &Writer, target: ObjectRef) -> CgfxResult<u32> {
        let position = writer.position();
        if let Some(&existing) = self.committed.get(&target.id) {
            return Err(Report::new(CgfxError::DuplicateCommit {
                type_name: target.type_name,
                position: existing,
            }));
        }
        trace!(type_name = target.type_name, position, "commit reference");
        self.committed.insert(target.id, position);
        Ok(position)
    }

    /// Write a zero placeholder and, for a non-null target, remember to patch it.
    pub fn write_placeholder(&mut self, writer: &mut Writer, target: Option<ObjectRef>) -> CgfxResult<()> {
        if let Some(target) = target {
            self.pending.push(PendingPatch {
                location: writer.position(),
                target,
            });
        }
        writer.write_u32(0)
    }

    /// Final position of a committed record, if it has been written.
    pub fn position_of(&self, id: RecordId) -> Option<u32> {
        self.committed.get(&id).copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Patch every pending placeholder with the offset to its committed target.
    ///
    /// A placeholder whose target was never committed is fatal: leaving it zero
    /// would silently turn a real reference into null.
    pub fn resolve_all(&mut self, writer: &mut Writer) -> CgfxResult<()> {
        let pending = std::mem::take(&mut self.pending);
        debug!(
            placeholders = pending.len(),
            committed = self.committed.len(),
            "resolving references"
        );
        for patch in pending {
            let Some(&target) = self.committed.get(&patch.target.id) else {
                return Err(Report::new(CgfxError::UnresolvedReference {
                    type_name: patch.target.type_name,
                    location: patch.location,
                }));
            };
            writer.write_offset_at(patch.location, Some(target))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Endianness;
    use crate::data::cursor::Reader;

    struct Node {
        id: RecordId,
    }

    impl Identified for Node {
        fn record_id(&self) -> RecordId {
            self.id
        }
    }

    fn node() -> Node {
        Node { id: RecordId::new() }
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn forward_and_back_references_resolve() {
        let (a, b) = (node(), node());
        let mut w = Writer::new(Endianness::Little);
        let mut ledger = ReferenceLedger::new();

        w.write_u32(0xFFFF_FFFF).unwrap();
        let a_pos = ledger.mark_reference(&w, a.object_ref()).unwrap();
        // a points forward to b, and to itself
        ledger.write_placeholder(&mut w, Some(b.object_ref())).unwrap();
        ledger.write_placeholder(&mut w, Some(a.object_ref())).unwrap();
        let b_pos = ledger.mark_reference(&w, b.object_ref()).unwrap();
        // b points back to a, and has a null pointer
        ledger.write_placeholder(&mut w, Some(a.object_ref())).unwrap();
        ledger.write_placeholder(&mut w, None).unwrap();
        assert_eq!(ledger.pending_len(), 3);

        ledger.resolve_all(&mut w).unwrap();
        assert_eq!(ledger.pending_len(), 0);
        assert_eq!(ledger.position_of(a.id), Some(a_pos));

        let data = w.into_inner();
        let mut r = Reader::new(&data).unwrap();
        r.seek(a_pos).unwrap();
        assert_eq!(r.read_offset().unwrap(), Some(b_pos));
        assert_eq!(r.read_offset().unwrap(), Some(a_pos));
        assert_eq!(r.read_offset().unwrap(), Some(a_pos));
        assert_eq!(r.read_offset().unwrap(), None);
    }

    #[test]
    fn equal_contents_different_identity_stay_distinct() {
        let (a, b) = (node(), node());
        let mut w = Writer::new(Endianness::Little);
        let mut ledger = ReferenceLedger::new();
        w.write_u32(0).unwrap();
        ledger.write_placeholder(&mut w, Some(b.object_ref())).unwrap();
        let a_pos = ledger.mark_reference(&w, a.object_ref()).unwrap();
        w.write_u32(0).unwrap();
        let b_pos = ledger.mark_reference(&w, b.object_ref()).unwrap();
        w.write_u32(0).unwrap();
        assert_ne!(a_pos, b_pos);

        ledger.resolve_all(&mut w).unwrap();
        let data = w.into_inner();
        let mut r = Reader::new(&data).unwrap();
        r.seek(4).unwrap();
        assert_eq!(r.read_offset().unwrap(), Some(b_pos));
    }

    #[test]
    fn unresolved_reference_is_fatal() {
        let missing = node();
        let mut w = Writer::new(Endianness::Little);
        let mut ledger = ReferenceLedger::new();
        w.write_u32(0).unwrap();
        ledger.write_placeholder(&mut w, Some(missing.object_ref())).unwrap();

        let err = ledger.resolve_all(&mut w).unwrap_err();
        match err.current_context() {
            CgfxError::UnresolvedReference { type_name, location } => {
                assert!(type_name.ends_with("Node"));
                assert_eq!(*location, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_commit_is_fatal() {
        let a = node();
        let mut w = Writer::new(Endianness::Little);
        let mut ledger = ReferenceLedger::new();
        w.write_u32(0).unwrap();
        ledger.mark_reference(&w, a.object_ref()).unwrap();
        w.write_u32(0).unwrap();
        let err = ledger.mark_reference(&w, a.object_ref()).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::DuplicateCommit { position: 4, .. }
        ));
    }
}

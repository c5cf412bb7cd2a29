//! Name-indexed dictionaries (`DICT` chunks).
//!
//! A dictionary is reached through a `{count, offset}` header embedded in its
//! owner. The chunk holds the count again, a synthetic trie root, and one
//! entry per record: trie fields, a name and a pointer to the payload.
//! Payloads are loaded eagerly. On save the chunk itself only carries
//! placeholders; [`Dict::save_entries`] writes the payloads later, wherever
//! the owner decides.

use rootcause::Report;
use tracing::{debug, warn};

use crate::data::Magic;
use crate::data::chunk::{load_chunk_expecting, save_chunk};
use crate::data::context::{Loadable, SaveContext, Saveable};
use crate::data::cursor::Reader;
use crate::data::ledger::{Identified, RecordId};
use crate::data::patricia::{self, TrieNode};
use crate::error::{CgfxError, CgfxResult, fail};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DictEntry<T> {
    /// Trie fields as last loaded or rebuilt.
    pub node: TrieNode,
    pub name: String,
    pub value: T,
}

/// An ordered, name-indexed collection of records.
///
/// Entry order is preserved; the trie fields are recomputed from the names
/// whenever the name set changes and again on every save.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Dict<T> {
    #[cfg_attr(feature = "serde", serde(skip))]
    id: RecordId,
    root: TrieNode,
    entries: Vec<DictEntry<T>>,
}

impl<T> Default for Dict<T> {
    fn default() -> Self {
        Dict {
            id: RecordId::new(),
            root: TrieNode::default(),
            entries: Vec::new(),
        }
    }
}

impl<T> Identified for Dict<T> {
    fn record_id(&self) -> RecordId {
        self.id
    }

    fn type_name(&self) -> &'static str {
        "Dict"
    }
}

impl<T> Dict<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root(&self) -> TrieNode {
        self.root
    }

    pub fn entries(&self) -> &[DictEntry<T>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|e| (e.name.as_str(), &e.value))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|e| &mut e.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    /// Append an entry and rebuild the trie. A name that cannot be placed
    /// (duplicate or empty) leaves the dictionary unchanged.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> CgfxResult<()> {
        self.entries.push(DictEntry {
            node: TrieNode::default(),
            name: name.into(),
            value,
        });
        if let Err(e) = self.rebuild_trie() {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    /// Remove the entry called `name`, returning its value.
    pub fn remove(&mut self, name: &str) -> CgfxResult<Option<T>> {
        let Some(index) = self.position(name) else {
            return Ok(None);
        };
        let entry = self.entries.remove(index);
        self.rebuild_trie()?;
        Ok(Some(entry.value))
    }

    /// Recompute every entry's trie fields from the current names.
    pub fn rebuild_trie(&mut self) -> CgfxResult<()> {
        let nodes = self.build_trie()?;
        self.root = nodes[0];
        for (entry, node) in self.entries.iter_mut().zip(&nodes[1..]) {
            entry.node = *node;
        }
        Ok(())
    }

    fn build_trie(&self) -> CgfxResult<Vec<TrieNode>> {
        let names: Vec<&str> = self.names().collect();
        patricia::build(&names)
    }

    fn nodes(&self) -> Vec<TrieNode> {
        std::iter::once(self.root)
            .chain(self.entries.iter().map(|e| e.node))
            .collect()
    }

    /// Index of the entry called `name`, found by walking the trie.
    pub fn position(&self, name: &str) -> Option<usize> {
        let names: Vec<&str> = self.names().collect();
        patricia::find(&self.nodes(), &names, name)
    }

    pub fn find(&self, name: &str) -> Option<&T> {
        self.position(name).map(|i| &self.entries[i].value)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut T> {
        self.position(name).map(|i| &mut self.entries[i].value)
    }
}

/// Trie node, name offset and payload offset.
const ENTRY_SIZE: usize = 16;

fn read_node(reader: &mut Reader<'_>) -> CgfxResult<TrieNode> {
    Ok(TrieNode {
        partition_bit: reader.read_u32()?,
        left: reader.read_u16()?,
        right: reader.read_u16()?,
    })
}

impl<T: Loadable> Dict<T> {
    /// Read a `{count, offset}` header at the cursor and, when `count > 0`,
    /// the dictionary it points to. The cursor ends up just past the header.
    pub fn load_from_header(reader: &mut Reader<'_>) -> CgfxResult<Option<Self>> {
        let count = reader.read_u32()?;
        let offset = reader.read_offset()?;
        if count == 0 {
            return Ok(None);
        }
        // A null offset with entries fails the seek as a null dereference.
        reader
            .follow(offset.unwrap_or(0), |r| Self::load_chunk(r, count))
            .map(Some)
    }

    fn load_chunk(reader: &mut Reader<'_>, header_count: u32) -> CgfxResult<Self> {
        load_chunk_expecting(reader, Magic::DICT, |r, chunk| {
            let count = r.read_u32()?;
            if count != header_count {
                warn!(
                    header_count,
                    count,
                    start = chunk.start,
                    "dictionary header count disagrees with DICT chunk"
                );
            }

            let root = read_node(r)?;
            let root_name = r.read_string()?;
            let root_payload = r.read_offset()?;
            if root_name.is_some() || root_payload.is_some() {
                warn!(
                    start = chunk.start,
                    name = ?root_name,
                    "dictionary root carries a name or payload, ignoring it"
                );
            }

            let available = chunk.end().saturating_sub(r.position()) as usize / ENTRY_SIZE;
            if count as usize > available {
                return fail(CgfxError::UnexpectedEof {
                    offset: r.position(),
                    needed: (count as usize).saturating_mul(ENTRY_SIZE),
                    available: available * ENTRY_SIZE,
                });
            }

            let mut entries = Vec::with_capacity(count as usize);
            for index in 0..count as usize {
                let node = read_node(r)?;
                let Some(name) = r.read_string()? else {
                    return fail(CgfxError::UnnamedEntry { index });
                };
                let Some(target) = r.read_offset()? else {
                    return fail(CgfxError::unsupported(format!(
                        "dictionary entry {name:?} has no payload"
                    )));
                };
                let value = r.follow(target, T::load)?;
                entries.push(DictEntry { node, name, value });
            }
            debug!(start = chunk.start, entries = entries.len(), "loaded dictionary");

            Ok(Dict {
                id: RecordId::new(),
                root,
                entries,
            })
        })
    }
}

/// Write a `{count, offset}` dictionary header. A missing or empty dictionary
/// is written as `{0, 0}` and no chunk will follow for it.
pub fn write_dict_header<'a, T>(ctx: &mut SaveContext<'a>, dict: Option<&'a Dict<T>>) -> CgfxResult<()> {
    match dict.filter(|d| !d.is_empty()) {
        Some(dict) => {
            let count = u32::try_from(dict.len()).map_err(|_| Report::new(CgfxError::OffsetOverflow))?;
            ctx.writer.write_u32(count)?;
            ctx.write_pointer_placeholder(Some(dict.object_ref()))
        }
        None => {
            ctx.writer.write_u32(0)?;
            ctx.writer.write_u32(0)
        }
    }
}

impl<T: Identified> Saveable for Dict<T> {
    /// Write the `DICT` chunk: count, root and entries with freshly built trie
    /// fields. Names go to the string table; payloads are placeholders.
    fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        ctx.trace_save("dictionary");
        let nodes = self.build_trie()?;
        save_chunk(ctx, Magic::DICT, |ctx| {
            ctx.writer.write_u32(self.entries.len() as u32)?;
            let root = nodes[0];
            ctx.writer.write_u32(root.partition_bit)?;
            ctx.writer.write_u16(root.left)?;
            ctx.writer.write_u16(root.right)?;
            ctx.write_string(None)?;
            ctx.write_pointer_placeholder(None)?;

            for (entry, node) in self.entries.iter().zip(&nodes[1..]) {
                ctx.writer.write_u32(node.partition_bit)?;
                ctx.writer.write_u16(node.left)?;
                ctx.writer.write_u16(node.right)?;
                ctx.write_string(Some(entry.name.as_str()))?;
                ctx.write_pointer_placeholder(Some(entry.value.object_ref()))?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

impl<T: Saveable + Identified> Dict<T> {
    /// Write every payload in entry order, committing each one's position.
    pub fn save_entries<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
        for entry in &self.entries {
            ctx.save_and_mark(&entry.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Endianness;
    use crate::options::SaveOptions;

    /// A minimal payload: one u32.
    #[derive(Debug, Clone, PartialEq)]
    struct Word {
        id: RecordId,
        value: u32,
    }

    impl Word {
        fn new(value: u32) -> Self {
            Word {
                id: RecordId::new(),
                value,
            }
        }
    }

    impl Identified for Word {
        fn record_id(&self) -> RecordId {
            self.id
        }
    }

    impl Loadable for Word {
        fn load(reader: &mut Reader<'_>) -> CgfxResult<Self> {
            Ok(Word::new(reader.read_u32()?))
        }
    }

    impl Saveable for Word {
        fn save<'a>(&'a self, ctx: &mut SaveContext<'a>) -> CgfxResult<()> {
            ctx.writer.write_u32(self.value)
        }
    }

    /// Save `dict` behind a header at offset 4, the way an owner record would.
    fn save_owned(dict: Option<&Dict<Word>>) -> Vec<u8> {
        let mut ctx = SaveContext::new(Endianness::Little, &SaveOptions::default());
        ctx.writer.write_u32(0xCAFE_F00D).unwrap();
        write_dict_header(&mut ctx, dict).unwrap();
        if let Some(dict) = dict.filter(|d| !d.is_empty()) {
            ctx.save_and_mark(dict).unwrap();
            dict.save_entries(&mut ctx).unwrap();
        }
        ctx.resolve_references().unwrap();
        ctx.flush_strings().unwrap();
        ctx.finish().unwrap()
    }

    fn load_owned(data: &[u8]) -> Option<Dict<Word>> {
        let mut r = Reader::new(data).unwrap();
        r.seek(4).unwrap();
        let dict = Dict::load_from_header(&mut r).unwrap();
        assert_eq!(r.position(), 12);
        dict
    }

    fn alpha_beta() -> Dict<Word> {
        let mut dict = Dict::new();
        dict.insert("Alpha", Word::new(1)).unwrap();
        dict.insert("Beta", Word::new(2)).unwrap();
        dict
    }

    #[test]
    fn two_entry_round_trip() {
        let dict = alpha_beta();
        let data = save_owned(Some(&dict));

        let loaded = load_owned(&data).unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["Alpha", "Beta"]);
        assert_eq!(loaded.find("Beta").map(|w| w.value), Some(2));
        assert_eq!(
            loaded.root(),
            TrieNode {
                left: 1,
                ..TrieNode::ROOT
            }
        );
        let nodes: Vec<_> = loaded.entries().iter().map(|e| e.node).collect();
        assert_eq!(
            nodes,
            vec![
                TrieNode {
                    partition_bit: 38,
                    left: 2,
                    right: 1
                },
                TrieNode {
                    partition_bit: 30,
                    left: 0,
                    right: 2
                },
            ]
        );

        assert_eq!(save_owned(Some(&loaded)), data);
    }

    #[test]
    fn saved_layout() {
        let data = save_owned(Some(&alpha_beta()));
        // header {2, -> DICT at 12}
        assert_eq!(&data[4..8], &2u32.to_le_bytes());
        assert_eq!(&data[8..12], &4u32.to_le_bytes());
        assert_eq!(&data[12..16], b"DICT");
        // magic, size, count, root, 2 entries of 16 bytes
        let chunk_size = 8 + 4 + 16 * 3;
        assert_eq!(&data[16..20], &(chunk_size as u32).to_le_bytes());
        // payloads follow the chunk, then the string table
        let payloads = 12 + chunk_size;
        assert_eq!(&data[payloads..payloads + 4], &1u32.to_le_bytes());
        assert_eq!(&data[payloads + 4..payloads + 8], &2u32.to_le_bytes());
        assert_eq!(&data[payloads + 8..], b"Alpha\0Beta\0");
    }

    #[test]
    fn null_dictionary_is_a_zero_header() {
        let data = save_owned(None);
        assert_eq!(data.len(), 12);
        assert_eq!(&data[4..], &[0; 8]);
        assert!(load_owned(&data).is_none());

        let empty = Dict::<Word>::new();
        assert_eq!(save_owned(Some(&empty)), data);
    }

    #[test]
    fn lookup_follows_edits() {
        let mut dict = alpha_beta();
        dict.insert("Gamma", Word::new(3)).unwrap();
        assert_eq!(dict.position("Gamma"), Some(2));
        assert_eq!(dict.remove("Alpha").unwrap().map(|w| w.value), Some(1));
        assert_eq!(dict.find("Alpha"), None);
        assert_eq!(dict.find("Gamma").map(|w| w.value), Some(3));
        dict.find_mut("Beta").unwrap().value = 20;
        assert_eq!(dict.find("Beta").map(|w| w.value), Some(20));
    }

    #[test]
    fn duplicate_insert_is_rejected_and_undone() {
        let mut dict = alpha_beta();
        let err = dict.insert("Alpha", Word::new(9)).unwrap_err();
        assert!(matches!(err.current_context(), CgfxError::DuplicateName { .. }));
        assert_eq!(dict.len(), 2);
        assert_eq!(dict.find("Alpha").map(|w| w.value), Some(1));
    }

    #[test]
    fn unnamed_entry_fails_to_load() {
        let mut data = save_owned(Some(&alpha_beta()));
        // Null out the first entry's name offset: header(12) + DICT(8) + count(4) + root(16) + node(8).
        data[48..52].copy_from_slice(&[0; 4]);
        let mut r = Reader::new(&data).unwrap();
        r.seek(4).unwrap();
        let err = Dict::<Word>::load_from_header(&mut r).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::UnnamedEntry { index: 0 }
        ));
        assert_eq!(r.depth(), 0);
    }

    #[test]
    fn oversized_count_fails_to_load() {
        let mut data = save_owned(Some(&alpha_beta()));
        // The DICT chunk's own count: header(12) + magic(4) + size(4).
        data[20..24].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut r = Reader::new(&data).unwrap();
        r.seek(4).unwrap();
        let err = Dict::<Word>::load_from_header(&mut r).unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::UnexpectedEof { needed, available: 32, .. } if *needed == u32::MAX as usize * 16
        ));
    }

    #[test]
    fn named_root_is_ignored() {
        let mut data = save_owned(Some(&alpha_beta()));
        // Point the root's name (at 32) at "Alpha", which the first entry names from 48.
        let alpha = u32::from_le_bytes(data[48..52].try_into().unwrap());
        data[32..36].copy_from_slice(&(alpha + 16).to_le_bytes());

        let loaded = load_owned(&data).unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["Alpha", "Beta"]);
        assert_eq!(loaded.find("Alpha").map(|w| w.value), Some(1));
    }

    #[test]
    fn entries_must_be_saved() {
        let dict = alpha_beta();
        let mut ctx = SaveContext::new(Endianness::Little, &SaveOptions::default());
        ctx.writer.write_u32(0).unwrap();
        write_dict_header(&mut ctx, Some(&dict)).unwrap();
        ctx.save_and_mark(&dict).unwrap();
        let err = ctx.resolve_references().unwrap_err();
        assert!(matches!(
            err.current_context(),
            CgfxError::UnresolvedReference { .. }
        ));
    }
}

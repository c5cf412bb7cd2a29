//! The Patricia trie embedded in every dictionary.
//!
//! Each dictionary entry doubles as one trie node `(partition_bit, left,
//! right)`, plus a synthetic root at index 0. The consuming runtime looks names
//! up by walking these indices, so they must be rebuilt from the entry names
//! exactly the way the original tools do: entries are inserted in order, and
//! bit `b` of a name is bit `b & 7` of byte `b >> 3` (zero past the end).

use rootcause::Report;

use crate::data::parser_utils::encode_single_byte;
use crate::error::{CgfxError, CgfxResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TrieNode {
    pub partition_bit: u32,
    pub left: u16,
    pub right: u16,
}

impl TrieNode {
    /// The root of a non-empty trie.
    pub const ROOT: TrieNode = TrieNode {
        partition_bit: u32::MAX,
        left: 0,
        right: 0,
    };

    fn child(&self, name: Option<&[u8]>) -> u16 {
        if bit(name, self.partition_bit) {
            self.right
        } else {
            self.left
        }
    }
}

fn bit(name: Option<&[u8]>, bit: u32) -> bool {
    let byte = (bit >> 3) as usize;
    name.and_then(|name| name.get(byte))
        .is_some_and(|&b| (b >> (bit & 7)) & 1 != 0)
}

/// Build the trie for `names`. Index 0 of the result is the root; index `i + 1`
/// belongs to `names[i]`.
pub fn build<S: AsRef<str>>(names: &[S]) -> CgfxResult<Vec<TrieNode>> {
    let encoded = names
        .iter()
        .map(|name| encode_single_byte(name.as_ref()))
        .collect::<CgfxResult<Vec<_>>>()?;
    if u16::try_from(encoded.len()).is_err() {
        return Err(Report::new(CgfxError::unsupported(format!(
            "dictionary with {} entries exceeds the 16-bit node index",
            encoded.len()
        ))));
    }

    let mut nodes = Vec::with_capacity(encoded.len() + 1);
    nodes.push(if encoded.is_empty() {
        TrieNode::default()
    } else {
        TrieNode::ROOT
    });
    let max_len = encoded.iter().map(Vec::len).max().unwrap_or(0);

    for (index, name) in encoded.iter().enumerate() {
        if name.is_empty() {
            return Err(Report::new(CgfxError::UnnamedEntry { index }));
        }
        insert(&mut nodes, &encoded, name, max_len).map_err(|()| {
            Report::new(CgfxError::DuplicateName {
                name: names[index].as_ref().to_string(),
            })
        })?;
    }
    Ok(nodes)
}

/// Name stored at node `index`; the root has none.
fn node_name<'n>(names: &'n [Vec<u8>], index: u16) -> Option<&'n [u8]> {
    (index as usize)
        .checked_sub(1)
        .and_then(|i| names.get(i))
        .map(Vec::as_slice)
}

fn insert(nodes: &mut Vec<TrieNode>, names: &[Vec<u8>], name: &[u8], max_len: usize) -> Result<(), ()> {
    let new_index = nodes.len() as u16;

    // Find the closest existing name.
    let mut parent = 0u16;
    let mut current = nodes[0].left;
    while nodes[parent as usize].partition_bit > nodes[current as usize].partition_bit {
        parent = current;
        current = nodes[current as usize].child(Some(name));
    }
    let closest = node_name(names, current);

    // Highest bit where they differ.
    let mut partition = (max_len * 8).checked_sub(1).ok_or(())? as u32;
    while bit(closest, partition) == bit(Some(name), partition) {
        partition = partition.checked_sub(1).ok_or(())?;
    }

    // Descend again, stopping above the new partition bit.
    parent = 0;
    current = nodes[0].left;
    while nodes[parent as usize].partition_bit > nodes[current as usize].partition_bit
        && nodes[current as usize].partition_bit > partition
    {
        parent = current;
        current = nodes[current as usize].child(Some(name));
    }

    let goes_right = bit(Some(name), partition);
    nodes.push(TrieNode {
        partition_bit: partition,
        left: if goes_right { current } else { new_index },
        right: if goes_right { new_index } else { current },
    });

    let parent = &mut nodes[parent as usize];
    if bit(Some(name), parent.partition_bit) {
        parent.right = new_index;
    } else {
        parent.left = new_index;
    }
    Ok(())
}

/// Look `name` up the way the runtime does. Returns the entry index (node index - 1).
pub fn find<S: AsRef<str>>(nodes: &[TrieNode], names: &[S], name: &str) -> Option<usize> {
    let key = encode_single_byte(name).ok()?;
    let root = nodes.first()?;
    let mut parent = root;
    let mut index = root.left;
    let mut current = nodes.get(index as usize)?;
    while parent.partition_bit > current.partition_bit {
        parent = current;
        index = current.child(Some(&key));
        current = nodes.get(index as usize)?;
    }
    let entry = (index as usize).checked_sub(1)?;
    (names.get(entry)?.as_ref() == name).then_some(entry)
}

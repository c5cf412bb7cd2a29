/// Chunk framing: `{magic, size}` envelopes around every top-level section
pub mod chunk;
/// Save-session state: writer, relocation queues and reference ledger
pub mod context;
/// Seekable read and write cursors with position stacks
pub mod cursor;
/// Name-indexed dictionaries (DICT chunks)
pub mod dict;
/// Object-identity reference ledger used to backpatch pointers after the graph is written
pub mod ledger;
/// Compact binary trie stored inside every dictionary
pub mod patricia;
/// Deduplicating payload queues for strings and raw blobs
pub mod relocation;
// Helpers shared by the cursor and the record loaders
pub mod parser_utils;

use std::fmt;

/// A 4-byte tag identifying a chunk or record.
///
/// Magic bytes are compared as-is; they are not subject to the file's endianness.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Magic(pub [u8; 4]);

impl Magic {
    pub const CGFX: Magic = Magic(*b"CGFX");
    pub const DATA: Magic = Magic(*b"DATA");
    pub const IMAG: Magic = Magic(*b"IMAG");
    pub const DICT: Magic = Magic(*b"DICT");

    pub const fn new(bytes: &[u8; 4]) -> Magic {
        Magic(*bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl fmt::Display for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Magic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Magic({self})")
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Magic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Byte order of every integer and float field in a file, chosen by the
/// marker that follows the `CGFX` magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

impl Endianness {
    pub const LITTLE_MARKER: [u8; 2] = [0xFF, 0xFE];
    pub const BIG_MARKER: [u8; 2] = [0xFE, 0xFF];

    pub fn from_marker(marker: [u8; 2]) -> Option<Endianness> {
        match marker {
            Self::LITTLE_MARKER => Some(Endianness::Little),
            Self::BIG_MARKER => Some(Endianness::Big),
            _ => None,
        }
    }

    pub fn marker(&self) -> [u8; 2] {
        match self {
            Endianness::Little => Self::LITTLE_MARKER,
            Endianness::Big => Self::BIG_MARKER,
        }
    }

    pub(crate) fn to_winnow(self) -> winnow::binary::Endianness {
        match self {
            Endianness::Little => winnow::binary::Endianness::Little,
            Endianness::Big => winnow::binary::Endianness::Big,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn magic_display_escapes_binary() {
        assert_eq!(Magic::DICT.to_string(), "DICT");
        assert_eq!(Magic([b'A', 0, b'B', 0xFF]).to_string(), "A\\x00B\\xFF");
    }

    #[test]
    fn endian_markers() {
        assert_eq!(Endianness::from_marker([0xFF, 0xFE]), Some(Endianness::Little));
        assert_eq!(Endianness::from_marker([0xFE, 0xFF]), Some(Endianness::Big));
        assert_eq!(Endianness::from_marker([0x00, 0x00]), None);
        assert_eq!(Endianness::Big.marker(), [0xFE, 0xFF]);
    }
}

//! Four-character type codes.
//!
//! Every group, record and subrecord starts with a 4-byte ASCII code such as
//! `GRUP`, `WEAP` or `EDID`. Codes are compared byte-for-byte and are never
//! assumed to be known: engine revisions keep adding new ones.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// A four-character type code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct Tag([u8; 4]);

impl Tag {
    /// Create a tag from its four bytes.
    #[inline]
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Create a tag from the first four bytes of a slice.
    #[inline]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Get the raw bytes.
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// The tag read as a little-endian u32, as it appears in label fields.
    #[inline]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Rebuild a tag from a little-endian u32 label.
    #[inline]
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_le_bytes())
    }

    /// Whether every byte is printable ASCII.
    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
    }
}

impl From<[u8; 4]> for Tag {
    fn from(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }
}

impl PartialEq<[u8; 4]> for Tag {
    fn eq(&self, other: &[u8; 4]) -> bool {
        &self.0 == other
    }
}

impl PartialEq<&[u8; 4]> for Tag {
    fn eq(&self, other: &&[u8; 4]) -> bool {
        &self.0 == *other
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_escapes_binary() {
        assert_eq!(Tag::new(*b"EDID").to_string(), "EDID");
        assert_eq!(Tag::new([b'A', 0, b'B', 0xff]).to_string(), "A\\x00B\\xff");
    }

    #[test]
    fn test_label_roundtrip() {
        let tag = Tag::new(*b"WEAP");
        assert_eq!(tag.to_u32(), 0x5041_4557);
        assert_eq!(Tag::from_u32(tag.to_u32()), tag);
    }

    #[test]
    fn test_from_slice_requires_four_bytes() {
        assert_eq!(Tag::from_slice(b"CELLxyz"), Some(Tag::new(*b"CELL")));
        assert_eq!(Tag::from_slice(b"CEL"), None);
    }
}

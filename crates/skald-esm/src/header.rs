//! Group, record and subrecord headers.
//!
//! Groups and records share one fixed-size header layout so the cursor can
//! read a header and decide from its tag which one it has. The size of that
//! layout depends on the archive's format revision.

use skald_common::{BinaryReader, FormId, Tag};
use zerocopy::byteorder::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Tag marking a group header.
pub const GROUP_TAG: Tag = Tag::new(*b"GRUP");

/// Tag of the archive header record.
pub const ARCHIVE_HEADER_TAG: Tag = Tag::new(*b"TES4");

/// Subrecord carrying the real size of the subrecord that follows it.
pub const OVERSIZE_TAG: Tag = Tag::new(*b"XXXX");

/// Size of a subrecord header on disk.
pub const SUB_RECORD_HEADER_SIZE: usize = 6;

/// Largest group/record header of any format revision.
pub const MAX_HEADER_SIZE: usize = 24;

/// On-disk header revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeaderFormat {
    /// 20-byte headers (earliest revision).
    Tes4,
    /// 24-byte headers: records gain a version word, groups an extra u32.
    Tes5,
}

impl HeaderFormat {
    /// Size of both group and record headers in this revision.
    #[inline]
    pub const fn header_size(self) -> usize {
        match self {
            Self::Tes4 => 20,
            Self::Tes5 => 24,
        }
    }
}

/// The first 20 bytes shared by every group and record header.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
pub struct RawChunkHeader {
    /// Record type, or `GRUP`.
    pub tag: [u8; 4],
    /// Record: payload size. Group: total size including this header.
    pub size: U32,
    /// Record: flags. Group: label.
    pub word_a: U32,
    /// Record: form id. Group: kind.
    pub word_b: U32,
    /// Record: revision. Group: stamp.
    pub word_c: U32,
}

/// Kind of a group, which decides how its label is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupKind {
    Top,
    WorldChildren,
    InteriorCellBlock,
    InteriorCellSubBlock,
    ExteriorCellBlock,
    ExteriorCellSubBlock,
    CellChildren,
    TopicChildren,
    CellPersistentChildren,
    CellTemporaryChildren,
    CellVisibleDistantChildren,
    Unknown(i32),
}

impl From<i32> for GroupKind {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Top,
            1 => Self::WorldChildren,
            2 => Self::InteriorCellBlock,
            3 => Self::InteriorCellSubBlock,
            4 => Self::ExteriorCellBlock,
            5 => Self::ExteriorCellSubBlock,
            6 => Self::CellChildren,
            7 => Self::TopicChildren,
            8 => Self::CellPersistentChildren,
            9 => Self::CellTemporaryChildren,
            10 => Self::CellVisibleDistantChildren,
            other => Self::Unknown(other),
        }
    }
}

/// A group label, decoded according to the group kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GroupLabel {
    /// Top-level groups are labelled with the record type they hold.
    RecordType(Tag),
    /// Child groups are labelled with their parent's (raw) form id.
    FormId(FormId),
    /// Interior cell block or sub-block number.
    Block(i32),
    /// Exterior cell block or sub-block grid coordinates.
    Grid { x: i16, y: i16 },
    /// Label of a group kind this reader does not know.
    Raw(u32),
}

impl GroupLabel {
    fn decode(raw: u32, kind: GroupKind) -> Self {
        match kind {
            GroupKind::Top => Self::RecordType(Tag::from_u32(raw)),
            GroupKind::WorldChildren
            | GroupKind::CellChildren
            | GroupKind::TopicChildren
            | GroupKind::CellPersistentChildren
            | GroupKind::CellTemporaryChildren
            | GroupKind::CellVisibleDistantChildren => Self::FormId(FormId::new(raw)),
            GroupKind::InteriorCellBlock | GroupKind::InteriorCellSubBlock => Self::Block(raw as i32),
            // Stored as Y then X.
            GroupKind::ExteriorCellBlock | GroupKind::ExteriorCellSubBlock => Self::Grid {
                y: (raw & 0xFFFF) as u16 as i16,
                x: (raw >> 16) as u16 as i16,
            },
            GroupKind::Unknown(_) => Self::Raw(raw),
        }
    }
}

/// A group header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupHeader {
    pub label: GroupLabel,
    /// The label exactly as stored.
    pub raw_label: u32,
    pub kind: GroupKind,
    /// Total size in bytes, including this header.
    pub total_size: u32,
    pub stamp: u32,
    /// Trailing word of 24-byte headers.
    pub unknown: Option<u32>,
}

impl GroupHeader {
    /// Bytes of content after the header, if the declared size covers the header.
    #[inline]
    pub fn content_size(&self, format: HeaderFormat) -> Option<u32> {
        self.total_size.checked_sub(format.header_size() as u32)
    }
}

/// A record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordHeader {
    pub tag: Tag,
    /// Payload size in bytes, excluding this header.
    pub data_size: u32,
    pub flags: u32,
    /// Raw, file-local form id.
    pub id: FormId,
    pub revision: u32,
    /// Form version of 24-byte headers.
    pub version: Option<u16>,
    /// Trailing word of 24-byte headers.
    pub unknown: Option<u16>,
}

impl RecordHeader {
    /// The payload is a size prefix followed by zlib data.
    pub const FLAG_COMPRESSED: u32 = 0x0004_0000;

    #[inline]
    pub const fn is_compressed(&self) -> bool {
        self.flags & Self::FLAG_COMPRESSED != 0
    }

    /// Header plus payload.
    #[inline]
    pub const fn total_size(&self, format: HeaderFormat) -> u64 {
        format.header_size() as u64 + self.data_size as u64
    }
}

/// A subrecord header.
///
/// The on-disk size field is 16 bits; the wider field holds sizes announced
/// by a preceding `XXXX` subrecord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SubRecordHeader {
    pub tag: Tag,
    pub data_size: u32,
}

/// A group or record header, told apart by the `GRUP` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkHeader {
    Group(GroupHeader),
    Record(RecordHeader),
}

impl ChunkHeader {
    /// Parse exactly one header of the given format.
    pub fn parse(bytes: &[u8], format: HeaderFormat) -> skald_common::Result<Self> {
        let mut reader = BinaryReader::new(bytes);
        let raw: RawChunkHeader = reader.read_struct()?;
        let tag = Tag::new(raw.tag);

        if tag == GROUP_TAG {
            let kind = GroupKind::from(raw.word_b.get() as i32);
            let unknown = match format {
                HeaderFormat::Tes4 => None,
                HeaderFormat::Tes5 => Some(reader.read_u32()?),
            };
            return Ok(Self::Group(GroupHeader {
                label: GroupLabel::decode(raw.word_a.get(), kind),
                raw_label: raw.word_a.get(),
                kind,
                total_size: raw.size.get(),
                stamp: raw.word_c.get(),
                unknown,
            }));
        }

        let (version, unknown) = match format {
            HeaderFormat::Tes4 => (None, None),
            HeaderFormat::Tes5 => (Some(reader.read_u16()?), Some(reader.read_u16()?)),
        };
        Ok(Self::Record(RecordHeader {
            tag,
            data_size: raw.size.get(),
            flags: raw.word_a.get(),
            id: FormId::new(raw.word_b.get()),
            revision: raw.word_c.get(),
            version,
            unknown,
        }))
    }
}

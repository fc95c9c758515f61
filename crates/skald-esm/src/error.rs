//! Error types for the archive reader.

use skald_common::Tag;
use thiserror::Error;

/// Errors that can occur while reading an archive.
///
/// Everything except the contract-misuse variants ends the read: once the
/// byte accounting is broken no later offset can be trusted.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer bytes available than a header or field declares.
    #[error("truncated archive at offset {offset:#x}: needed {needed} bytes but only {available} available")]
    TruncatedArchive {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// A compressed record payload failed to inflate to its declared size.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Group, record or subrecord sizes disagree with each other.
    #[error("archive corrupt at offset {offset:#x}: {reason}")]
    ArchiveCorrupt { offset: u64, reason: String },

    /// The first record is not a valid archive header.
    #[error("invalid archive header: {0}")]
    InvalidArchiveHeader(String),

    /// A declared master is not loaded before this archive.
    #[error("unresolved dependency: {0}")]
    UnresolvedDependency(String),

    /// More masters than there are dependency slots.
    #[error("too many dependencies: {0} masters declared, at most 254 allowed")]
    TooManyDependencies(usize),

    /// The load order is inconsistent with the archive's masters.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A subrecord header was pushed back while another is still cached.
    #[error("a subrecord header is already pushed back")]
    DoublePushback,

    /// Pushback requested with no unread subrecord header to cache.
    #[error("no unread subrecord header to push back")]
    InvalidPushback,

    /// A field read asked for a different size than the header declares.
    #[error("field size mismatch for {tag}: declared {declared} bytes, requested {requested}")]
    FieldSizeMismatch {
        tag: Tag,
        declared: u32,
        requested: usize,
    },

    /// Record-level operation with no record open.
    #[error("no record is open")]
    NotInRecord,

    /// Field-level operation with no subrecord header read.
    #[error("no subrecord payload is pending")]
    NotInSubRecord,

    /// Group-level operation with no group open.
    #[error("no group is open")]
    NotInGroup,
}

impl Error {
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::ArchiveCorrupt {
            offset,
            reason: reason.into(),
        }
    }

    /// Attach the stream offset to a failure from the byte source.
    pub(crate) fn from_source(offset: u64, err: skald_common::Error) -> Self {
        match err {
            skald_common::Error::UnexpectedEof { needed, available } => Self::TruncatedArchive {
                offset,
                needed,
                available,
            },
            skald_common::Error::SeekOutOfRange { target, len } => Self::TruncatedArchive {
                offset,
                needed: target.saturating_sub(offset),
                available: len.saturating_sub(offset),
            },
            skald_common::Error::Io(e) => Self::Io(e),
            skald_common::Error::Utf8(e) => Self::InvalidArchiveHeader(e.to_string()),
        }
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

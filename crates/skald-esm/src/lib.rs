//! Reader for chunked master, plugin and save archives.
//!
//! An archive is a stream of groups and records. Groups nest and carry their
//! total size; records carry a payload of subrecords, optionally
//! zlib-compressed. This crate walks that hierarchy with exact byte
//! accounting and rebases form ids from an archive's own master numbering
//! into the load order of the session.
//!
//! - [`Cursor`] - The group/record/subrecord state machine
//! - [`ArchiveHeader`] - The `TES4` header record and its master list
//! - [`RebaseTable`] / [`LoadOrder`] - Form id rebasing
//! - [`ProgressObserver`] - Byte-level load progress
//!
//! # Example
//!
//! ```no_run
//! use skald_esm::{open_archive, LoadOrder, ReaderOptions};
//!
//! let mut load_order = LoadOrder::new();
//! load_order.register("Skyrim.esm")?;
//!
//! let mut cursor = open_archive("Skyrim.esm", &load_order, ReaderOptions::default())?;
//! while cursor.next_record_header()? {
//!     while cursor.next_sub_record_header()? {
//!         let Some(sub) = cursor.sub_record_header() else { break };
//!         if sub.tag == *b"EDID" {
//!             println!("{}", cursor.read_field_zstring()?);
//!         }
//!     }
//! }
//! # Ok::<(), skald_esm::Error>(())
//! ```

mod archive;
mod cursor;
pub mod decompress;
mod error;
mod header;
mod options;
mod progress;
mod rebase;

pub use archive::{detect_format, file_name, open_archive, read_archive_header, ArchiveHeader, MasterFile};
pub use cursor::{Chunk, Cursor, CursorState, GroupFrame};
pub use error::{Error, Result};
pub use header::{
    ChunkHeader, GroupHeader, GroupKind, GroupLabel, HeaderFormat, RawChunkHeader, RecordHeader, SubRecordHeader,
    ARCHIVE_HEADER_TAG, GROUP_TAG, MAX_HEADER_SIZE, OVERSIZE_TAG, SUB_RECORD_HEADER_SIZE,
};
pub use options::ReaderOptions;
pub use progress::{NoProgress, ProgressObserver};
pub use rebase::{LoadOrder, LoadedFile, RebaseTable, MAX_MASTERS, RESERVED_SLOT};
pub use skald_common::{ByteSource, FormId, MemorySource, StreamSource, Tag};

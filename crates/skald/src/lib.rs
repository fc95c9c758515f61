//! Skald - reader library for chunked master, plugin and save archives.
//!
//! This crate provides a unified interface to the Skald library ecosystem.
//!
//! # Crates
//!
//! - [`skald_common`] - Common utilities (byte sources, binary reading, tags, form ids)
//! - [`skald_esm`] - Group/record/subrecord cursor, decompression and form id rebasing
//!
//! # Example
//!
//! ```no_run
//! use skald::prelude::*;
//!
//! let mut load_order = LoadOrder::new();
//! load_order.register("Skyrim.esm")?;
//!
//! let header = read_archive_header("Skyrim.esm")?;
//! println!("{} masters, {} records", header.masters.len(), header.record_count);
//!
//! let mut cursor = open_archive("Skyrim.esm", &load_order, ReaderOptions::default())?;
//! while let Some(chunk) = cursor.next_chunk()? {
//!     if let Chunk::Record(record) = chunk {
//!         println!("{} {}", record.tag, cursor.rebase_form_id(record.id));
//!     }
//! }
//! # Ok::<(), skald::esm::Error>(())
//! ```

pub use skald_common as common;
pub use skald_esm as esm;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use skald_common::{BinaryReader, ByteSource, FormId, MemorySource, StreamSource, Tag};
    pub use skald_esm::{
        open_archive, read_archive_header, ArchiveHeader, Chunk, Cursor, GroupHeader, HeaderFormat, LoadOrder,
        ProgressObserver, ReaderOptions, RebaseTable, RecordHeader, SubRecordHeader,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

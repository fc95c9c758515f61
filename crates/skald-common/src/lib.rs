//! Common utilities for Skald.
//!
//! This crate provides the foundational types used across all Skald crates:
//!
//! - [`ByteSource`] - Seekable byte streams ([`MemorySource`], [`StreamSource`])
//! - [`BinaryReader`] - Little-endian reading of subrecord payloads
//! - [`Tag`] - Four-character type codes
//! - [`FormId`] - 32-bit object identifiers with a dependency slot in the top byte

mod error;
mod form_id;
mod reader;
mod source;
mod tag;

pub use error::{Error, Result};
pub use form_id::FormId;
pub use reader::{decode_zstring, BinaryReader};
pub use source::{ByteSource, MemorySource, StreamSource};
pub use tag::Tag;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

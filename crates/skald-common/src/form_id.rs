//! Form identifiers.
//!
//! A form id is a 32-bit value whose top byte names a dependency slot and whose
//! low 24 bits are a sequence number local to the file that defined the object.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// A 32-bit object identifier.
///
/// Displayed as eight upper-case hex digits, the way the game tools print them.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct FormId(u32);

impl FormId {
    /// The null reference.
    pub const NULL: Self = Self(0);

    /// Mask selecting the local sequence number.
    pub const LOCAL_MASK: u32 = 0x00FF_FFFF;

    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Build an id from a slot and a local sequence number.
    #[inline]
    pub const fn from_parts(slot: u8, local: u32) -> Self {
        Self(((slot as u32) << 24) | (local & Self::LOCAL_MASK))
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The dependency slot (top byte).
    #[inline]
    pub const fn slot(self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The local sequence number (low 24 bits).
    #[inline]
    pub const fn local(self) -> u32 {
        self.0 & Self::LOCAL_MASK
    }

    /// Replace the slot, keeping the local part.
    #[inline]
    pub const fn with_slot(self, slot: u8) -> Self {
        Self::from_parts(slot, self.0)
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for FormId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<FormId> for u32 {
    fn from(id: FormId) -> Self {
        id.0
    }
}

impl fmt::Display for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl fmt::Debug for FormId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormId({:08X})", self.0)
    }
}

//! Form id rebasing.
//!
//! Each archive numbers its dependency slots by the order of its own master
//! list. A session numbers them by load order. A [`RebaseTable`] maps the first
//! onto the second so the same object gets the same id no matter which archive
//! refers to it.

use hashbrown::HashMap;
use skald_common::FormId;

use crate::{Error, Result};

/// Slot reserved for "this file itself"; never a real dependency slot.
pub const RESERVED_SLOT: u8 = 0xFF;

/// Most masters an archive may declare.
pub const MAX_MASTERS: usize = RESERVED_SLOT as usize - 1;

/// Mapping from file-local master slots to session slots.
///
/// Built once per archive, right after its master list is read, and never
/// changed afterwards. Cloning it is cheap enough to hand to other readers of
/// the same archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebaseTable {
    slots: Vec<u8>,
    own_slot: Option<u8>,
}

impl RebaseTable {
    /// Resolve every declared master against the already-loaded files.
    pub fn build<S: AsRef<str>>(masters: &[S], loaded: &LoadOrder) -> Result<Self> {
        if masters.len() > MAX_MASTERS {
            return Err(Error::TooManyDependencies(masters.len()));
        }

        let slots = masters
            .iter()
            .map(|master| {
                let master = master.as_ref();
                loaded
                    .slot_of(master)
                    .ok_or_else(|| Error::UnresolvedDependency(format!("{master} is not loaded")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            slots,
            own_slot: None,
        })
    }

    /// Also rewrite the archive's own objects to `slot`.
    pub fn with_own_slot(mut self, slot: u8) -> Self {
        self.own_slot = Some(slot);
        self
    }

    /// The first master must sit in session slot 0.
    ///
    /// Anything else means the load order upstream disagrees with the
    /// archive, which is reported rather than corrected.
    pub fn verify_primary_master(&self) -> Result<()> {
        match self.slots.first() {
            Some(&slot) if slot != 0 => Err(Error::InvariantViolation(format!(
                "first master resolves to session slot {slot}, expected 0"
            ))),
            _ => Ok(()),
        }
    }

    /// Rewrite the slot byte of `id`.
    ///
    /// Ids pass through unchanged when the table is empty, when their slot is
    /// [`RESERVED_SLOT`], or when their slot is past the master list and no own
    /// slot is known.
    #[inline]
    pub fn rebase(&self, id: FormId) -> FormId {
        if self.slots.is_empty() {
            return id;
        }

        let slot = id.slot();
        if slot == RESERVED_SLOT {
            return id;
        }

        match self.slots.get(slot as usize) {
            Some(&mapped) => id.with_slot(mapped),
            None if slot as usize == self.slots.len() => match self.own_slot {
                Some(own) => id.with_slot(own),
                None => id,
            },
            None => id,
        }
    }

    /// Session slot for each master, in declaration order.
    #[inline]
    pub fn slots(&self) -> &[u8] {
        &self.slots
    }

    #[inline]
    pub fn own_slot(&self) -> Option<u8> {
        self.own_slot
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// An archive registered in a [`LoadOrder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub name: String,
    pub slot: u8,
}

/// The session's registry of loaded archives and their slots.
///
/// Names are matched case-insensitively. The registry is only read while
/// archives are being opened, so one `LoadOrder` can be shared by readers on
/// several threads.
#[derive(Debug, Clone, Default)]
pub struct LoadOrder {
    files: Vec<LoadedFile>,
    by_name: HashMap<String, usize>,
}

impl LoadOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` in the next free slot, or return its existing slot.
    pub fn register(&mut self, name: impl Into<String>) -> Result<u8> {
        let name = name.into();
        if let Some(&index) = self.by_name.get(&name.to_ascii_lowercase()) {
            return Ok(self.files[index].slot);
        }

        let slot = self
            .files
            .iter()
            .map(|file| file.slot as usize + 1)
            .max()
            .unwrap_or(0);
        if slot >= RESERVED_SLOT as usize {
            return Err(Error::TooManyDependencies(self.files.len() + 1));
        }

        self.insert(name, slot as u8)?;
        Ok(slot as u8)
    }

    /// Register `name` in an explicit slot.
    pub fn register_at(&mut self, name: impl Into<String>, slot: u8) -> Result<()> {
        let name = name.into();
        if slot == RESERVED_SLOT {
            return Err(Error::InvariantViolation(format!(
                "{name} cannot use reserved slot {RESERVED_SLOT:#04x}"
            )));
        }
        if let Some(&index) = self.by_name.get(&name.to_ascii_lowercase()) {
            let existing = self.files[index].slot;
            if existing == slot {
                return Ok(());
            }
            return Err(Error::InvariantViolation(format!(
                "{name} is already loaded in slot {existing}"
            )));
        }
        self.insert(name, slot)
    }

    fn insert(&mut self, name: String, slot: u8) -> Result<()> {
        if let Some(owner) = self.files.iter().find(|file| file.slot == slot) {
            return Err(Error::InvariantViolation(format!(
                "slot {slot} is already taken by {}",
                owner.name
            )));
        }
        self.by_name.insert(name.to_ascii_lowercase(), self.files.len());
        self.files.push(LoadedFile { name, slot });
        Ok(())
    }

    /// Session slot of a loaded archive.
    pub fn slot_of(&self, name: &str) -> Option<u8> {
        self.position_of(name).map(|index| self.files[index].slot)
    }

    /// Load position (registration order) of an archive.
    pub fn position_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_ascii_lowercase()).copied()
    }

    /// Registered archives in load order.
    pub fn files(&self) -> &[LoadedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Build the table for the archive `name` declaring `masters`.
    ///
    /// If `name` is registered, every master must have been registered before
    /// it and the table also maps the archive's own objects to its slot.
    pub fn rebase_table<S: AsRef<str>>(&self, name: &str, masters: &[S]) -> Result<RebaseTable> {
        let table = RebaseTable::build(masters, self)?;

        let Some(own_position) = self.position_of(name) else {
            return Ok(table);
        };

        for master in masters {
            let master = master.as_ref();
            if self.position_of(master).is_some_and(|position| position >= own_position) {
                return Err(Error::UnresolvedDependency(format!(
                    "{master} is loaded after its dependent {name}"
                )));
            }
        }

        Ok(table.with_own_slot(self.files[own_position].slot))
    }
}

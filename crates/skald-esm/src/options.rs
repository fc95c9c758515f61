//! Reader configuration.

use crate::HeaderFormat;

/// Options controlling how archives are opened and walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReaderOptions {
    /// Force a header revision instead of detecting it from the archive header.
    pub format: Option<HeaderFormat>,
    /// Require the first declared master to resolve to session slot 0.
    pub require_primary_master: bool,
    /// Log and clamp when a finished group is larger than what its parent has
    /// left, instead of failing with `ArchiveCorrupt`.
    pub tolerate_group_overrun: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            format: None,
            require_primary_master: true,
            tolerate_group_overrun: false,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: HeaderFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn require_primary_master(mut self, require: bool) -> Self {
        self.require_primary_master = require;
        self
    }

    pub fn tolerate_group_overrun(mut self, tolerate: bool) -> Self {
        self.tolerate_group_overrun = tolerate;
        self
    }
}

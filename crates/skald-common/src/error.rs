//! Error types for skald-common.

use thiserror::Error;

/// Common error type for Skald operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of data reached while reading.
    #[error("unexpected end of data: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: u64, available: u64 },

    /// Seek target outside the source.
    #[error("seek to {target} is outside a source of {len} bytes")]
    SeekOutOfRange { target: u64, len: u64 },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

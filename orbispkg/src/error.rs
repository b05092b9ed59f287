//! Error types for the orbispkg library.

use std::io;
use thiserror::Error;

/// A specialized `Result` type for orbispkg operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for orbispkg operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Wrong magic number, version or format tag.
    #[error("Invalid format: {0}")]
    Format(String),
    /// A declared offset or length points past the end of the input.
    #[error("Truncated input: {what} needs {needed} bytes, only {available} available")]
    TruncatedInput {
        what: String,
        needed: u64,
        available: u64,
    },
    /// Computed or declared regions overlap or violate ordering.
    #[error("Layout error: {0}")]
    Layout(String),
    /// An encoded value does not fit its declared slot.
    #[error("Value for '{key}' is too long: {len} bytes (max: {max} bytes)")]
    ValueTooLong { key: String, len: usize, max: usize },
    /// Two SFO entries share a key.
    #[error("Duplicate SFO key: {0}")]
    DuplicateKey(String),
    /// Two container entries share an id.
    #[error("Duplicate entry id: 0x{0:04X}")]
    DuplicateId(u32),
    /// A container was requested with no entries.
    #[error("No entries to pack")]
    EmptyEntrySet,
    /// Invalid alignment boundary or other builder setting.
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// An SFO key that cannot be stored in the key table.
    #[error("Invalid SFO key: {0:?}")]
    InvalidKey(String),
    /// A value that cannot be represented in its field.
    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
    /// Entry not found in the container.
    #[error("Entry not found in package: 0x{0:04X}")]
    EntryNotFound(u32),
    /// The operation was aborted by a progress handler.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn truncated(what: impl Into<String>, needed: u64, available: u64) -> Self {
        Error::TruncatedInput {
            what: what.into(),
            needed,
            available,
        }
    }

    pub(crate) fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::Io(err.into())
    }
}

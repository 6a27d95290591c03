//! Custom error types for the esm-reader crate.

use thiserror::Error;

use super::reader::FourCc;

/// The primary error type for all operations in this crate.
#[derive(Debug, Error)]
pub enum EsmError {
    /// An error originating from I/O operations, including truncated streams.
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    /// The file format version is not one the vanilla toolset writes.
    #[error("Unsupported ESM format version: {0}")]
    UnsupportedVersion(f32),

    /// A record tag did not match what the format requires at this position.
    #[error("Expected record {expected}, found {found}")]
    RecordMismatch { expected: FourCc, found: FourCc },

    /// A sub-record tag did not match what the format requires at this position.
    #[error("Expected sub-record {expected}, found {found}")]
    SubRecordMismatch { expected: FourCc, found: FourCc },

    /// A sub-record declared a size other than the fixed one this format
    /// version gives it.
    #[error("Sub-record {name} declares {found} bytes, expected {expected}")]
    SizeMismatch {
        name: FourCc,
        expected: u32,
        found: u32,
    },

    /// A read or skip would run past the end of the current record's payload.
    #[error("Read of {requested} bytes overruns the record ({left} bytes left)")]
    RecordOverrun { requested: u32, left: u32 },

    /// The file is structurally invalid.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// A convenience `Result` type alias using the crate's `EsmError` type.
pub type Result<T> = std::result::Result<T, EsmError>;

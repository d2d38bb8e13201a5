use std::path::PathBuf;
use thiserror::Error;

use crate::records::RecordKind;

/// All errors produced by the energy-logger toolchain.
#[derive(Error, Debug)]
pub enum EnlogError {
    /// A record's byte slice does not match its declared fixed size.
    #[error("{kind} record must be {expected} bytes, got {actual}")]
    RecordFormat {
        kind: RecordKind,
        expected: usize,
        actual: usize,
    },

    /// A decoded field is outside its declared domain.
    #[error("{kind} field '{field}' out of range: {value}")]
    FieldDomain {
        kind: RecordKind,
        field: &'static str,
        value: f64,
    },

    /// Timestamp fields passed their individual domains but do not form a
    /// real calendar date (e.g. February 31st).
    #[error("Invalid embedded timestamp: {0}")]
    Timestamp(String),

    /// Trailing bytes at end of stream that are neither a record start nor a
    /// prefix of the end-of-stream marker.
    #[error("Ambiguous trailing bytes at end of stream ({0} bytes)")]
    TrailingBytes(usize),

    /// A required named field was absent when packing a setup record.
    #[error("Missing setup field: {0}")]
    MissingField(String),

    /// A field name outside the closed setup registry.
    #[error("Invalid setup key: {0}")]
    UnknownField(String),

    /// An existing setup file whose size is neither zero nor the declared
    /// setup record size.
    #[error("Setup file {path} must be non-existent, empty or of size {expected}, but found {actual}")]
    SetupSizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: u64,
    },

    /// A file starting with the setup magic was handed to the stream decoder.
    #[error("{0} is a setup file; use the setup command instead")]
    SetupFileRejected(PathBuf),

    /// Decoded records are not strictly increasing in timestamp.
    #[error("Entries are not sorted by date: {current} follows {previous}")]
    OrderingViolation { previous: String, current: String },

    /// Average requested over zero records.
    #[error("Cannot average an empty record collection")]
    EmptyAverage,

    /// A positional summary row does not match the canonical field shape.
    #[error("Malformed summary row: {0}")]
    SummaryShape(String),

    /// An output file already exists; exclusive-create refused to clobber it.
    #[error("Output file already exists: {0}")]
    OutputExists(PathBuf),

    /// A directory handed to directory mode contains no `.bin` files.
    #[error("No .bin files found in {0}")]
    NoBinFiles(PathBuf),

    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the enlog crates.
pub type Result<T> = std::result::Result<T, EnlogError>;
